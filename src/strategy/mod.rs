pub mod ffd;
pub mod greedy_large;
pub mod invoice_reuse;
pub mod invoice_reuse_compat;

pub use ffd::FfdStrategy;
pub use greedy_large::GreedyLargeStrategy;
pub use invoice_reuse::InvoiceReuseStrategy;
pub use invoice_reuse_compat::InvoiceReuseCompatStrategy;

use crate::error::MatchError;
use crate::models::{BlueItem, MatchResult, NegativeItem, PoolKey};
use std::collections::HashMap;

/// 蓝票池: {(商品编码, 税率): [蓝票明细]}
/// 候选列表已按 剩余金额降序、开票时间升序 预排序
pub type BluePool = HashMap<PoolKey, Vec<BlueItem>>;

/// 匹配算法策略接口
///
/// 所有匹配算法必须实现 `name` 和 `match_single_negative`。
/// `pre_process_negatives` 和 `set_blue_pool` 供策略做预排序/预统计，默认不做处理。
pub trait MatchingStrategy: Send {
    /// 策略名称 (用于日志和配置)
    fn name(&self) -> &'static str;

    /// 为单个负数明细匹配蓝票
    ///
    /// 直接向 `results` 追加匹配记录并就地扣减蓝票余额。
    /// `skip_validation` 为 true 时跳过尾差判定 (两阶段校验: 数量与金额的
    /// 算术关系仍然成立，只是容差裁决延迟到合并后的批量校验)。
    ///
    /// 返回 Err(失败原因) 表示该负数明细未能匹配。
    fn match_single_negative(
        &mut self,
        negative: &NegativeItem,
        blue_pool: &mut BluePool,
        results: &mut Vec<MatchResult>,
        seq_counter: &mut u64,
        skip_validation: bool,
    ) -> Result<(), String>;

    /// 预处理负数单据列表 (可选，如按金额或稀缺度排序)
    fn pre_process_negatives(&mut self, negatives: Vec<NegativeItem>) -> Vec<NegativeItem> {
        negatives
    }

    /// 设置蓝票池上下文 (可选，批量匹配开始前调用一次)
    fn set_blue_pool(&mut self, _blue_pool: &BluePool) {}
}

impl std::fmt::Debug for dyn MatchingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 默认策略
pub const DEFAULT_STRATEGY: &str = "greedy_large";

/// 策略注册表 (封闭集合)
pub fn list_strategies() -> &'static [&'static str] {
    &["greedy_large", "ffd", "invoice_reuse", "invoice_reuse_compat"]
}

/// 根据名称创建策略实例
///
/// 每个分区创建独立实例，发票复用策略的内部状态因此天然隔离。
/// 未知名称属于配置错误，在任何匹配工作开始前返回给调用方。
pub fn create_strategy(name: &str) -> Result<Box<dyn MatchingStrategy>, MatchError> {
    match name {
        "greedy_large" => Ok(Box::new(GreedyLargeStrategy::new())),
        "ffd" => Ok(Box::new(FfdStrategy::new())),
        "invoice_reuse" => Ok(Box::new(InvoiceReuseStrategy::new())),
        "invoice_reuse_compat" => Ok(Box::new(InvoiceReuseCompatStrategy::new())),
        other => Err(MatchError::UnknownStrategy {
            name: other.to_string(),
            available: list_strategies().join(", "),
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_known_strategies() {
        for name in list_strategies() {
            let s = create_strategy(name).unwrap();
            assert_eq!(&s.name(), name);
        }
    }

    #[test]
    fn test_unknown_strategy_is_config_error() {
        let err = create_strategy("best_fit").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("best_fit"));
        assert!(msg.contains("greedy_large"));
    }
}
