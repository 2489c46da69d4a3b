use thiserror::Error;

/// 匹配引擎致命错误
///
/// 仅覆盖配置类错误: 在任何匹配工作开始前抛出。
/// 单条负数明细匹配失败不是错误，记录为 FailureRecord 后继续执行。
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("未知策略: '{name}'。可用策略: {available}")]
    UnknownStrategy { name: String, available: String },

    #[error("分组键不合法: 销方税号='{saler}', 购方税号='{buyer}'")]
    MalformedGroupKey { saler: String, buyer: String },

    #[error("税率不合法: '{raw}' (单据: {billno}, SKU: {spbm})")]
    InvalidTaxRate {
        raw: String,
        billno: String,
        spbm: String,
    },

    #[error("候选蓝票加载失败: {0}")]
    LoaderFailure(String),
}
