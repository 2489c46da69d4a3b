//! FFD (First Fit Decreasing) 策略
//!
//! - 负数降序: 按金额绝对值从大到小处理负数明细 (经典装箱启发式)
//! - 首个充足匹配: 选第一张余额 >= 目标的蓝票 (候选已降序，即最大的充足蓝票)，
//!   只扣目标金额，刻意保留该蓝票的剩余余额给后续负数使用。
//!   这是与 greedy_large "精确匹配整行吃光" 的关键行为差异
//! - 无单张充足蓝票时回退到多票贪心组合

use crate::models::{BlueItem, MatchResult, NegativeItem, PoolKey};
use crate::money::{
    amount_tolerance, is_positive, round_amount, round_quantity, scaled_int, tax_rate_or_default,
    validate_tail_diff,
};
use crate::strategy::greedy_large::{greedy_fill, record_match};
use crate::strategy::{BluePool, MatchingStrategy};
use bigdecimal::{BigDecimal, Zero};

/// 查找第一张余额 >= 目标的蓝票 (缩放整数比较)
///
/// 候选已按余额降序排列，命中的是最大的充足蓝票。
/// 与精确匹配不同: 精确匹配可能选中小额蓝票，这里总是保住大票的剩余容量。
pub(crate) fn find_first_sufficient_match(
    target_amount: &BigDecimal,
    candidates: &[BlueItem],
    order: &[usize],
) -> Option<usize> {
    let target_scaled = scaled_int(target_amount);
    order
        .iter()
        .copied()
        .find(|&i| scaled_int(candidates[i].current_remain_amount()) >= target_scaled)
}

/// FFD 匹配策略
pub struct FfdStrategy;

impl FfdStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FfdStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingStrategy for FfdStrategy {
    fn name(&self) -> &'static str {
        "ffd"
    }

    /// 按金额绝对值降序排序，大额负数优先占用池容量
    fn pre_process_negatives(&mut self, mut negatives: Vec<NegativeItem>) -> Vec<NegativeItem> {
        negatives.sort_by(|a, b| b.famount.abs().cmp(&a.famount.abs()));
        negatives
    }

    fn match_single_negative(
        &mut self,
        negative: &NegativeItem,
        blue_pool: &mut BluePool,
        results: &mut Vec<MatchResult>,
        seq_counter: &mut u64,
        skip_validation: bool,
    ) -> Result<(), String> {
        let match_key = PoolKey::of(negative);

        let Some(candidates) = blue_pool.get_mut(&match_key) else {
            let reason = format!(
                "找不到匹配的蓝票 - SKU: {}, 税率: {}",
                negative.fspbm, negative.ftaxrate
            );
            tracing::warn!("{}", reason);
            return Err(reason);
        };

        let target_amount = negative.target_amount();
        let mut remaining_amount = target_amount.clone();
        let order: Vec<usize> = (0..candidates.len()).collect();

        // 快速路径: 首个充足匹配，只扣目标金额，保留蓝票剩余部分
        if let Some(idx) = find_first_sufficient_match(&target_amount, candidates, &order) {
            let blue = &mut candidates[idx];
            if *blue.current_remain_amount() > BigDecimal::zero() {
                let unit_price = blue.effective_price();
                if is_positive(&unit_price) {
                    let final_match_amount = target_amount.clone();
                    let final_match_num =
                        round_quantity(&(&final_match_amount / &unit_price));

                    let fast_path_ok = if skip_validation {
                        true
                    } else {
                        let tax_rate = tax_rate_or_default(&blue.ftaxrate);
                        let est_tax = round_amount(&(&final_match_amount * &tax_rate));
                        match validate_tail_diff(
                            &final_match_amount,
                            &final_match_num,
                            &unit_price,
                            &est_tax,
                            &tax_rate,
                        ) {
                            Ok(()) => true,
                            Err(msg) => {
                                tracing::debug!("FFD快速路径尾差校验失败，回退到常规路径: {}", msg);
                                false
                            }
                        }
                    };

                    if fast_path_ok {
                        let remain_before = blue.current_remain_amount().clone();
                        blue.deduct(&final_match_amount, &final_match_num);

                        let blue = &candidates[idx];
                        record_match(
                            results,
                            seq_counter,
                            negative,
                            blue,
                            remain_before,
                            unit_price,
                            final_match_amount,
                        );
                        return Ok(());
                    }
                }
            }
        }

        // 常规路径: 多票贪心组合
        greedy_fill(
            negative,
            candidates,
            &order,
            &mut remaining_amount,
            results,
            seq_counter,
            skip_validation,
            None,
        );

        if remaining_amount > amount_tolerance() {
            let reason = format!(
                "负数明细未完全匹配 - 单据: {}, SKU: {}, 剩余: {}",
                negative.fbillno, negative.fspbm, remaining_amount
            );
            tracing::warn!("{}", reason);
            return Err(reason);
        }

        Ok(())
    }
}
