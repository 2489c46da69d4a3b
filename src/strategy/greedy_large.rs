//! 贪心大额优先匹配策略 (Greedy Large Strategy)
//!
//! - 优先精确匹配: 缩放整数比较查找金额完全相等的蓝票，一次吃光
//! - 贪心消耗: 按蓝票金额从大到小消耗
//! - 整数数量优先: 尽量使红冲数量为整数
//!
//! 本模块同时承载多票贪心填充逻辑，FFD 与发票复用策略复用之。

use crate::models::{BlueItem, MatchResult, NegativeItem, PoolKey};
use crate::money::{
    amount_tolerance, is_positive, round_amount, round_quantity, scaled_int, tax_rate_or_default,
    validate_tail_diff,
};
use crate::strategy::{BluePool, MatchingStrategy};
use bigdecimal::{BigDecimal, RoundingMode, Zero};
use indexmap::IndexSet;

/// 按给定顺序查找金额精确相等的蓝票 (缩放整数比较)
pub(crate) fn find_exact_match(
    target_amount: &BigDecimal,
    candidates: &[BlueItem],
    order: &[usize],
) -> Option<usize> {
    let target_scaled = scaled_int(target_amount);
    order
        .iter()
        .copied()
        .find(|&i| scaled_int(candidates[i].current_remain_amount()) == target_scaled)
}

/// 追加一条匹配记录 (序号为分区局部序号，合并后统一重排)
#[allow(clippy::too_many_arguments)]
pub(crate) fn record_match(
    results: &mut Vec<MatchResult>,
    seq_counter: &mut u64,
    negative: &NegativeItem,
    blue: &BlueItem,
    remain_before: BigDecimal,
    unit_price: BigDecimal,
    matched_amount: BigDecimal,
) {
    *seq_counter += 1;
    results.push(MatchResult {
        seq: *seq_counter,
        sku_code: negative.fspbm.clone(),
        blue_fid: blue.fid,
        blue_entryid: blue.fentryid,
        remain_amount_before: remain_before,
        unit_price,
        matched_amount,
        negative_fid: negative.fid,
        negative_entryid: negative.fentryid,
        blue_invoice_no: blue.finvoiceno.clone(),
        goods_name: negative.fgoodsname.clone(),
        fissuetime: Some(blue.fissuetime),
        tax_rate: tax_rate_or_default(&blue.ftaxrate),
    });
}

/// 多票贪心填充 (常规路径)
///
/// 按 `order` 给定的顺序消耗候选蓝票:
/// 1. 理论可用金额 = min(剩余目标, 蓝票余额)，记录是否吃光
/// 2. 整数数量优先: 整数方案不超余额、(非吃光时)不超目标过多、且尾差可过才采用
/// 3. 整数方案不可行则回退精确小数方案 (13位数量)，尾差不过则跳过该蓝票
/// 4. 吃光修正: 残留小于容差时直接取蓝票全部余额，防止碎屑
/// 5. 金额小于等于容差的方案不产生记录
///
/// `preferred_invoices` 非空时，每张被消耗的发票 fid 都会登记进去。
#[allow(clippy::too_many_arguments)]
pub(crate) fn greedy_fill(
    negative: &NegativeItem,
    candidates: &mut [BlueItem],
    order: &[usize],
    remaining_amount: &mut BigDecimal,
    results: &mut Vec<MatchResult>,
    seq_counter: &mut u64,
    skip_validation: bool,
    mut preferred_invoices: Option<&mut IndexSet<i64>>,
) {
    for &idx in order {
        if *remaining_amount <= BigDecimal::zero() {
            break;
        }

        let blue = &mut candidates[idx];
        if *blue.current_remain_amount() <= BigDecimal::zero() {
            continue;
        }

        let unit_price = blue.effective_price();
        if !is_positive(&unit_price) {
            continue;
        }

        // 1. 理论最大可用金额
        let (raw_match_amount, is_flush) = if blue.current_remain_amount() >= &*remaining_amount {
            (remaining_amount.clone(), false)
        } else {
            (blue.current_remain_amount().clone(), true)
        };

        // 2. 整数数量优先优化
        let raw_qty = &raw_match_amount / &unit_price;
        let int_qty = raw_qty.with_scale_round(0, RoundingMode::HalfUp);
        let int_match_amount = round_amount(&(&int_qty * &unit_price));

        let mut final_match_amount = BigDecimal::zero();
        let mut final_match_num = BigDecimal::zero();
        let mut use_integer = false;

        // 条件A: 整数金额不能超过蓝票余额(加容差)
        // 条件B: 非吃光模式下整数金额不能超出剩余目标过多
        if int_match_amount <= blue.current_remain_amount() + amount_tolerance()
            && !(!is_flush && int_match_amount > &*remaining_amount + amount_tolerance())
        {
            if skip_validation {
                if int_qty > BigDecimal::zero() {
                    final_match_amount = int_match_amount;
                    final_match_num = int_qty;
                    use_integer = true;
                }
            } else {
                let tax_rate = tax_rate_or_default(&blue.ftaxrate);
                let est_tax = round_amount(&(&int_match_amount * &tax_rate));
                if validate_tail_diff(&int_match_amount, &int_qty, &unit_price, &est_tax, &tax_rate)
                    .is_ok()
                    && int_qty > BigDecimal::zero()
                {
                    final_match_amount = int_match_amount;
                    final_match_num = int_qty;
                    use_integer = true;
                }
            }
        }

        // 3. 整数方案不可行，回退到精确小数方案
        if !use_integer {
            final_match_amount = raw_match_amount;
            final_match_num = round_quantity(&(&final_match_amount / &unit_price));

            if !skip_validation {
                let tax_rate = tax_rate_or_default(&blue.ftaxrate);
                let est_tax = round_amount(&(&final_match_amount * &tax_rate));
                if let Err(msg) = validate_tail_diff(
                    &final_match_amount,
                    &final_match_num,
                    &unit_price,
                    &est_tax,
                    &tax_rate,
                ) {
                    // 单价为正时数学上不应触发，防御性跳过而非静默接受
                    tracing::debug!("跳过蓝票 {}: 无法满足尾差校验 ({})", blue.fid, msg);
                    continue;
                }
            }
        }

        // 4. 吃光策略修正: 残留极小则取蓝票全部余额
        if (blue.current_remain_amount() - &final_match_amount).abs() < amount_tolerance() {
            final_match_amount = blue.current_remain_amount().clone();
        }

        let remain_before = blue.current_remain_amount().clone();

        // 5. 跳过零金额匹配
        if final_match_amount <= amount_tolerance() {
            continue;
        }

        blue.deduct(&final_match_amount, &final_match_num);

        if let Some(pref) = preferred_invoices.as_deref_mut() {
            pref.insert(blue.fid);
        }

        let blue = &candidates[idx];
        record_match(
            results,
            seq_counter,
            negative,
            blue,
            remain_before,
            unit_price,
            final_match_amount.clone(),
        );

        *remaining_amount = &*remaining_amount - &final_match_amount;
    }
}

/// 贪心大额优先匹配策略
pub struct GreedyLargeStrategy;

impl GreedyLargeStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GreedyLargeStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingStrategy for GreedyLargeStrategy {
    fn name(&self) -> &'static str {
        "greedy_large"
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

        // 快速路径: 精确匹配，一次性吃光蓝票全部余额
        if let Some(idx) = find_exact_match(&target_amount, candidates, &order) {
            let blue = &mut candidates[idx];
            if *blue.current_remain_amount() > BigDecimal::zero() {
                let unit_price = blue.effective_price();
                if is_positive(&unit_price) {
                    let final_match_amount = blue.current_remain_amount().clone();
                    let final_match_num = blue.current_remain_num().clone();
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

        // 常规路径: 贪心多票填充
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::{blue_item, negative_item, pool_of};
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_exact_match_fast_path_consumes_whole_line() {
        // 目标 100.00, 候选恰好 100.00 -> 一条记录，余额归零
        let mut pool = pool_of(
            "SKU-A",
            "0.13",
            vec![blue_item(1, 1, "100.00", "10", "10.00")],
        );
        let neg = negative_item(10, 1, "SKU-A", "0.13", "-100.00", "-10");

        let mut results = Vec::new();
        let mut seq = 0u64;
        let mut s = GreedyLargeStrategy::new();
        s.match_single_negative(&neg, &mut pool, &mut results, &mut seq, false)
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matched_amount, dec("100.00"));
        let key = PoolKey {
            fspbm: "SKU-A".into(),
            ftaxrate: "0.13".into(),
        };
        assert_eq!(
            pool[&key][0].current_remain_amount(),
            &BigDecimal::zero()
        );
        assert_eq!(pool[&key][0].current_remain_num(), &BigDecimal::zero());
    }

    #[test]
    fn test_greedy_fallback_integer_then_decimal() {
        // 目标 105.00, 两张 60.00 的蓝票 (单价 10):
        // 第一张吃光 60.00 (数量6), 第二张需要 45.00 ->
        // 整数方案 4×10=40 会留 5.00 缺口超容差被拒，回退小数方案数量 4.5
        let mut pool = pool_of(
            "SKU-A",
            "0.13",
            vec![
                blue_item(1, 1, "60.00", "6", "10.00"),
                blue_item(2, 1, "60.00", "6", "10.00"),
            ],
        );
        let neg = negative_item(10, 1, "SKU-A", "0.13", "-105.00", "-10.5");

        let mut results = Vec::new();
        let mut seq = 0u64;
        let mut s = GreedyLargeStrategy::new();
        s.match_single_negative(&neg, &mut pool, &mut results, &mut seq, false)
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].matched_amount, dec("60.00"));
        assert_eq!(results[1].matched_amount, dec("45.00"));
        let total: BigDecimal = results.iter().map(|r| r.matched_amount.clone()).sum();
        assert_eq!(total, dec("105.00"));
    }

    #[test]
    fn test_no_candidates_reports_failure_with_sku() {
        let mut pool = BluePool::new();
        let neg = negative_item(10, 1, "SKU-MISSING", "0.13", "-30.00", "-3");

        let mut results = Vec::new();
        let mut seq = 0u64;
        let mut s = GreedyLargeStrategy::new();
        let err = s
            .match_single_negative(&neg, &mut pool, &mut results, &mut seq, false)
            .unwrap_err();

        assert!(err.contains("SKU-MISSING"));
        assert!(results.is_empty());
    }

    #[test]
    fn test_exhausted_pool_reports_remaining() {
        // 候选只有 40.00, 目标 100.00 -> 失败，已产生的 40.00 记录保留
        let mut pool = pool_of(
            "SKU-A",
            "0.13",
            vec![blue_item(1, 1, "40.00", "4", "10.00")],
        );
        let neg = negative_item(10, 1, "SKU-A", "0.13", "-100.00", "-10");

        let mut results = Vec::new();
        let mut seq = 0u64;
        let mut s = GreedyLargeStrategy::new();
        let err = s
            .match_single_negative(&neg, &mut pool, &mut results, &mut seq, false)
            .unwrap_err();

        assert!(err.contains("未完全匹配"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matched_amount, dec("40.00"));
    }

    #[test]
    fn test_dust_clamp_takes_whole_balance() {
        // 候选 100.005, 目标 100.00 -> 残留 0.005 < 0.01, 直接吃光整行
        let mut pool = pool_of(
            "SKU-A",
            "0.13",
            vec![blue_item(1, 1, "100.005", "10", "0")],
        );
        let neg = negative_item(10, 1, "SKU-A", "0.13", "-100.00", "-10");

        let mut results = Vec::new();
        let mut seq = 0u64;
        let mut s = GreedyLargeStrategy::new();
        s.match_single_negative(&neg, &mut pool, &mut results, &mut seq, true)
            .unwrap();

        let key = PoolKey {
            fspbm: "SKU-A".into(),
            ftaxrate: "0.13".into(),
        };
        assert_eq!(pool[&key][0].current_remain_amount(), &BigDecimal::zero());
        assert_eq!(results[0].matched_amount, dec("100.005"));
    }

    #[test]
    fn test_remaining_balance_monotonic_non_negative() {
        let mut pool = pool_of(
            "SKU-A",
            "0.13",
            vec![
                blue_item(1, 1, "80.00", "8", "10.00"),
                blue_item(2, 1, "50.00", "5", "10.00"),
            ],
        );
        let key = PoolKey {
            fspbm: "SKU-A".into(),
            ftaxrate: "0.13".into(),
        };

        let mut results = Vec::new();
        let mut seq = 0u64;
        let mut s = GreedyLargeStrategy::new();
        for i in 0..3 {
            let neg = negative_item(20 + i, 1, "SKU-A", "0.13", "-40.00", "-4");
            let _ = s.match_single_negative(&neg, &mut pool, &mut results, &mut seq, true);
            for b in &pool[&key] {
                assert!(*b.current_remain_amount() >= BigDecimal::zero());
            }
        }
    }
}
