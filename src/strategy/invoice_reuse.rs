//! 发票复用匹配策略 (Invoice Reuse Strategy)
//!
//! 目标是最小化被动用的蓝票张数:
//! - 稀缺度排序: 候选越稀缺的负数明细越先处理，避免稀缺池被挤占
//! - 优先发票集合: 同一销购方分区内，已被动用过的发票优先继续消耗，
//!   跨 SKU 共享该集合 (一张发票含多个商品行)
//! - 在优先序基础上仍执行精确匹配快速路径与贪心填充

use crate::models::{MatchResult, NegativeItem, PoolKey};
use crate::money::amount_tolerance;
use crate::strategy::greedy_large::{find_exact_match, greedy_fill, record_match};
use crate::strategy::{BluePool, MatchingStrategy};
use bigdecimal::{BigDecimal, Zero};
use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};

/// 发票复用匹配策略
///
/// 实例与分区一一对应，`preferred_invoices` 不跨分区共享。
pub struct InvoiceReuseStrategy {
    /// 已动用发票 fid 集合，保留插入顺序
    preferred_invoices: IndexSet<i64>,
    /// 池统计: {(商品编码, 税率): (有效候选数, 剩余总额)}
    pool_stats: HashMap<PoolKey, (usize, BigDecimal)>,
}

impl InvoiceReuseStrategy {
    pub fn new() -> Self {
        Self {
            preferred_invoices: IndexSet::new(),
            pool_stats: HashMap::new(),
        }
    }

    fn scarcity(&self, negative: &NegativeItem) -> (usize, BigDecimal) {
        let key = PoolKey::of(negative);
        self.pool_stats
            .get(&key)
            .cloned()
            .unwrap_or((0, BigDecimal::zero()))
    }
}

impl Default for InvoiceReuseStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingStrategy for InvoiceReuseStrategy {
    fn name(&self) -> &'static str {
        "invoice_reuse"
    }

    /// 统计各池的有效候选数与剩余总额 (余额 > 0 的才算)
    fn set_blue_pool(&mut self, blue_pool: &BluePool) {
        self.pool_stats.clear();
        for (key, candidates) in blue_pool {
            let mut count = 0usize;
            let mut total = BigDecimal::zero();
            for b in candidates {
                if *b.current_remain_amount() > BigDecimal::zero() {
                    count += 1;
                    total += b.current_remain_amount();
                }
            }
            self.pool_stats.insert(key.clone(), (count, total));
        }
    }

    /// 稀缺度升序: 候选数少的先匹配，候选数相同时剩余总额少的先匹配
    fn pre_process_negatives(&mut self, mut negatives: Vec<NegativeItem>) -> Vec<NegativeItem> {
        negatives.sort_by(|a, b| {
            let sa = self.scarcity(a);
            let sb = self.scarcity(b);
            sa.0.cmp(&sb.0).then_with(|| sa.1.cmp(&sb.1))
        });
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

        // 去重 (fid, fentryid) 后分组: 已动用发票的行排在前面，
        // 两段内部均保持池内原有排序 (余额降序、开票时间升序)
        let mut seen: HashSet<(i64, i64)> = HashSet::new();
        let mut preferred_order: Vec<usize> = Vec::new();
        let mut other_order: Vec<usize> = Vec::new();
        for (i, b) in candidates.iter().enumerate() {
            if !seen.insert((b.fid, b.fentryid)) {
                continue;
            }
            if self.preferred_invoices.contains(&b.fid) {
                preferred_order.push(i);
            } else {
                other_order.push(i);
            }
        }
        let order: Vec<usize> = preferred_order.into_iter().chain(other_order).collect();

        let target_amount = negative.target_amount();
        let mut remaining_amount = target_amount.clone();

        // 快速路径: 优先序下的精确匹配，整行吃光并登记为优先发票
        if let Some(idx) = find_exact_match(&target_amount, candidates, &order) {
            let blue = &mut candidates[idx];
            if *blue.current_remain_amount() > BigDecimal::zero() {
                let unit_price = blue.effective_price();
                if crate::money::is_positive(&unit_price) {
                    let final_match_amount = blue.current_remain_amount().clone();
                    let final_match_num = blue.current_remain_num().clone();
                    let remain_before = blue.current_remain_amount().clone();

                    blue.deduct(&final_match_amount, &final_match_num);
                    self.preferred_invoices.insert(blue.fid);

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

        // 常规路径: 按优先序贪心填充，动用的发票进入优先集合
        greedy_fill(
            negative,
            candidates,
            &order,
            &mut remaining_amount,
            results,
            seq_counter,
            skip_validation,
            Some(&mut self.preferred_invoices),
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
    use crate::strategy::test_support::{blue_item, dec, negative_item, pool_of};

    #[test]
    fn test_preferred_invoice_lines_consumed_before_fresh_invoice() {
        // 发票1有两行 (500, 100)，发票2有一行 (300)。
        // 第一次匹配动用了发票1后，第二次匹配应继续消耗发票1的两行，
        // 即使发票2的 300 排在发票1的 100 前面
        let mut line_a = blue_item(1, 1, "500.00", "50", "10.00");
        line_a.finvoiceno = "INV000001".into();
        let mut line_b = blue_item(1, 2, "100.00", "10", "10.00");
        line_b.finvoiceno = "INV000001".into();
        let other = blue_item(2, 1, "300.00", "30", "10.00");

        let mut pool = pool_of("SKU-A", "0.13", vec![line_a, line_b, other]);
        let mut results = Vec::new();
        let mut seq = 0u64;
        let mut s = InvoiceReuseStrategy::new();

        let neg1 = negative_item(10, 1, "SKU-A", "0.13", "-450.00", "-45");
        s.match_single_negative(&neg1, &mut pool, &mut results, &mut seq, false)
            .unwrap();
        assert!(s_contains_fid(&results, 1));

        let neg2 = negative_item(11, 1, "SKU-A", "0.13", "-120.00", "-12");
        results.clear();
        s.match_single_negative(&neg2, &mut pool, &mut results, &mut seq, false)
            .unwrap();

        // 两条记录都来自发票1, 发票2完好
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.blue_fid == 1));
        let key = PoolKey {
            fspbm: "SKU-A".into(),
            ftaxrate: "0.13".into(),
        };
        let untouched = pool[&key].iter().find(|b| b.fid == 2).unwrap();
        assert_eq!(untouched.current_remain_amount(), &dec("300.00"));
    }

    #[test]
    fn test_exact_match_registers_preferred_invoice() {
        let mut pool = pool_of(
            "SKU-A",
            "0.13",
            vec![
                blue_item(1, 1, "500.00", "50", "10.00"),
                blue_item(2, 1, "80.00", "8", "10.00"),
            ],
        );
        let neg = negative_item(10, 1, "SKU-A", "0.13", "-80.00", "-8");

        let mut results = Vec::new();
        let mut seq = 0u64;
        let mut s = InvoiceReuseStrategy::new();
        s.match_single_negative(&neg, &mut pool, &mut results, &mut seq, false)
            .unwrap();

        assert_eq!(results[0].blue_fid, 2);
        assert!(s.preferred_invoices.contains(&2));
    }

    #[test]
    fn test_scarcity_sort_puts_thin_pool_first() {
        // SKU-A 只有 1 张候选, SKU-B 有 3 张 -> SKU-A 的负数先处理
        let mut pool = pool_of("SKU-A", "0.13", vec![blue_item(1, 1, "50.00", "5", "10.00")]);
        let pool_b = pool_of(
            "SKU-B",
            "0.13",
            vec![
                blue_item(2, 1, "200.00", "20", "10.00"),
                blue_item(3, 1, "200.00", "20", "10.00"),
                blue_item(4, 1, "100.00", "10", "10.00"),
            ],
        );
        pool.extend(pool_b);

        let mut s = InvoiceReuseStrategy::new();
        s.set_blue_pool(&pool);

        let negatives = vec![
            negative_item(10, 1, "SKU-B", "0.13", "-100.00", "-10"),
            negative_item(11, 1, "SKU-A", "0.13", "-50.00", "-5"),
        ];
        let sorted = s.pre_process_negatives(negatives);
        assert_eq!(sorted[0].fspbm, "SKU-A");
        assert_eq!(sorted[1].fspbm, "SKU-B");
    }

    #[test]
    fn test_duplicate_candidate_lines_counted_once() {
        // 同一 (fid, fentryid) 重复出现时只消耗一次
        let mut pool = pool_of(
            "SKU-A",
            "0.13",
            vec![
                blue_item(1, 1, "60.00", "6", "10.00"),
                blue_item(1, 1, "60.00", "6", "10.00"),
            ],
        );
        let neg = negative_item(10, 1, "SKU-A", "0.13", "-100.00", "-10");

        let mut results = Vec::new();
        let mut seq = 0u64;
        let mut s = InvoiceReuseStrategy::new();
        let err = s
            .match_single_negative(&neg, &mut pool, &mut results, &mut seq, false)
            .unwrap_err();

        assert!(err.contains("未完全匹配"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matched_amount, dec("60.00"));
    }

    fn s_contains_fid(results: &[MatchResult], fid: i64) -> bool {
        results.iter().any(|r| r.blue_fid == fid)
    }
}
