//! 发票复用兼容策略 (Invoice Reuse Compat Strategy)
//!
//! 与上游存量系统对齐的复用变体，行为与 invoice_reuse 有三处刻意差异:
//! - 候选按商品编码聚合，忽略税率维度
//! - 优先发票行按余额升序消耗 (先清小票)，其余行按余额降序
//! - 部分分配即算成功，仅在一分钱都分配不出时失败;
//!   不做整数数量优化、精确匹配快速路径和尾差校验

use crate::models::{MatchResult, NegativeItem, PoolKey};
use crate::money::{amount_tolerance, is_positive, round_quantity};
use crate::strategy::greedy_large::record_match;
use crate::strategy::{BluePool, MatchingStrategy};
use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, Zero};
use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};

/// 发票复用兼容策略
pub struct InvoiceReuseCompatStrategy {
    /// 已动用发票 fid 集合
    preferred_invoices: IndexSet<i64>,
    /// 池统计 (按商品编码聚合): {商品编码: (有效候选数, 剩余总额)}
    sku_stats: HashMap<String, (usize, BigDecimal)>,
}

impl InvoiceReuseCompatStrategy {
    pub fn new() -> Self {
        Self {
            preferred_invoices: IndexSet::new(),
            sku_stats: HashMap::new(),
        }
    }

    fn scarcity(&self, negative: &NegativeItem) -> (usize, BigDecimal) {
        self.sku_stats
            .get(&negative.fspbm)
            .cloned()
            .unwrap_or((0, BigDecimal::zero()))
    }
}

impl Default for InvoiceReuseCompatStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingStrategy for InvoiceReuseCompatStrategy {
    fn name(&self) -> &'static str {
        "invoice_reuse_compat"
    }

    fn set_blue_pool(&mut self, blue_pool: &BluePool) {
        self.sku_stats.clear();
        for (key, candidates) in blue_pool {
            let entry = self
                .sku_stats
                .entry(key.fspbm.clone())
                .or_insert_with(|| (0, BigDecimal::zero()));
            for b in candidates {
                if *b.current_remain_amount() > BigDecimal::zero() {
                    entry.0 += 1;
                    entry.1 += b.current_remain_amount();
                }
            }
        }
    }

    /// 稀缺度升序，与 invoice_reuse 相同的预处理
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
        _skip_validation: bool,
    ) -> Result<(), String> {
        // 跨税率收集同商品编码的所有候选行，按 fentryid 去重
        let mut seen_entries: HashSet<i64> = HashSet::new();
        let mut preferred: Vec<(PoolKey, usize, BigDecimal)> = Vec::new();
        let mut others: Vec<(PoolKey, usize, BigDecimal)> = Vec::new();
        for (key, candidates) in blue_pool.iter() {
            if key.fspbm != negative.fspbm {
                continue;
            }
            for (i, b) in candidates.iter().enumerate() {
                if *b.current_remain_amount() <= BigDecimal::zero() {
                    continue;
                }
                if !seen_entries.insert(b.fentryid) {
                    continue;
                }
                let snapshot = b.current_remain_amount().clone();
                if self.preferred_invoices.contains(&b.fid) {
                    preferred.push((key.clone(), i, snapshot));
                } else {
                    others.push((key.clone(), i, snapshot));
                }
            }
        }
        // 优先行升序先清小票，其余行降序先用大票; 金额相同按税率、行序稳定排序
        preferred.sort_by(|a, b| {
            a.2.cmp(&b.2)
                .then_with(|| a.0.ftaxrate.cmp(&b.0.ftaxrate))
                .then_with(|| a.1.cmp(&b.1))
        });
        others.sort_by(|a, b| {
            b.2.cmp(&a.2)
                .then_with(|| a.0.ftaxrate.cmp(&b.0.ftaxrate))
                .then_with(|| a.1.cmp(&b.1))
        });

        let target_amount = negative.target_amount();
        let mut remaining_amount = target_amount.clone();
        let mut allocated_any = false;
        // 剩余低于 0.001 视为分配完毕
        let stop_threshold = BigDecimal::new(BigInt::from(1), 3);

        for (key, idx, _) in preferred.into_iter().chain(others) {
            if remaining_amount < stop_threshold {
                break;
            }
            let Some(candidates) = blue_pool.get_mut(&key) else {
                continue;
            };
            let blue = &mut candidates[idx];
            if *blue.current_remain_amount() <= BigDecimal::zero() {
                continue;
            }

            let use_amount = if blue.current_remain_amount() < &remaining_amount {
                blue.current_remain_amount().clone()
            } else {
                remaining_amount.clone()
            };
            // 低于容差的分配不产生记录
            if use_amount <= amount_tolerance() {
                continue;
            }

            // 单价回退链: 有效单价 -> 余额/原始可红冲数量 -> 全额计一件
            let mut unit_price = blue.effective_price();
            if !is_positive(&unit_price) && blue.fitemremainrednum > BigDecimal::zero() {
                unit_price = blue.current_remain_amount() / &blue.fitemremainrednum;
            }
            if !is_positive(&unit_price) {
                unit_price = use_amount.clone();
            }

            let use_num = round_quantity(&(&use_amount / &unit_price));
            let remain_before = blue.current_remain_amount().clone();

            blue.deduct(&use_amount, &use_num);
            self.preferred_invoices.insert(blue.fid);
            allocated_any = true;

            let blue = &candidates[idx];
            record_match(
                results,
                seq_counter,
                negative,
                blue,
                remain_before,
                unit_price,
                use_amount.clone(),
            );

            remaining_amount = &remaining_amount - &use_amount;
        }

        if !allocated_any {
            let reason = format!(
                "找不到可用的蓝票 - 单据: {}, SKU: {}",
                negative.fbillno, negative.fspbm
            );
            tracing::warn!("{}", reason);
            return Err(reason);
        }

        if remaining_amount >= stop_threshold {
            tracing::debug!(
                "兼容策略部分分配 - 单据: {}, SKU: {}, 未分配: {}",
                negative.fbillno,
                negative.fspbm,
                remaining_amount
            );
        }
        Ok(())
    }
}
