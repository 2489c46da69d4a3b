//! 汇总投影
//!
//! 匹配产出的两张统计视图: 按 SKU 的供需对照、按发票的整票红冲判断。

use crate::models::{InvoiceSummary, MatchResult, NegativeItem, PartitionKey, SkuSummary};
use crate::money::{is_positive, round_quantity, round_quantity_export};
use crate::strategy::BluePool;
use bigdecimal::{BigDecimal, Zero};
use std::collections::{BTreeMap, HashSet};

/// 按 SKU 汇总供需与匹配情况，SKU 编码升序输出
pub fn build_sku_summaries(
    negatives: &[NegativeItem],
    results: &[MatchResult],
    remaining_pools: &BTreeMap<PartitionKey, BluePool>,
) -> Vec<SkuSummary> {
    let mut by_sku: BTreeMap<String, SkuSummary> = BTreeMap::new();

    for n in negatives {
        let entry = by_sku
            .entry(n.fspbm.clone())
            .or_insert_with(|| empty_sku_summary(&n.fspbm));
        entry.demand_amount += n.famount.abs();
        entry.demand_quantity += n.fnum.abs();
    }

    let mut lines_by_sku: BTreeMap<String, HashSet<(i64, i64)>> = BTreeMap::new();
    let mut invoices_by_sku: BTreeMap<String, HashSet<i64>> = BTreeMap::new();
    for r in results {
        let entry = by_sku
            .entry(r.sku_code.clone())
            .or_insert_with(|| empty_sku_summary(&r.sku_code));
        entry.matched_amount += &r.matched_amount;
        if is_positive(&r.unit_price) {
            entry.matched_quantity += round_quantity(&(&r.matched_amount / &r.unit_price));
        }
        lines_by_sku
            .entry(r.sku_code.clone())
            .or_default()
            .insert((r.blue_fid, r.blue_entryid));
        invoices_by_sku
            .entry(r.sku_code.clone())
            .or_default()
            .insert(r.blue_fid);
    }

    for pool in remaining_pools.values() {
        for (key, candidates) in pool {
            let Some(entry) = by_sku.get_mut(&key.fspbm) else {
                continue;
            };
            for b in candidates {
                entry.remaining_pool_amount += b.current_remain_amount();
            }
        }
    }

    by_sku
        .into_values()
        .map(|mut s| {
            s.matched_quantity = round_quantity_export(&s.matched_quantity);
            s.matched_line_count = lines_by_sku.get(&s.sku_code).map_or(0, HashSet::len);
            s.matched_invoice_count = invoices_by_sku.get(&s.sku_code).map_or(0, HashSet::len);
            s
        })
        .collect()
}

/// 按发票汇总红冲情况，fid 升序输出
pub fn build_invoice_summaries(
    results: &[MatchResult],
    remaining_pools: &BTreeMap<PartitionKey, BluePool>,
) -> Vec<InvoiceSummary> {
    let mut by_invoice: BTreeMap<i64, InvoiceSummary> = BTreeMap::new();
    let mut lines_by_invoice: BTreeMap<i64, HashSet<i64>> = BTreeMap::new();

    for r in results {
        let entry = by_invoice
            .entry(r.blue_fid)
            .or_insert_with(|| InvoiceSummary {
                blue_fid: r.blue_fid,
                blue_invoice_no: r.blue_invoice_no.clone(),
                fissuetime: r.fissuetime,
                matched_line_count: 0,
                matched_amount: BigDecimal::zero(),
                remaining_amount: BigDecimal::zero(),
            });
        entry.matched_amount += &r.matched_amount;
        if entry.fissuetime.is_none() {
            entry.fissuetime = r.fissuetime;
        }
        lines_by_invoice
            .entry(r.blue_fid)
            .or_default()
            .insert(r.blue_entryid);
    }

    for pool in remaining_pools.values() {
        for candidates in pool.values() {
            for b in candidates {
                if let Some(entry) = by_invoice.get_mut(&b.fid) {
                    entry.remaining_amount += b.current_remain_amount();
                }
            }
        }
    }

    by_invoice
        .into_values()
        .map(|mut s| {
            s.matched_line_count = lines_by_invoice.get(&s.blue_fid).map_or(0, HashSet::len);
            s
        })
        .collect()
}

fn empty_sku_summary(sku_code: &str) -> SkuSummary {
    SkuSummary {
        sku_code: sku_code.to_string(),
        demand_amount: BigDecimal::zero(),
        demand_quantity: BigDecimal::zero(),
        matched_amount: BigDecimal::zero(),
        matched_quantity: BigDecimal::zero(),
        matched_line_count: 0,
        matched_invoice_count: 0,
        remaining_pool_amount: BigDecimal::zero(),
    }
}
