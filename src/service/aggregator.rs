//! 结果聚合
//!
//! 同一蓝票行可能被多条负数明细分次扣减，开具红字发票前按
//! (蓝票fid, 蓝票行号) 合并为单条记录。数量不做累加，用
//! 合并后金额 / 单价 反算，避免分次数量舍入误差叠加。

use crate::models::MatchResult;
use crate::money::{amount_tolerance, round_amount, round_quantity, validate_tail_diff};
use bigdecimal::BigDecimal;
use indexmap::IndexMap;

/// 按蓝票行合并匹配记录
///
/// - 金额累加，其余字段取首条记录
/// - `remain_amount_before` 取首条记录的值 (首次扣减前的池内余额)
/// - 合并后用携带税率做尾差再校验，不一致只告警不剔除
/// - 合并金额不超过容差的记录整条过滤
/// - 序号重新从 1 编排
pub fn aggregate_results(results: &[MatchResult]) -> Vec<MatchResult> {
    let mut merged: IndexMap<(i64, i64), MatchResult> = IndexMap::new();

    for r in results {
        let key = (r.blue_fid, r.blue_entryid);
        match merged.get_mut(&key) {
            Some(agg) => {
                agg.matched_amount = &agg.matched_amount + &r.matched_amount;
            }
            None => {
                let mut agg = r.clone();
                // 聚合记录跨多条原始记录，不再对应单一开票时间
                agg.fissuetime = None;
                merged.insert(key, agg);
            }
        }
    }

    let mut aggregated: Vec<MatchResult> = Vec::with_capacity(merged.len());
    for (_, mut agg) in merged {
        if agg.matched_amount <= amount_tolerance() {
            continue;
        }

        if crate::money::is_positive(&agg.unit_price) {
            let quantity = round_quantity(&(&agg.matched_amount / &agg.unit_price));
            let est_tax = round_amount(&(&agg.matched_amount * &agg.tax_rate));
            if let Err(msg) = validate_tail_diff(
                &agg.matched_amount,
                &quantity,
                &agg.unit_price,
                &est_tax,
                &agg.tax_rate,
            ) {
                tracing::warn!(
                    "聚合记录尾差告警 - 蓝票: {}/{}, 金额: {}, 原因: {}",
                    agg.blue_fid,
                    agg.blue_entryid,
                    agg.matched_amount,
                    msg
                );
            }
        }

        agg.seq = (aggregated.len() + 1) as u64;
        aggregated.push(agg);
    }

    aggregated
}

/// 聚合记录的导出数量 (合并金额 / 单价)
pub fn aggregated_quantity(result: &MatchResult) -> BigDecimal {
    if crate::money::is_positive(&result.unit_price) {
        round_quantity(&(&result.matched_amount / &result.unit_price))
    } else {
        BigDecimal::from(0)
    }
}
