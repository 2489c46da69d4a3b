//! 匹配编排服务
//!
//! 两阶段协议:
//! 1. 并行阶段: 按销购方分区切分，rayon 工作池内各分区用私有策略实例
//!    和私有候选池匹配，`skip_validation = true` 跳过尾差裁决
//! 2. 串行阶段: 按分区键顺序合并结果，单线程批量校验 (默认税率重算
//!    数量与估算税额)，剔除并计数不合格记录，统一重排序号

use crate::error::MatchError;
use crate::models::{FailureRecord, GroupKey, MatchResult, MatchStats, NegativeItem, PartitionKey};
use crate::money::{
    default_tax_rate, is_positive, parse_tax_rate, round_amount, round_quantity,
    validate_tail_diff,
};
use crate::service::loader::{preload_partitions, CandidateLoader};
use crate::strategy::{create_strategy, BluePool};
use bigdecimal::{BigDecimal, Zero};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// 单次批量匹配的完整产出
#[derive(Debug)]
pub struct MatchOutcome {
    /// 校验通过、全局重排序号后的匹配记录
    pub results: Vec<MatchResult>,
    /// 未能匹配的负数明细及原因
    pub failures: Vec<FailureRecord>,
    /// 运行统计
    pub stats: MatchStats,
    /// 各分区匹配后的候选池剩余状态 (供汇总投影使用)
    pub remaining_pools: BTreeMap<PartitionKey, BluePool>,
}

/// 匹配服务
pub struct MatcherService {
    loader: Arc<dyn CandidateLoader>,
    loader_workers: usize,
}

impl MatcherService {
    pub fn new(loader: Arc<dyn CandidateLoader>, loader_workers: usize) -> Self {
        Self {
            loader,
            loader_workers,
        }
    }

    /// 批量匹配入口
    ///
    /// 配置类错误 (未知策略、分组键缺失、税率不可解析) 在任何分配开始前
    /// 返回 Err; 单条明细匹配失败进入 `failures`，整体仍然成功。
    pub fn batch_match(
        &self,
        strategy_name: &str,
        negatives: Vec<NegativeItem>,
    ) -> Result<MatchOutcome, MatchError> {
        // 策略名预检，分区内再各自实例化
        create_strategy(strategy_name)?;
        preflight_check(&negatives)?;

        let total_negatives = negatives.len();

        // 按销购方分区分组，BTreeMap 保证合并顺序确定
        let mut grouped: BTreeMap<PartitionKey, Vec<NegativeItem>> = BTreeMap::new();
        for negative in negatives {
            let key = GroupKey::of(&negative).partition_key();
            grouped.entry(key).or_default().push(negative);
        }

        let partition_keys: Vec<PartitionKey> = grouped.keys().cloned().collect();
        let mut pools =
            preload_partitions(self.loader.as_ref(), &partition_keys, self.loader_workers)?;

        tracing::info!(
            "开始匹配: 策略={}, 负数明细={}, 分区={}",
            strategy_name,
            total_negatives,
            grouped.len()
        );

        let jobs: Vec<(PartitionKey, Vec<NegativeItem>, BluePool)> = grouped
            .into_iter()
            .map(|(key, negs)| {
                let pool = pools.remove(&key).unwrap_or_default();
                (key, negs, pool)
            })
            .collect();

        // 并行阶段: 分区私有状态，结果顺序与分区键顺序一致
        let partition_outputs: Vec<PartitionOutput> = jobs
            .into_par_iter()
            .map(|(key, negs, mut pool)| run_partition(strategy_name, &key, negs, &mut pool))
            .collect();

        // 串行阶段: 合并、批量校验、重排序号
        let mut merged: Vec<MatchResult> = Vec::new();
        let mut failures: Vec<FailureRecord> = Vec::new();
        let mut matched_count = 0usize;
        let mut remaining_pools: BTreeMap<PartitionKey, BluePool> = BTreeMap::new();
        for output in partition_outputs {
            merged.extend(output.results);
            failures.extend(output.failures);
            matched_count += output.matched_count;
            remaining_pools.insert(output.key, output.pool);
        }

        let (mut results, dropped_by_validation) = batch_validate(merged);
        for (i, r) in results.iter_mut().enumerate() {
            r.seq = (i + 1) as u64;
        }

        let stats = compute_stats(
            total_negatives,
            matched_count,
            failures.len(),
            dropped_by_validation,
            &results,
        );
        tracing::info!(
            "匹配完成: 明细总数: {}, 已匹配: {}, 失败: {}, 校验剔除: {}, 已用发票: {}",
            stats.total_negatives,
            stats.matched_count,
            stats.failed_count,
            stats.dropped_by_validation,
            stats.invoices_used
        );

        Ok(MatchOutcome {
            results,
            failures,
            stats,
            remaining_pools,
        })
    }
}

/// 入场校验: 分组键与税率必须在任何分配开始前合法
fn preflight_check(negatives: &[NegativeItem]) -> Result<(), MatchError> {
    for n in negatives {
        if n.fsalertaxno.trim().is_empty() || n.fbuyertaxno.trim().is_empty() {
            return Err(MatchError::MalformedGroupKey {
                saler: n.fsalertaxno.clone(),
                buyer: n.fbuyertaxno.clone(),
            });
        }
        if parse_tax_rate(&n.ftaxrate).is_none() {
            return Err(MatchError::InvalidTaxRate {
                raw: n.ftaxrate.clone(),
                billno: n.fbillno.clone(),
                spbm: n.fspbm.clone(),
            });
        }
    }
    Ok(())
}

struct PartitionOutput {
    key: PartitionKey,
    pool: BluePool,
    results: Vec<MatchResult>,
    failures: Vec<FailureRecord>,
    matched_count: usize,
}

/// 单分区匹配 (并行阶段的工作单元)
fn run_partition(
    strategy_name: &str,
    key: &PartitionKey,
    negatives: Vec<NegativeItem>,
    pool: &mut BluePool,
) -> PartitionOutput {
    let mut strategy = match create_strategy(strategy_name) {
        Ok(s) => s,
        Err(e) => {
            // 入口已预检过策略名，此分支仅为兜底
            let reason = e.to_string();
            return PartitionOutput {
                key: key.clone(),
                pool: std::mem::take(pool),
                results: Vec::new(),
                failures: negatives
                    .into_iter()
                    .map(|negative| FailureRecord {
                        negative,
                        reason: reason.clone(),
                    })
                    .collect(),
                matched_count: 0,
            };
        }
    };

    strategy.set_blue_pool(pool);
    let negatives = strategy.pre_process_negatives(negatives);
    let total = negatives.len();

    let mut results: Vec<MatchResult> = Vec::new();
    let mut failures: Vec<FailureRecord> = Vec::new();
    let mut seq_counter = 0u64;
    let mut matched_count = 0usize;

    for (idx, negative) in negatives.iter().enumerate() {
        match strategy.match_single_negative(negative, pool, &mut results, &mut seq_counter, true)
        {
            Ok(()) => matched_count += 1,
            Err(reason) => failures.push(FailureRecord {
                negative: negative.clone(),
                reason,
            }),
        }

        let current = idx + 1;
        if current % 100 == 0 || current == 1 {
            tracing::info!(
                "分区 {}/{} SKU进度: {}/{}, 已匹配: {}",
                key.fsalertaxno,
                key.fbuyertaxno,
                current,
                total,
                matched_count
            );
        }
    }

    PartitionOutput {
        key: key.clone(),
        pool: std::mem::take(pool),
        results,
        failures,
        matched_count,
    }
}

/// 批量校验 (串行阶段)
///
/// 用默认税率重算数量与估算税额做尾差裁决。并行阶段跳过的校验在这里
/// 统一补做，不合格记录剔除并计数。
fn batch_validate(results: Vec<MatchResult>) -> (Vec<MatchResult>, usize) {
    let default_rate = default_tax_rate();
    let mut kept = Vec::with_capacity(results.len());
    let mut dropped = 0usize;

    for r in results {
        if !is_positive(&r.unit_price) {
            dropped += 1;
            tracing::warn!(
                "批量校验剔除记录 - 蓝票: {}/{}, 原因: 单价非正",
                r.blue_fid,
                r.blue_entryid
            );
            continue;
        }

        let quantity = round_quantity(&(&r.matched_amount / &r.unit_price));
        let est_tax = round_amount(&(&r.matched_amount * &default_rate));
        match validate_tail_diff(&r.matched_amount, &quantity, &r.unit_price, &est_tax, &default_rate)
        {
            Ok(()) => kept.push(r),
            Err(msg) => {
                dropped += 1;
                tracing::warn!(
                    "批量校验剔除记录 - 蓝票: {}/{}, 原因: {}",
                    r.blue_fid,
                    r.blue_entryid,
                    msg
                );
            }
        }
    }

    (kept, dropped)
}

fn compute_stats(
    total_negatives: usize,
    matched_count: usize,
    failed_count: usize,
    dropped_by_validation: usize,
    results: &[MatchResult],
) -> MatchStats {
    let mut total_matched_amount = BigDecimal::zero();
    let mut blue_lines: HashSet<(i64, i64)> = HashSet::new();
    let mut invoices: HashSet<i64> = HashSet::new();
    let mut skus: HashSet<&str> = HashSet::new();
    for r in results {
        total_matched_amount += &r.matched_amount;
        blue_lines.insert((r.blue_fid, r.blue_entryid));
        invoices.insert(r.blue_fid);
        skus.insert(r.sku_code.as_str());
    }

    MatchStats {
        total_negatives,
        matched_count,
        failed_count,
        dropped_by_validation,
        total_matched_amount,
        blue_lines_used: blue_lines.len(),
        invoices_used: invoices.len(),
        skus_touched: skus.len(),
    }
}
