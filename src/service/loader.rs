//! 候选蓝票加载
//!
//! 引擎本身不做 I/O，候选数据通过 `CandidateLoader` 接缝进入。
//! 预加载阶段用独立线程池并发拉取各分区的候选，线程数上限 4。

use crate::error::MatchError;
use crate::models::{BlueItem, PartitionKey, PoolKey};
use crate::strategy::BluePool;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// 加载线程数上限
pub const MAX_LOADER_WORKERS: usize = 4;

/// 候选蓝票加载接缝
///
/// 实现方负责按销购方分区返回该分区的全部蓝票明细行，
/// 余额排序与池索引由引擎统一处理。
pub trait CandidateLoader: Send + Sync {
    fn load_partition(&self, partition: &PartitionKey) -> Result<Vec<BlueItem>, MatchError>;
}

/// 内存数据集加载器: 调用方一次性交付全部候选
pub struct InMemoryLoader {
    partitions: HashMap<PartitionKey, Vec<BlueItem>>,
}

impl InMemoryLoader {
    pub fn new(partitions: HashMap<PartitionKey, Vec<BlueItem>>) -> Self {
        Self { partitions }
    }
}

impl CandidateLoader for InMemoryLoader {
    fn load_partition(&self, partition: &PartitionKey) -> Result<Vec<BlueItem>, MatchError> {
        Ok(self.partitions.get(partition).cloned().unwrap_or_default())
    }
}

/// 把明细行构建成分区内候选池
///
/// 按 (商品编码, 税率) 建索引，每个候选列表按剩余金额降序、开票时间升序排列。
/// 动态余额统一重置，保证任何来源的实例入池时余额等于原始可红冲值。
pub fn build_pool(items: Vec<BlueItem>) -> BluePool {
    let mut pool: BluePool = HashMap::new();
    for mut item in items {
        item.reset_remaining();
        let key = PoolKey {
            fspbm: item.fspbm.clone(),
            ftaxrate: item.ftaxrate.clone(),
        };
        pool.entry(key).or_default().push(item);
    }
    for candidates in pool.values_mut() {
        candidates.sort_by(|a, b| {
            b.current_remain_amount()
                .cmp(a.current_remain_amount())
                .then_with(|| a.fissuetime.cmp(&b.fissuetime))
        });
    }
    pool
}

/// 并发预加载全部分区的候选池
///
/// 固定数量的工作线程通过原子游标领取分区任务。任一分区加载失败即
/// 整体失败 (配置/数据源错误)，其余线程在下一次领取任务时退出。
pub fn preload_partitions(
    loader: &dyn CandidateLoader,
    partitions: &[PartitionKey],
    workers: usize,
) -> Result<HashMap<PartitionKey, BluePool>, MatchError> {
    if partitions.is_empty() {
        return Ok(HashMap::new());
    }

    let worker_count = workers.clamp(1, MAX_LOADER_WORKERS).min(partitions.len());
    let pools: DashMap<PartitionKey, BluePool> = DashMap::new();
    let cursor = AtomicUsize::new(0);
    let first_error: Mutex<Option<MatchError>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            scope.spawn(|| loop {
                let aborted = first_error
                    .lock()
                    .map(|slot| slot.is_some())
                    .unwrap_or(true);
                if aborted {
                    break;
                }

                let i = cursor.fetch_add(1, Ordering::SeqCst);
                let Some(partition) = partitions.get(i) else {
                    break;
                };

                match loader.load_partition(partition) {
                    Ok(items) => {
                        pools.insert(partition.clone(), build_pool(items));
                    }
                    Err(e) => {
                        tracing::error!("分区候选加载失败: {:?} - {}", partition, e);
                        if let Ok(mut slot) = first_error.lock() {
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                        }
                        break;
                    }
                }
            });
        }
    });

    let failure = first_error
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(e) = failure {
        return Err(e);
    }

    Ok(pools.into_iter().collect())
}
