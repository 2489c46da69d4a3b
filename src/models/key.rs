use serde::{Deserialize, Serialize};

/// 完整兼容键: 候选池按此键加载与索引
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub fsalertaxno: String,
    pub fbuyertaxno: String,
    pub fspbm: String,
    pub ftaxrate: String,
}

impl GroupKey {
    pub fn of(negative: &crate::models::NegativeItem) -> Self {
        Self {
            fsalertaxno: negative.fsalertaxno.clone(),
            fbuyertaxno: negative.fbuyertaxno.clone(),
            fspbm: negative.fspbm.clone(),
            ftaxrate: negative.ftaxrate.clone(),
        }
    }

    /// 并行分区键 (销方, 购方)
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey {
            fsalertaxno: self.fsalertaxno.clone(),
            fbuyertaxno: self.fbuyertaxno.clone(),
        }
    }
}

/// 分区内候选池键: (商品编码, 税率)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub fspbm: String,
    pub ftaxrate: String,
}

impl PoolKey {
    pub fn of(negative: &crate::models::NegativeItem) -> Self {
        Self {
            fspbm: negative.fspbm.clone(),
            ftaxrate: negative.ftaxrate.clone(),
        }
    }
}

/// 并行分区键: 销购方组。分区之间不共享任何可变状态，
/// 发票复用策略的优先发票集合以此为隔离边界。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    pub fsalertaxno: String,
    pub fbuyertaxno: String,
}
