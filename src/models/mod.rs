pub mod blue;
pub mod key;
pub mod negative;
pub mod result;

pub use blue::BlueItem;
pub use key::{GroupKey, PartitionKey, PoolKey};
pub use negative::NegativeItem;
pub use result::{FailureRecord, InvoiceSummary, MatchResult, MatchStats, SkuSummary};
