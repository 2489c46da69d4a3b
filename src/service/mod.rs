pub mod aggregator;
pub mod loader;
pub mod matcher;
pub mod summary;
pub mod writer;

pub use aggregator::aggregate_results;
pub use loader::{build_pool, preload_partitions, CandidateLoader, InMemoryLoader};
pub use matcher::{MatchOutcome, MatcherService};
pub use summary::{build_invoice_summaries, build_sku_summaries};
pub use writer::{OutputConfig, ResultWriter};
