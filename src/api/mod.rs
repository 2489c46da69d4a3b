mod handlers;

pub use handlers::{batch_match, health_check, BatchMatchRequest, BatchMatchResponse, SupplyGroup};
