pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod money;
pub mod service;
pub mod strategy;

pub use config::AppConfig;
pub use error::MatchError;
pub use service::{MatcherService, ResultWriter};
pub use strategy::{create_strategy, list_strategies, MatchingStrategy};
