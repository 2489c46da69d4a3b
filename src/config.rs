use crate::strategy::DEFAULT_STRATEGY;
use serde::{Deserialize, Serialize};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// 请求未指定时使用的策略名
    pub default_strategy: String,
    /// 候选加载线程数 (上限 4)
    pub loader_workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            matching: MatchingConfig {
                default_strategy: DEFAULT_STRATEGY.to_string(),
                loader_workers: 4,
            },
        }
    }
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
            },
            matching: MatchingConfig {
                default_strategy: std::env::var("MATCH_STRATEGY")
                    .unwrap_or_else(|_| DEFAULT_STRATEGY.to_string()),
                loader_workers: std::env::var("LOADER_WORKERS")
                    .ok()
                    .and_then(|w| w.parse().ok())
                    .unwrap_or(4),
            },
        }
    }
}
