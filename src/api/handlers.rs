use crate::config::AppConfig;
use crate::models::{BlueItem, FailureRecord, MatchResult, MatchStats, NegativeItem, PartitionKey};
use crate::service::{aggregate_results, InMemoryLoader, MatcherService};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// 请求体: 调用方交付完整的内存数据集 (负数明细 + 按销购方分组的候选蓝票)
#[derive(Debug, Deserialize)]
pub struct BatchMatchRequest {
    /// 策略名，缺省时用配置的默认策略
    pub strategy: Option<String>,
    pub negatives: Vec<NegativeItem>,
    pub supplies: Vec<SupplyGroup>,
}

/// 一个销购方分区的候选蓝票
#[derive(Debug, Deserialize)]
pub struct SupplyGroup {
    pub fsalertaxno: String,
    pub fbuyertaxno: String,
    pub items: Vec<BlueItem>,
}

/// 响应体
#[derive(Debug, Serialize)]
pub struct BatchMatchResponse {
    pub success: bool,
    pub message: String,
    pub stats: Option<MatchStats>,
    pub results: Option<Vec<MatchResult>>,
    pub aggregated: Option<Vec<MatchResult>>,
    pub failures: Option<Vec<FailureRecord>>,
}

impl BatchMatchResponse {
    fn error(message: String) -> Self {
        Self {
            success: false,
            message,
            stats: None,
            results: None,
            aggregated: None,
            failures: None,
        }
    }
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 批量匹配接口
pub async fn batch_match(
    State(config): State<Arc<AppConfig>>,
    Json(req): Json<BatchMatchRequest>,
) -> Response {
    let strategy_name = req
        .strategy
        .unwrap_or_else(|| config.matching.default_strategy.clone());

    let mut partitions: HashMap<PartitionKey, Vec<BlueItem>> = HashMap::new();
    for group in req.supplies {
        let key = PartitionKey {
            fsalertaxno: group.fsalertaxno,
            fbuyertaxno: group.fbuyertaxno,
        };
        partitions.entry(key).or_default().extend(group.items);
    }

    let loader = Arc::new(InMemoryLoader::new(partitions));
    let workers = config.matching.loader_workers;
    let negatives = req.negatives;

    // 匹配是 CPU 密集型工作 (rayon 池)，移出 tokio 工作线程
    let run = tokio::task::spawn_blocking(move || {
        let service = MatcherService::new(loader, workers);
        service.batch_match(&strategy_name, negatives)
    })
    .await;

    match run {
        Ok(Ok(outcome)) => {
            let aggregated = aggregate_results(&outcome.results);
            let response = BatchMatchResponse {
                success: true,
                message: format!(
                    "匹配完成: {} 条明细, 成功 {}, 失败 {}, 校验剔除 {}",
                    outcome.stats.total_negatives,
                    outcome.stats.matched_count,
                    outcome.stats.failed_count,
                    outcome.stats.dropped_by_validation
                ),
                stats: Some(outcome.stats),
                results: Some(outcome.results),
                aggregated: Some(aggregated),
                failures: Some(outcome.failures),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(Err(e)) => {
            // 配置类错误，调用方可修正后重试
            let response = BatchMatchResponse::error(format!("Error: {}", e));
            (StatusCode::BAD_REQUEST, Json(response)).into_response()
        }
        Err(e) => {
            let response = BatchMatchResponse::error(format!("Error: {}", e));
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
        }
    }
}
