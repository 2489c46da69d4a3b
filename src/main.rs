use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tax_redflush_engine::{api, AppConfig};
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = Arc::new(AppConfig::from_env());
    info!("Starting server with config: {:?}", config);

    // 构建路由
    let app = Router::new()
        .route("/health", get(api::health_check))
        .route("/api/match/batch", post(api::batch_match))
        .with_state(config.clone())
        .layer(ServiceBuilder::new());

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/match/batch - 红蓝匹配 (全内存数据集)");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
