use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use marrakesh_ingest::api::{ApiState, create_api_router};
use marrakesh_ingest::auth::build_validator;
use marrakesh_ingest::model::config::Config;
use marrakesh_ingest::relay::SinkClient;

/// Marrakesh 事件上报服务
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = Config::default_config_path())]
    config: String,

    /// 覆盖监听地址
    #[arg(long)]
    host: Option<String>,

    /// 覆盖监听端口
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    config.apply_env_overrides(|name| std::env::var(name).ok());
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate()?;
    if let Some(path) = config.config_path() {
        tracing::info!("配置文件: {}", path.display());
    }

    let proxy_url = config.proxy_url.as_deref();
    let sink = SinkClient::new(&config.sink, proxy_url).context("创建 Tinybird 客户端失败")?;
    let validator = build_validator(&config.auth, proxy_url, config.sink.timeout_secs)
        .context("创建 API Key 校验器失败")?;

    let app = create_api_router(ApiState::new(validator, sink));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("监听 {} 失败", addr))?;
    tracing::info!("服务已启动: http://{}", addr);
    tracing::info!("Tinybird: {}", config.sink.base_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP 服务异常退出")?;

    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("监听退出信号失败: {}", e);
        std::future::pending::<()>().await;
    }
}
