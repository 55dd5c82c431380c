use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use vigia_config::ConfigLoader;
use vigia_monitor::SearchMonitor;
use vigia_server::{api, logging, signal, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about = "Vigia search monitoring server")]
struct Args {
    /// 配置目录（读取其中的 vigia.toml）
    #[arg(long, default_value = "./config")]
    config_dir: PathBuf,

    /// 覆盖配置中的监听地址
    #[arg(long)]
    bind: Option<String>,

    /// 写出默认配置后退出
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let loader = ConfigLoader::new(&args.config_dir);

    if args.init_config {
        let path = loader.write_default()?;
        println!("Default configuration written to {}", path.display());
        return Ok(());
    }

    let config = loader.load_validated()?;
    logging::init_tracing(&config.logging)?;
    info!(config_dir = %args.config_dir.display(), "Starting Vigia server");

    let monitor = Arc::new(SearchMonitor::new(config.monitor.clone())?);
    monitor.start().await;

    let app = api::create_router(Arc::new(AppState::new(monitor.clone())));

    let addr = args.bind.unwrap_or_else(|| config.server.bind_address());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(signal::shutdown_signal())
        .await?;

    monitor.shutdown().await;
    info!("Vigia server stopped");
    Ok(())
}
