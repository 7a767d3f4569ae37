use backup_relay::config::RelayConfig;
use backup_relay::services::destination::WebdavStore;
use backup_relay::services::notifier::{LogNotifier, Notifier};
use backup_relay::services::pipeline::{Pipeline, RunStatus};
use backup_relay::services::sftp::SftpSource;
use backup_relay::{AppState, create_app};
use clap::Parser;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run mode: "serve" exposes the trigger endpoints, "once" executes a
    /// single run and exits
    #[arg(short, long, default_value = "serve")]
    mode: String,

    /// Port for the trigger server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backup_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting backup relay [Mode: {}]...", args.mode);

    // Configuration is read from the environment exactly once, here.
    let config = RelayConfig::from_env();
    info!(
        "🔧 Source: sftp://{}:{}{} | Destination: {} | Suffix: {} | Keep: {}",
        config.sftp_host,
        config.sftp_port,
        config.sftp_dir,
        config.webdav_url,
        config.artifact_suffix,
        config.keep_count
    );

    let source = Arc::new(SftpSource::new(&config));
    let store = Arc::new(WebdavStore::new(&config)?);
    let notifier = Arc::new(LogNotifier);

    if args.mode == "once" {
        let pipeline = Pipeline::new(config, source, store);
        let outcome = pipeline.run().await;
        notifier.notify(&outcome).await;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        if outcome.status == RunStatus::Failure {
            std::process::exit(1);
        }
        return Ok(());
    }

    let state = AppState {
        config,
        source,
        store,
        notifier,
        run_lock: Arc::new(tokio::sync::Mutex::new(())),
    };

    let app = create_app(state).layer(TraceLayer::new_for_http());
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Trigger server listening on: http://0.0.0.0:{}", args.port);
    info!("📖 Swagger UI: http://localhost:{}/swagger-ui", args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Backup relay exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
