use std::env;
use std::sync::Arc;
use tracing::{error, info};

use page_relay::jobs::{Dispatcher, JobRunner};
use page_relay::notify::WebhookNotifier;
use page_relay::scraping::browser_manager::{find_chrome_executable, ChromeLauncher};
use page_relay::scraping::{ExtractOptions, PageExtractor};
use page_relay::{api, AppState, RelayConfig};

fn parse_port_from_args() -> Option<u16> {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == "--port" {
            if let Some(v) = args.next() {
                if let Ok(p) = v.parse::<u16>() {
                    return Some(p);
                }
            }
        } else if let Some(rest) = a.strip_prefix("--port=") {
            if let Ok(p) = rest.parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

fn port_from_env() -> Option<u16> {
    for k in ["PAGE_RELAY_PORT", "PORT"] {
        if let Ok(v) = std::env::var(k) {
            if let Ok(p) = v.trim().parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

fn env_secs(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = match RelayConfig::load() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!("{}", e);
            anyhow::bail!(e);
        }
    };
    info!("Starting page-relay (sink host: {})", config.webhook_url.host_str().unwrap_or("?"));

    match find_chrome_executable(config.chrome_executable.as_deref()) {
        Some(exe) => info!("Browser: {}", exe),
        None => error!("No Chromium-family browser found; every job will fail until one is installed or CHROME_EXECUTABLE is set"),
    }

    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(env_secs("HTTP_TIMEOUT_SECS", 30)))
        .connect_timeout(std::time::Duration::from_secs(env_secs("HTTP_CONNECT_TIMEOUT_SECS", 10)))
        .build()?;

    let notifier = Arc::new(WebhookNotifier::from_config(http_client, &config));
    let extractor = PageExtractor::new(
        Arc::new(ChromeLauncher),
        ExtractOptions::from(config.as_ref()),
    );
    let runner = JobRunner::new(extractor, notifier, config.chunk_limit);
    let dispatcher = Dispatcher::new(runner, config.max_concurrent_jobs, config.max_queued_jobs);
    let state = Arc::new(AppState::new(config.clone(), dispatcher));

    let app = api::router(state.clone());

    let port: u16 = parse_port_from_args().or_else(port_from_env).unwrap_or(3000);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PORT/PAGE_RELAY_PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("page-relay listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("page-relay stopped ({:?})", state.dispatcher.stats());
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
