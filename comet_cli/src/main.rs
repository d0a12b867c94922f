//! The comet relay server binary.

use std::net::SocketAddr;

use clap::Parser;
use comet_core::{AuthMode, EngineConfig};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "comet-server", version, about = "Long-polling HTTP pub/sub relay")]
struct Arguments {
    /// Socket address to listen on
    #[arg(short, long, default_value = "0.0.0.0:8100")]
    listen: String,

    /// Number of preallocated channel slots
    #[arg(long, default_value_t = 10_000)]
    max_channels: usize,

    /// Parked subscribers allowed per channel
    #[arg(long, default_value_t = 64)]
    max_subscribers_per_channel: usize,

    /// Recent messages retained per channel for resume
    #[arg(long, default_value_t = 8)]
    max_messages: usize,

    /// Seconds an unsubscribed channel survives without a re-sign
    #[arg(long, default_value_t = 120)]
    channel_timeout: u32,

    /// Seconds a parked poll is held before a keep-alive noop
    #[arg(long, default_value_t = 60)]
    polling_timeout: u32,

    /// Sweeper period in seconds
    #[arg(long, default_value_t = 4)]
    check_interval: u32,

    /// Require the channel token on /sub
    #[arg(long, default_value_t = false)]
    token_auth: bool,
}

impl Arguments {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_channels: self.max_channels,
            max_subscribers_per_channel: self.max_subscribers_per_channel,
            max_messages: self.max_messages,
            channel_timeout: self.channel_timeout,
            polling_timeout: self.polling_timeout,
            channel_check_interval: self.check_interval,
            auth: if self.token_auth { AuthMode::Token } else { AuthMode::None },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Arguments::parse();
    let addr: SocketAddr = args.listen.parse()?;
    let config = args.engine_config();
    tracing::info!(
        listen = %addr,
        max_channels = config.max_channels,
        auth = ?config.auth,
        "starting comet relay"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(watch_signals(cancel.clone()));

    comet_http::serve(addr, config, cancel).await?;
    Ok(())
}

/// Cancel `cancel` on the first interrupt or terminate signal so the server
/// stops accepting and drains its parked polls. A second interrupt while
/// the drain is still running exits outright.
async fn watch_signals(cancel: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received, draining parked polls"),
        () = terminated() => tracing::info!("terminate received, draining parked polls"),
    }
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("second interrupt, giving up on the drain");
        std::process::exit(130);
    }
}

/// Wait for SIGTERM; pends forever where the signal does not exist.
async fn terminated() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut term) = signal(SignalKind::terminate()) {
            term.recv().await;
            return;
        }
    }
    std::future::pending::<()>().await
}
