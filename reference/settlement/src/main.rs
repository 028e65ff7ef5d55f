//! SwapSettle Settlement Binary
//!
//! Serves the quote, trade, withdrawal and webhook API.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swapsettle_common::{Clock, SystemClock};
use swapsettle_fx::QuoteService;
use swapsettle_ledger::{AccountDirectory, InMemoryWalletLedger};
use swapsettle_provider::HttpLiquidityProvider;
use swapsettle_settlement::{
    router, AppState, AuditLog, InMemoryTradeStore, Metrics, SettlementConfig, SettlementEngine,
    TradeEvents, WebhookReconciler,
};

const QUOTE_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting SwapSettle");

    let config = SettlementConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let provider = Arc::new(HttpLiquidityProvider::new(config.provider.clone())?);
    let quotes = Arc::new(QuoteService::new(
        provider.clone(),
        config.quote.clone(),
        config.fees,
        clock.clone(),
    ));
    let ledger = Arc::new(InMemoryWalletLedger::with_clock(clock.clone()));
    let store = Arc::new(InMemoryTradeStore::new());

    let accounts = Arc::new(AccountDirectory::new());
    for (user_id, account_id) in &config.accounts {
        accounts.register(user_id.clone(), account_id.clone());
    }
    info!(accounts = config.accounts.len(), "Provider accounts loaded");

    let events = TradeEvents::new(config.event_capacity);
    let metrics = Arc::new(Metrics::new());
    let audit = Arc::new(AuditLog::new(config.audit_capacity));

    let engine = Arc::new(
        SettlementEngine::new(
            quotes.clone(),
            provider,
            ledger.clone(),
            store.clone(),
            accounts.clone(),
            config.withdrawal_limits.clone(),
            clock.clone(),
        )
        .with_events(events.clone())
        .with_metrics(metrics.clone()),
    );

    let reconciler = Arc::new(
        WebhookReconciler::new(config.webhook.verifier()?, store, ledger, accounts, clock)
            .with_audit(audit)
            .with_events(events)
            .with_metrics(metrics.clone()),
    );

    // Expired quotes are only evicted lazily otherwise.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(QUOTE_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = quotes.cleanup();
            if removed > 0 {
                info!(removed = removed, "Expired quotes removed");
            }
        }
    });

    let app = router(AppState {
        engine,
        reconciler,
        metrics,
        metrics_enabled: config.metrics_enabled,
    });

    let addr = format!("{}:{}", config.listen_addr, config.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        listen_addr = %config.listen_addr,
        listen_port = %config.listen_port,
        "SwapSettle running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("SwapSettle shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}
