use std::sync::Arc;

use anyhow::Context;
use custody_bot::{
    api::{ self, AppState },
    bot::TelegramNotifier,
    crypto::LegacyCipher,
    db::{ OrderRepository, SecurityRepository, WalletRepository },
    dex::{ JupiterSwapExecutor, SwapRouter, UniswapV2SwapExecutor },
    scheduler::{ SchedulerSettings, TriggerScheduler },
    services::{ CustodyService, DexScreenerClient, OrderService, SessionStore },
    Chain,
    Config,
};
use migration::MigratorTrait;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt };

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber
        ::registry()
        .with(
            tracing_subscriber::EnvFilter
                ::try_from_default_env()
                .unwrap_or_else(|_| "custody_bot=debug,tower_http=debug".into())
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let db = sea_orm::Database
        ::connect(&config.database_url).await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected successfully");

    migration::Migrator::up(&db, None).await.context("Failed to run migrations")?;
    tracing::info!("Migrations completed successfully");

    let legacy = Arc::new(LegacyCipher::new(&config.legacy_encryption_key)?);
    let sessions = Arc::new(SessionStore::new(config.session_timeout_chrono()?));

    let orders_repo = Arc::new(OrderRepository::new(db.clone()));
    let custody = Arc::new(
        CustodyService::new(
            Arc::new(WalletRepository::new(db.clone())),
            Arc::new(SecurityRepository::new(db)),
            sessions.clone(),
            legacy
        )
    );

    let market = Arc::new(
        DexScreenerClient::new(&config.dexscreener_api_url, config.external_call_timeout)?
    );

    let mut swaps = SwapRouter::new();
    swaps.register(
        Chain::Solana,
        Arc::new(
            JupiterSwapExecutor::new(
                &config.jupiter_api_url,
                &config.solana_rpc_url,
                config.external_call_timeout,
                config.swap_confirm_timeout
            )?
        )
    );
    for (&chain, rpc_url) in &config.evm_rpc_urls {
        swaps.register(chain, Arc::new(UniswapV2SwapExecutor::new(chain, rpc_url, config.swap_confirm_timeout)?));
    }
    tracing::info!(chains = ?swaps.supported_chains(), "Swap executors registered");

    let orders = Arc::new(OrderService::new(orders_repo.clone(), market.clone(), config.external_call_timeout));

    let scheduler = TriggerScheduler::new(
        orders_repo,
        custody.clone(),
        market,
        Arc::new(swaps),
        Arc::new(TelegramNotifier::new(config.telegram_bot_token.clone())),
        SchedulerSettings {
            poll_interval: config.trigger_poll_interval,
            poll_jitter: config.trigger_poll_jitter,
            price_fetch_delay: config.price_fetch_delay,
            call_timeout: config.external_call_timeout,
            swap_timeout: config.swap_timeout,
        }
    );

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(sessions.run_sweeper(config.session_sweep_interval, shutdown.clone()));
    let poller = tokio::spawn(scheduler.run(shutdown.clone()));

    let app = api::router(AppState::new(custody, orders));

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener
        ::bind(&addr).await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested");
            signal.cancel();
        }).await
        .context("Server error")?;

    shutdown.cancel();
    let _ = tokio::join!(sweeper, poller);
    tracing::info!("Shutdown complete");

    Ok(())
}
