use std::sync::Arc;

use migration::MigratorTrait;
use price_tracker::notifier::TelegramSink;
use price_tracker::scheduler::TrackerScheduler;
use price_tracker::services::fetch_service::{ CardFetcher, NoXpow };
use price_tracker::services::ReconcileService;
use price_tracker::{ AppError, Config, Result };
use teloxide::Bot;
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt };

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber
        ::registry()
        .with(
            tracing_subscriber::EnvFilter
                ::try_from_default_env()
                .unwrap_or_else(|_| "price_tracker=debug".into())
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| AppError::Config(e.to_string()))?;

    tracing::info!(
        "Starting price-tracker: interval={:?}, concurrency={}",
        config.poll_interval,
        config.fetch_concurrency
    );

    // Initialize database connection
    let db = sea_orm::Database::connect(&config.database_url).await?;

    tracing::info!("Database connected successfully");

    // Run migrations
    migration::Migrator::up(&db, None).await?;

    tracing::info!("Migrations completed successfully");

    // Wire the pipeline: fetcher -> reconciler -> notification sink
    let bot = Bot::new(config.telegram_bot_token.clone());
    let sink = Arc::new(TelegramSink::new(bot));

    let fetcher = Arc::new(CardFetcher::new(Box::new(NoXpow))?);
    let reconciler = Arc::new(ReconcileService::new(db.clone(), sink));

    let scheduler = TrackerScheduler::new(db, fetcher, reconciler, &config);

    let tracker = tokio::spawn(scheduler.start());

    tokio::signal
        ::ctrl_c().await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    tracing::info!("Shutdown requested, stopping tracker");
    tracker.abort();

    Ok(())
}
