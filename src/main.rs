// This is the entry point of the moderation worker.
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the moderation worker and the periodic sweep for pending reviews
// 4. Run until Ctrl-C

use campus_feedback::config::AppConfig;
use campus_feedback::core::feedback::{FeedbackService, ModerationOrchestrator, Notifier};
use campus_feedback::core::moderation::ProviderResolver;
use campus_feedback::infra::feedback::SqliteFeedbackStore;
use campus_feedback::infra::moderation::{mask_key, ProviderFactory};
use campus_feedback::infra::notifications::{LogNotifier, WebhookNotifier};
use campus_feedback::infra::queue::{spawn_pending_sweep, ModerationWorker, TokioModerationQueue};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        provider = %config.provider,
        max_attempts = config.retry.max_attempts,
        sweep_secs = config.sweep_interval.as_secs(),
        database = %config.database_url,
        "Starting moderation worker"
    );
    for (name, key) in [
        ("OPENAI_API_KEY", &config.provider_settings.openai_api_key),
        ("PERSPECTIVE_API_KEY", &config.provider_settings.perspective_api_key),
    ] {
        if let Some(key) = key {
            tracing::info!("{} configured ({})", name, mask_key(key));
        }
    }

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let store = Arc::new(SqliteFeedbackStore::new(&config.database_url).await?);

    // Build the provider now so a bad name or missing key stops the process.
    let factory = Arc::new(ProviderFactory::new(
        config.provider_settings.clone(),
        config.provider.config_name(),
    ));
    let provider = factory.resolve()?;
    tracing::info!("Using moderation provider: {}", provider.name());

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            tracing::info!("Sending notifications to {}", url);
            Arc::new(WebhookNotifier::new(url, &config.app_base_url)?)
        }
        None => {
            tracing::warn!("NOTIFY_WEBHOOK_URL not set, notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    let orchestrator = Arc::new(ModerationOrchestrator::new(
        Arc::clone(&store),
        factory,
        config.retry.clone(),
        notifier,
        store.clone(),
    ));

    let (queue, receiver) = TokioModerationQueue::channel();
    let worker = ModerationWorker::new(orchestrator).spawn(receiver);
    let service = Arc::new(FeedbackService::new(Arc::clone(&store), Arc::new(queue)));

    // Items left in pending_review by a previous run get another go.
    let requeued = service.requeue_pending_reviews().await?;
    tracing::info!("Re-queued {} feedback item(s) awaiting moderation", requeued);

    // New rows from other writers are picked up on every sweep.
    let sweeper = spawn_pending_sweep(Arc::clone(&service), config.sweep_interval);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested, finishing in-flight moderation");

    // Stop sweeping, then drop the last service handle to close the queue;
    // the worker drains what it has.
    sweeper.abort();
    let _ = sweeper.await;
    drop(service);
    worker.await?;

    Ok(())
}
