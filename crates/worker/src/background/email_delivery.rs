//! SMTP delivery of the `email_queue`.

use std::time::Duration;

use stageflow_db::repositories::EmailQueueRepo;
use stageflow_db::DbPool;
use stageflow_events::EmailDelivery;
use tokio_util::sync::CancellationToken;

/// Pending rows fetched per poll.
const BATCH_SIZE: i64 = 50;

pub async fn run(
    pool: DbPool,
    delivery: EmailDelivery,
    period: Duration,
    max_attempts: i32,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = period.as_secs(),
        max_attempts,
        "Email delivery started"
    );
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Email delivery stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = deliver_pending(&pool, &delivery, max_attempts).await {
                    tracing::error!(error = %e, "Email delivery: queue poll failed");
                }
            }
        }
    }
}

async fn deliver_pending(
    pool: &DbPool,
    delivery: &EmailDelivery,
    max_attempts: i32,
) -> Result<(), sqlx::Error> {
    for email in EmailQueueRepo::list_pending(pool, BATCH_SIZE).await? {
        match delivery.deliver(&email).await {
            Ok(()) => {
                EmailQueueRepo::mark_sent(pool, email.id).await?;
                tracing::info!(email_id = email.id, to = %email.to_email, "Email sent");
            }
            Err(e) => {
                let error = e.to_string();
                EmailQueueRepo::mark_attempt_failed(pool, email.id, &error, max_attempts).await?;
                tracing::warn!(
                    email_id = email.id,
                    attempt = email.attempts + 1,
                    max_attempts,
                    %error,
                    "Email delivery failed"
                );
            }
        }
    }
    Ok(())
}
