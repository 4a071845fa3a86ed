use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use sqlx::Row;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::infra::db::Db;
use crate::infra::mail::Mailer;
use crate::infra::queue::{Job, SqsQueue};

const POLL_WAIT_SECONDS: i32 = 10;
const IDLE_SLEEP_MS: u64 = 200;
const ERROR_BACKOFF_MS: u64 = 1000;

/// Worker loop: long-poll the queue, execute, delete. Execution failures
/// are logged and the message deleted anyway; jobs are best-effort and the
/// originating request has long since completed.
pub async fn run(db: Db, queue: SqsQueue, mailer: Arc<dyn Mailer>) -> Result<()> {
    info!("job worker started");
    loop {
        match queue.receive(POLL_WAIT_SECONDS).await {
            Ok(Some(message)) => {
                if let Err(err) = execute(&db, mailer.as_ref(), &message.job).await {
                    error!(error = ?err, job = ?message.job, "job failed");
                }
                if let Err(err) = queue.delete_message(&message.receipt_handle).await {
                    warn!(error = ?err, "failed to delete queue message");
                }
            }
            Ok(None) => {
                tokio::time::sleep(Duration::from_millis(IDLE_SLEEP_MS)).await;
            }
            Err(err) => {
                warn!(error = ?err, "queue receive failed, backing off");
                tokio::time::sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
            }
        }
    }
}

pub async fn execute(db: &Db, mailer: &dyn Mailer, job: &Job) -> Result<()> {
    match job {
        Job::SendWelcomeEmail { username, email } => {
            send_welcome_email(mailer, username, email).await
        }
        Job::NotifyFollowers {
            post_title,
            author_id,
        } => notify_followers(db, mailer, post_title, *author_id).await,
    }
}

async fn send_welcome_email(mailer: &dyn Mailer, username: &str, email: &str) -> Result<()> {
    if email.is_empty() {
        info!(username, "no email on account, skipping welcome mail");
        return Ok(());
    }

    let subject = "Welcome to Quill";
    let body = format!(
        "Hi {},\n\nYour account is ready. Happy writing!\n",
        username
    );
    mailer.send(email, subject, &body).await?;

    info!(username, "welcome email sent");
    Ok(())
}

/// Fan a new-post notice out to everyone following the author. Each
/// recipient is independent: one bad address must not starve the rest.
async fn notify_followers(
    db: &Db,
    mailer: &dyn Mailer,
    post_title: &str,
    author_id: Uuid,
) -> Result<()> {
    let author: Option<String> = sqlx::query_scalar("SELECT username FROM users WHERE id = $1")
        .bind(author_id)
        .fetch_optional(db.pool())
        .await?;
    let author = author.ok_or_else(|| anyhow!("author {} not found", author_id))?;

    let rows = sqlx::query(
        "SELECT u.email \
         FROM follows f \
         JOIN users u ON u.id = f.follower_id \
         WHERE f.followee_id = $1 AND u.email <> ''",
    )
    .bind(author_id)
    .fetch_all(db.pool())
    .await?;

    let subject = format!("New post from {}", author);
    let body = format!(
        "{} just published a new post titled '{}'.\n\nCheck it out!\n",
        author, post_title
    );

    let mut sent = 0usize;
    for row in &rows {
        let email: String = row.get("email");
        match mailer.send(&email, &subject, &body).await {
            Ok(()) => sent += 1,
            Err(err) => warn!(error = ?err, "failed to notify follower"),
        }
    }

    info!(author = %author, sent, total = rows.len(), "follower notification finished");
    Ok(())
}
