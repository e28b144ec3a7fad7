//! Paced bulk dispatch.
//!
//! Sends are strictly sequential. The external session accepts one
//! logical send at a time, and hammering it in parallel is a good way to
//! get the account suspended, so the dispatcher walks the recipient list
//! in submission order with a pause between items.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::service::SendOutcome;

/// Per-recipient result, immutable once recorded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub recipient: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Submission index; always matches the recipient's position.
    pub index: usize,
}

/// Aggregate outcome of one bulk dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Results in submission order.
    pub results: Vec<SendResult>,
}

impl BulkOutcome {
    fn from_results(results: Vec<SendResult>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }
}

/// Runs the sequential dispatch loop.
///
/// `ready` is probed before every item; once it reports false the
/// remaining recipients are recorded as failed without being attempted
/// (a disconnect mid-batch must not produce a tail of doomed sends).
/// Individual failures never abort the batch.
pub(crate) async fn dispatch<P, S, Fut>(
    recipients: &[String],
    delay: Duration,
    ready: P,
    mut send: S,
) -> BulkOutcome
where
    P: Fn() -> bool,
    S: FnMut(usize, String) -> Fut,
    Fut: Future<Output = Result<SendOutcome>>,
{
    info!(
        target = "watify.bulk",
        total = recipients.len(),
        delay_ms = delay.as_millis() as u64,
        "starting bulk dispatch"
    );

    let mut results = Vec::with_capacity(recipients.len());
    let mut halted = false;

    for (index, recipient) in recipients.iter().enumerate() {
        if !halted && !ready() {
            halted = true;
            debug!(
                target = "watify.bulk",
                index, "client lost readiness mid-batch; failing remaining recipients"
            );
        }

        if halted {
            results.push(SendResult {
                recipient: recipient.clone(),
                success: false,
                message_id: None,
                error: Some("client is not ready".to_string()),
                index,
            });
            continue;
        }

        match send(index, recipient.clone()).await {
            Ok(outcome) => {
                debug!(target = "watify.bulk", index, recipient = %recipient, "sent");
                results.push(SendResult {
                    recipient: recipient.clone(),
                    success: true,
                    message_id: Some(outcome.message_id),
                    error: None,
                    index,
                });
            }
            Err(error) => {
                debug!(target = "watify.bulk", index, recipient = %recipient, %error, "failed");
                results.push(SendResult {
                    recipient: recipient.clone(),
                    success: false,
                    message_id: None,
                    error: Some(error.to_string()),
                    index,
                });
            }
        }

        if index + 1 < recipients.len() && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    let outcome = BulkOutcome::from_results(results);
    info!(
        target = "watify.bulk",
        total = outcome.total,
        successful = outcome.successful,
        failed = outcome.failed,
        "bulk dispatch finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn outcome_for(recipient: &str, index: usize) -> SendOutcome {
        SendOutcome {
            message_id: format!("msg-{index}"),
            timestamp: 1_718_000_000,
            to: recipient.to_string(),
            chat_id: format!("{recipient}@c.us"),
        }
    }

    fn recipients(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("92312533107{i}")).collect()
    }

    #[tokio::test]
    async fn single_recipient_yields_one_result_at_index_zero() {
        let outcome = dispatch(
            &recipients(1),
            Duration::ZERO,
            || true,
            |index, recipient| async move { Ok(outcome_for(&recipient, index)) },
        )
        .await;

        assert_eq!(outcome.total, 1);
        assert_eq!(outcome.successful, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].index, 0);
        assert!(outcome.results[0].success);
    }

    #[tokio::test]
    async fn indices_are_stable_under_partial_failure() {
        let outcome = dispatch(
            &recipients(3),
            Duration::ZERO,
            || true,
            |index, recipient| async move {
                if index == 1 {
                    Err(SessionError::TransientSend("driver hiccup".into()))
                } else {
                    Ok(outcome_for(&recipient, index))
                }
            },
        )
        .await;

        assert_eq!(outcome.results.len(), 3);
        for (i, result) in outcome.results.iter().enumerate() {
            assert_eq!(result.index, i);
        }
        assert_eq!(outcome.successful, 2);
        assert_eq!(outcome.failed, 1);
        assert!(!outcome.results[1].success);
        assert!(outcome.results[1].error.as_deref().unwrap().contains("driver hiccup"));
    }

    #[tokio::test]
    async fn counts_always_add_up() {
        let outcome = dispatch(
            &recipients(5),
            Duration::ZERO,
            || true,
            |index, recipient| async move {
                if index % 2 == 0 {
                    Ok(outcome_for(&recipient, index))
                } else {
                    Err(SessionError::TransientSend("odd one out".into()))
                }
            },
        )
        .await;

        assert_eq!(outcome.successful + outcome.failed, outcome.total);
        assert_eq!(outcome.total, 5);
    }

    #[tokio::test]
    async fn readiness_loss_fails_remaining_without_attempting() {
        let ready = AtomicBool::new(true);
        let attempts = AtomicU32::new(0);

        let outcome = dispatch(
            &recipients(4),
            Duration::ZERO,
            || ready.load(Ordering::SeqCst),
            |index, recipient| {
                attempts.fetch_add(1, Ordering::SeqCst);
                // Simulate a disconnect landing after the second send.
                if index == 1 {
                    ready.store(false, Ordering::SeqCst);
                }
                async move { Ok(outcome_for(&recipient, index)) }
            },
        )
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.successful, 2);
        assert_eq!(outcome.failed, 2);
        assert_eq!(
            outcome.results[2].error.as_deref(),
            Some("client is not ready")
        );
        assert_eq!(
            outcome.results[3].error.as_deref(),
            Some("client is not ready")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_skipped_after_the_last_item() {
        let started = tokio::time::Instant::now();

        let outcome = dispatch(
            &recipients(3),
            Duration::from_secs(2),
            || true,
            |index, recipient| async move { Ok(outcome_for(&recipient, index)) },
        )
        .await;

        // Two gaps between three items; no trailing pause.
        assert_eq!(started.elapsed(), Duration::from_secs(4));
        assert_eq!(outcome.total, 3);
    }
}
