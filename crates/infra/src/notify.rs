use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers password-reset links. Email transport lives outside this crate.
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_reset(&self, email: &str, token: &str, display_name: &str) -> Result<(), NotifyError>;
}

/// Logs instead of sending. The token itself is only emitted at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl ResetNotifier for LogNotifier {
    async fn send_reset(&self, email: &str, token: &str, display_name: &str) -> Result<(), NotifyError> {
        tracing::info!(email, display_name, "password reset link issued (no mail transport configured)");
        tracing::debug!(email, token, "password reset token");
        Ok(())
    }
}
