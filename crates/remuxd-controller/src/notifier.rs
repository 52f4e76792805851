//! Best-effort outbound notification sink.
//!
//! Telegram-shaped: a bot token and chat id from the environment. Sends are
//! spawned fire-and-forget; a failure here is logged and never touches task
//! state.

use std::sync::Arc;

use tracing::{debug, info, warn};

struct NotifierInner {
    http: reqwest::Client,
    api_url: String,
    chat_id: String,
}

/// Human-readable status messages, delivered on a best-effort basis.
#[derive(Clone, Default)]
pub struct Notifier {
    inner: Option<Arc<NotifierInner>>,
}

impl Notifier {
    /// Build from `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID`; disabled when
    /// either is missing.
    pub fn from_env() -> Self {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").ok();
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok();

        match (token, chat_id) {
            (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
                info!("Notifications enabled");
                Self {
                    inner: Some(Arc::new(NotifierInner {
                        http: reqwest::Client::new(),
                        api_url: format!("https://api.telegram.org/bot{token}/sendMessage"),
                        chat_id,
                    })),
                }
            }
            _ => {
                debug!("Notifications disabled (no token/chat id configured)");
                Self { inner: None }
            }
        }
    }

    /// A disabled sink, for tests and minimal setups.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Fire-and-forget send. Returns immediately; delivery failures are
    /// logged only.
    pub fn notify(&self, text: impl Into<String>) {
        let Some(inner) = self.inner.clone() else {
            return;
        };
        let text = text.into();

        tokio::spawn(async move {
            let body = serde_json::json!({
                "chat_id": inner.chat_id,
                "text": text,
            });
            match inner.http.post(&inner.api_url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!("Notification rejected: {}", response.status()),
                Err(e) => warn!("Notification not delivered: {e}"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_notifier_is_a_no_op() {
        let notifier = Notifier::disabled();
        assert!(!notifier.is_enabled());
        // must not panic or spawn anything
        notifier.notify("nobody is listening");
    }
}
