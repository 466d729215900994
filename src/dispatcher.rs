// Webhook dispatcher - delivers notification payloads with bounded retries
//
// Network errors and HTTP 5xx responses are retried with exponential backoff;
// HTTP 4xx means the endpoint rejects our request shape or credentials, which
// retrying cannot fix, so it is surfaced immediately.

use crate::config::WebhookConfig;
use crate::error::DispatchError;
use crate::evaluator::{Evaluation, UrgencyState};
use crate::inventory::CertificateDescriptor;
use crate::reader::CertificateSnapshot;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outbound notification message (JSON wire format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub certificate_id: String,
    pub label: String,
    pub state: UrgencyState,
    pub days_remaining: Option<i64>,
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl NotificationPayload {
    /// Build the payload for one evaluated certificate
    pub fn new(
        descriptor: &CertificateDescriptor,
        evaluation: &Evaluation,
        snapshot: Option<&CertificateSnapshot>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            certificate_id: descriptor.id.clone(),
            label: descriptor.display_label().to_string(),
            state: evaluation.state,
            days_remaining: evaluation.days_remaining,
            issuer: snapshot.map(|s| s.issuer.clone()),
            subject: snapshot.map(|s| s.subject.clone()),
            checked_at,
        }
    }
}

/// Final outcome of a dispatch, including how many attempts it took
#[derive(Debug)]
pub enum DispatchResult {
    Success { attempts: u32 },
    Failure { attempts: u32, error: DispatchError },
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchResult::Success { .. })
    }
}

/// Webhook notification dispatcher
pub struct WebhookDispatcher {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    /// Create a dispatcher with the per-attempt timeout baked into the client
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }

    /// Deliver a payload, retrying transient failures with exponential backoff
    pub async fn dispatch(&self, payload: &NotificationPayload) -> DispatchResult {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.attempt(payload).await {
                Ok(()) => return DispatchResult::Success { attempts },
                Err(error) if !error.is_retryable() || attempts >= max_attempts => {
                    return DispatchResult::Failure { attempts, error };
                }
                Err(error) => {
                    let delay = self.backoff_delay(attempts);
                    tracing::warn!(
                        certificate = %payload.certificate_id,
                        attempt = attempts,
                        "webhook delivery failed, retrying in {:?}: {}",
                        delay,
                        error
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Send a test payload so operators can verify the endpoint
    pub async fn send_test(&self) -> DispatchResult {
        let payload = NotificationPayload {
            certificate_id: "certwatch-test".to_string(),
            label: "certwatch test notification".to_string(),
            state: UrgencyState::Healthy,
            days_remaining: None,
            issuer: None,
            subject: None,
            checked_at: Utc::now(),
        };

        self.dispatch(&payload).await
    }

    async fn attempt(&self, payload: &NotificationPayload) -> Result<(), DispatchError> {
        let mut request = self.client.post(&self.config.url).json(payload);

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::ClientConfigError {
                status: status.as_u16(),
                details: truncate(&body, 200),
            });
        }

        Err(DispatchError::ServerError {
            status: status.as_u16(),
        })
    }

    /// Delay before the next attempt: base * factor^(attempts - 1)
    fn backoff_delay(&self, attempts: u32) -> Duration {
        let factor = self
            .config
            .backoff_factor
            .max(1)
            .saturating_pow(attempts.saturating_sub(1));
        Duration::from_secs(
            self.config
                .backoff_base_seconds
                .saturating_mul(u64::from(factor)),
        )
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        s.to_string()
    } else {
        let mut end = limit;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::parse_target;

    fn test_dispatcher(config: WebhookConfig) -> WebhookDispatcher {
        WebhookDispatcher::new(config).unwrap()
    }

    #[test]
    fn test_backoff_schedule() {
        let dispatcher = test_dispatcher(WebhookConfig::new(
            "https://hooks.example.com/certs".to_string(),
        ));

        // Defaults: base 1s, factor 4 -> 1s, 4s, 16s
        assert_eq!(dispatcher.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(dispatcher.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(dispatcher.backoff_delay(3), Duration::from_secs(16));
    }

    #[test]
    fn test_payload_wire_format() {
        let descriptor = CertificateDescriptor::new(parse_target("example.com:443").unwrap())
            .with_label("edge".to_string());
        let evaluation = Evaluation {
            state: UrgencyState::Warning,
            days_remaining: Some(5),
        };
        let snapshot = CertificateSnapshot {
            subject: "CN=example.com".to_string(),
            issuer: "CN=Example CA".to_string(),
            not_after: Utc::now(),
            serial: None,
        };
        let checked_at = Utc::now();

        let payload = NotificationPayload::new(&descriptor, &evaluation, Some(&snapshot), checked_at);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["certificate_id"], "example.com:443");
        assert_eq!(json["label"], "edge");
        assert_eq!(json["state"], "warning");
        assert_eq!(json["days_remaining"], 5);
        assert_eq!(json["issuer"], "CN=Example CA");
        assert_eq!(json["subject"], "CN=example.com");
        // RFC 3339 UTC timestamp
        assert!(json["checked_at"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_payload_unreadable_has_null_fields() {
        let descriptor = CertificateDescriptor::new(parse_target("/tmp/gone.pem").unwrap());
        let evaluation = Evaluation {
            state: UrgencyState::Unreadable,
            days_remaining: None,
        };

        let payload = NotificationPayload::new(&descriptor, &evaluation, None, Utc::now());
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["state"], "unreadable");
        assert!(json["days_remaining"].is_null());
        assert!(json["issuer"].is_null());
        assert!(json["subject"].is_null());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 200), "short");
        let truncated = truncate(&"é".repeat(300), 201);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 204);
    }
}
