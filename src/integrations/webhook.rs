use async_trait::async_trait;
use serde_json::json;

use crate::{
    config::WebhookConfig,
    error::{AppError, Result},
    integrations::{Integration, IntegrationEvent},
};

/// Posts lifecycle events as JSON to a configured endpoint. The receiving
/// side fans them out to push/email delivery.
pub struct WebhookIntegration {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookIntegration {
    pub fn new(config: Option<WebhookConfig>) -> Option<Self> {
        config.and_then(|cfg| {
            if cfg.enabled {
                Some(Self {
                    config: cfg,
                    client: reqwest::Client::new(),
                })
            } else {
                None
            }
        })
    }

    fn payload(event: &IntegrationEvent) -> serde_json::Value {
        match event {
            IntegrationEvent::ClubApproved(club) => json!({
                "event": "club.approved",
                "club_id": club.id,
                "status": club.status,
                "next_payment_due": club.next_payment_due,
            }),
            IntegrationEvent::ClubWarning(club) => json!({
                "event": "club.payment_warning",
                "club_id": club.id,
                "next_payment_due": club.next_payment_due,
                "grace_period_days": club.grace_period_days,
            }),
            IntegrationEvent::ClubSuspended(club) => json!({
                "event": "club.suspended",
                "club_id": club.id,
                "next_payment_due": club.next_payment_due,
            }),
            IntegrationEvent::PaymentConfirmed { club, payment } => json!({
                "event": "payment.confirmed",
                "club_id": club.id,
                "payment_id": payment.id,
                "amount_cents": payment.amount_cents,
                "status": club.status,
            }),
        }
    }

    async fn post(&self, payload: serde_json::Value) -> Result<()> {
        let mut request = self.client.post(&self.config.url).json(&payload);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Integration(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Integration(format!(
                "Webhook endpoint returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Integration for WebhookIntegration {
    fn name(&self) -> &str {
        "Webhook"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn health_check(&self) -> Result<()> {
        if self.config.url.is_empty() {
            return Err(AppError::Integration(
                "Webhook URL not configured".to_string(),
            ));
        }
        Ok(())
    }

    async fn handle_event(&self, event: &IntegrationEvent) -> Result<()> {
        self.post(Self::payload(event)).await
    }
}
