//! Mail API transport (Mailgun-compatible `messages` endpoint)

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::ReceiptsConfig;
use crate::domain::ports::mailer::{OutgoingReceipt, ReceiptMailer};
use crate::domain::{ChargeError, DomainResult};

pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}

impl HttpMailer {
    pub fn new(cfg: &ReceiptsConfig) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ChargeError::gateway("mail_client", e.to_string()))?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
        })
    }
}

#[async_trait]
impl ReceiptMailer for HttpMailer {
    #[tracing::instrument(skip_all, fields(transaction_id = %receipt.transaction_id))]
    async fn send(&self, receipt: &OutgoingReceipt) -> DomainResult<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth("api", Some(&self.api_key))
            .form(&[
                ("from", receipt.from.as_str()),
                ("to", receipt.to.as_str()),
                ("subject", receipt.subject.as_str()),
                ("text", receipt.text_body.as_str()),
                ("html", receipt.html_body.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ChargeError::gateway_transient("send_receipt", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Mail API rejected receipt");
            return Err(ChargeError::Gateway {
                operation: "send_receipt",
                message: format!("Mail API error ({}): {}", status, body),
                transient: status.is_server_error(),
            });
        }

        let parsed = response.json::<SendResponse>().await.ok();
        let message_id = parsed
            .and_then(|r| r.id)
            .unwrap_or_else(|| format!("queued-{}", receipt.transaction_id));
        info!(to = %receipt.to, message_id = %message_id, "Receipt queued");
        Ok(message_id)
    }
}
