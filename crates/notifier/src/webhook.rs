use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;

use paynotify_common::config::DeliveryTarget;
use paynotify_common::types::NotificationTask;

use crate::error::DeliveryError;
use crate::signing::sign;

/// Reply body the endpoint must send back for a delivery to count.
const SUCCESS_BODY: &str = "success";

/// Form fields POSTed to the webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    pub amount: String,
    pub sender: String,
    pub timestamp: String,
    pub message: String,
    pub remark: String,
    pub sign: String,
}

impl WebhookPayload {
    pub fn signed(task: &NotificationTask, secret: &str) -> Self {
        Self {
            amount: task.amount.clone(),
            sender: task.sender.clone(),
            timestamp: task.timestamp.clone(),
            message: task.message.clone(),
            remark: task.remark.clone(),
            sign: sign(&task.amount, &task.sender, &task.timestamp, secret),
        }
    }
}

/// HTTP client bound to one webhook endpoint and its shared secret.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
    target: DeliveryTarget,
    timeout: Duration,
}

impl WebhookClient {
    pub fn new(target: DeliveryTarget, timeout: Duration) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Client(e.to_string()))?;

        Ok(Self {
            http,
            target,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.target.url
    }

    /// Sign and deliver a task. Returns the endpoint's reply body on success.
    pub async fn deliver(&self, task: &NotificationTask) -> Result<String, DeliveryError> {
        let payload = WebhookPayload::signed(task, &self.target.secret);
        self.post(&payload).await
    }

    /// POST a payload as `application/x-www-form-urlencoded`.
    pub async fn post(&self, payload: &WebhookPayload) -> Result<String, DeliveryError> {
        let response = self
            .http
            .post(&self.target.url)
            .form(payload)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.classify_transport(e))?;

        tracing::debug!(
            endpoint = %self.target.url,
            status = status.as_u16(),
            "Webhook responded"
        );

        if is_success(status, &body) {
            Ok(body)
        } else {
            Err(DeliveryError::rejected(status.as_u16(), &body))
        }
    }

    fn classify_transport(&self, err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout(self.timeout.as_secs())
        } else {
            DeliveryError::Transport(err.to_string())
        }
    }
}

/// Strict acknowledgement check: status 200 and a body of exactly `success`.
pub fn is_success(status: StatusCode, body: &str) -> bool {
    status == StatusCode::OK && body == SUCCESS_BODY
}
