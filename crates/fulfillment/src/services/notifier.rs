//! Factory notification.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{DocumentRef, Money};
use reqwest::Client;
use serde::Serialize;

use super::escape_html;
use crate::error::DeliveryError;

/// Header carrying the per-job idempotency key to the mail relay.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Message telling a factory about a new order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub document_ref: DocumentRef,
    pub idempotency_key: String,
    pub order_number: String,
    pub organization_name: String,
    pub factory_name: String,
    pub currency: String,
    pub total_amount: Money,
    pub item_count: usize,
    pub notes: Option<String>,
}

impl OrderMessage {
    /// HTML body of the message.
    pub fn html_body(&self) -> String {
        let notes = self
            .notes
            .as_deref()
            .map(|n| format!("<p><strong>Notes:</strong> {}</p>", escape_html(n)))
            .unwrap_or_default();
        format!(
            "<h2>New Order Received</h2>\
             <p>Dear {factory},</p>\
             <p>You have received a new order from <strong>{org}</strong>.</p>\
             <h3>Order Details:</h3>\
             <ul>\
             <li><strong>Order Number:</strong> {number}</li>\
             <li><strong>Total Amount:</strong> {currency} {total}</li>\
             <li><strong>Items:</strong> {items}</li>\
             </ul>\
             {notes}\
             <p>Please find the detailed order attached.</p>\
             <p>Best regards,<br>Vendora Platform</p>",
            factory = escape_html(&self.factory_name),
            org = escape_html(&self.organization_name),
            number = escape_html(&self.order_number),
            currency = escape_html(&self.currency),
            total = self.total_amount,
            items = self.item_count,
        )
    }
}

/// Delivers order messages. An `Err` means the message was not accepted.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &OrderMessage) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn send(&self, message: &OrderMessage) -> Result<(), DeliveryError> {
        (**self).send(message).await
    }
}

#[derive(Debug, Serialize)]
struct Attachment<'a> {
    filename: String,
    path: &'a str,
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: String,
    attachments: Vec<Attachment<'a>>,
    metadata: &'a OrderMessage,
}

/// Posts messages as JSON to an HTTP mail relay.
#[derive(Debug, Clone)]
pub struct HttpMailNotifier {
    client: Client,
    endpoint: String,
    from: String,
}

impl HttpMailNotifier {
    pub fn new(endpoint: impl Into<String>, from: impl Into<String>) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl Notifier for HttpMailNotifier {
    #[tracing::instrument(skip(self, message), fields(order_number = %message.order_number))]
    async fn send(&self, message: &OrderMessage) -> Result<(), DeliveryError> {
        let request = RelayRequest {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: message.html_body(),
            attachments: vec![Attachment {
                filename: format!("order-{}.html", message.order_number),
                path: message.document_ref.as_str(),
            }],
            metadata: message,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(IDEMPOTENCY_HEADER, &message.idempotency_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!("mail relay accepted message");
        Ok(())
    }
}

/// Logs messages instead of sending them. Used when no relay is configured.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, message: &OrderMessage) -> Result<(), DeliveryError> {
        tracing::info!(
            to = ?message.to,
            subject = %message.subject,
            document = %message.document_ref,
            idempotency_key = %message.idempotency_key,
            "order message (not sent, no mail relay configured)"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<OrderMessage>,
    send_calls: u32,
    fail_next: u32,
    fail_always: bool,
    stall: Option<Duration>,
}

/// In-memory notifier for tests, with failure and stall injection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryNotifierState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryNotifierState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_fail(&self, fail: bool) {
        self.write().fail_always = fail;
    }

    pub fn fail_next(&self, count: u32) {
        self.write().fail_next = count;
    }

    pub fn set_stall(&self, stall: Option<Duration>) {
        self.write().stall = stall;
    }

    pub fn sent(&self) -> Vec<OrderMessage> {
        self.read().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.read().sent.len()
    }

    pub fn send_calls(&self) -> u32 {
        self.read().send_calls
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, message: &OrderMessage) -> Result<(), DeliveryError> {
        let stall = {
            let mut state = self.write();
            state.send_calls += 1;
            state.stall
        };
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }

        let mut state = self.write();
        if state.fail_always {
            return Err(DeliveryError::Failed("SMTP connection refused".to_string()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(DeliveryError::Failed("SMTP connection refused".to_string()));
        }
        state.sent.push(message.clone());
        Ok(())
    }
}
