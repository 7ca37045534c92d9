use crate::config::{Config, WorkerIdentity};
use crate::email::{Attachment, EmailSummary};
use crate::report::NormalizedRecordRow;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Request timeout: {0}")]
    Timeout(String),
    #[error("Network error: {0}")]
    NetworkFailure(String),
    #[error("Sink returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("Sink rejected payload: {0}")]
    SinkRejected(String),
    #[error("Retry failed after '{first}': {source}")]
    RetryFailed {
        first: String,
        #[source]
        source: Box<DeliveryError>,
    },
    #[error("Failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("{0}")]
    Network(String),
}

#[derive(Debug, Clone)]
pub struct SinkRequest {
    pub body: Vec<u8>,
    pub is_retry: bool,
}

#[derive(Debug, Clone)]
pub struct SinkResponse {
    pub status: u16,
    pub body: String,
}

/// One JSON POST to the reporting sink.
pub trait SinkTransport: Send + Sync {
    fn post(
        &self,
        request: SinkRequest,
    ) -> impl Future<Output = Result<SinkResponse, TransportError>> + Send;
}

pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    /// `request_timeout` bounds every request, including the retry.
    pub fn new(
        endpoint: &str,
        identity: &WorkerIdentity,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(identity.user_agent())
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

impl SinkTransport for HttpTransport {
    async fn post(&self, request: SinkRequest) -> Result<SinkResponse, TransportError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request.body);
        if request.is_retry {
            builder = builder.header("X-Is-Retry", "true");
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(e.to_string())
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(SinkResponse { status, body })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentSummary {
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub content: Option<String>,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryPayload<'a> {
    pub email: EmailSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentSummary>,
    pub dmarc_records: &'a [NormalizedRecordRow],
    pub processed_at: DateTime<Utc>,
    pub worker_version: String,
    pub source: String,
}

impl DeliveryPayload<'_> {
    /// Degraded copy for the single retry: no attachment bytes, tagged
    /// subject and version.
    pub fn for_retry(&self) -> Self {
        let mut retry = self.clone();
        if let Some(attachment) = retry.attachment.as_mut() {
            attachment.content = None;
        }
        retry.email.subject = format!("[RETRY] {}", retry.email.subject);
        retry.worker_version = format!("{}-retry", retry.worker_version);
        retry
    }
}

#[derive(Debug, Deserialize)]
struct SinkReply {
    success: bool,
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    pub message: Option<String>,
    pub retried: bool,
}

pub struct DeliveryClient<T: SinkTransport = HttpTransport> {
    transport: T,
    identity: WorkerIdentity,
    timeout: Duration,
    retryable: Regex,
}

impl DeliveryClient<HttpTransport> {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(
            &config.sink.endpoint,
            &config.worker,
            Duration::from_secs(config.sink.client_timeout_seconds),
        )?;
        Ok(Self::new(
            transport,
            config.worker.clone(),
            Duration::from_secs(config.sink.timeout_seconds),
        )?)
    }
}

impl<T: SinkTransport> DeliveryClient<T> {
    pub fn new(
        transport: T,
        identity: WorkerIdentity,
        timeout: Duration,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            transport,
            identity,
            timeout,
            retryable: Regex::new(r"(?i)timeout|network|connection|502|503|504")?,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn build_payload<'a>(
        &self,
        email: &EmailSummary,
        attachment: Option<&Attachment>,
        rows: &'a [NormalizedRecordRow],
    ) -> DeliveryPayload<'a> {
        let attachment = attachment.map(|a| {
            let encoded = BASE64_STANDARD.encode(&a.content);
            AttachmentSummary {
                filename: a.filename.clone(),
                mime_type: a.mime_type.clone(),
                size: encoded.len(),
                content: Some(encoded),
            }
        });

        DeliveryPayload {
            email: email.clone(),
            attachment,
            dmarc_records: rows,
            processed_at: Utc::now(),
            worker_version: self.identity.version.clone(),
            source: self.identity.source.clone(),
        }
    }

    /// Whether a failed delivery is worth one more attempt.
    pub fn is_retryable(&self, error: &DeliveryError) -> bool {
        match error {
            DeliveryError::SinkRejected(_)
            | DeliveryError::RetryFailed { .. }
            | DeliveryError::Serialization(_) => false,
            other => self.retryable.is_match(&other.to_string()),
        }
    }

    pub async fn deliver(
        &self,
        email: &EmailSummary,
        attachment: Option<&Attachment>,
        rows: &[NormalizedRecordRow],
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let payload = self.build_payload(email, attachment, rows);

        let first = match self.send(&payload, false).await {
            Ok(message) => {
                return Ok(DeliveryReceipt {
                    message,
                    retried: false,
                })
            }
            Err(e) => e,
        };

        if !self.is_retryable(&first) {
            return Err(first);
        }

        log::warn!("Delivery failed ({first}), retrying without attachment content");
        match self.send(&payload.for_retry(), true).await {
            Ok(message) => Ok(DeliveryReceipt {
                message,
                retried: true,
            }),
            Err(retry) => Err(DeliveryError::RetryFailed {
                first: first.to_string(),
                source: Box::new(retry),
            }),
        }
    }

    async fn send(
        &self,
        payload: &DeliveryPayload<'_>,
        is_retry: bool,
    ) -> Result<Option<String>, DeliveryError> {
        let request = SinkRequest {
            body: serde_json::to_vec(payload)?,
            is_retry,
        };
        log::debug!(
            "Posting {} records ({} bytes, retry: {is_retry})",
            payload.dmarc_records.len(),
            request.body.len()
        );

        // Only the first attempt carries the hard deadline.
        let result = if is_retry {
            self.transport.post(request).await
        } else {
            tokio::time::timeout(self.timeout, self.transport.post(request))
                .await
                .map_err(|_| DeliveryError::Timeout(format!("no response after {:?}", self.timeout)))?
        };

        let response = result.map_err(|e| match e {
            TransportError::Timeout(msg) => DeliveryError::Timeout(msg),
            TransportError::Network(msg) => DeliveryError::NetworkFailure(msg),
        })?;

        if !(200..300).contains(&response.status) {
            return Err(DeliveryError::HttpStatus {
                status: response.status,
                body: response.body,
            });
        }

        match serde_json::from_str::<SinkReply>(&response.body) {
            Ok(reply) if reply.success => Ok(reply.message),
            Ok(reply) => {
                let reason = reply
                    .error
                    .or(reply.message)
                    .unwrap_or_else(|| "no reason given".to_string());
                log::warn!("Sink rejected report payload: {reason}");
                Err(DeliveryError::SinkRejected(reason))
            }
            Err(e) => {
                log::warn!("Sink answered HTTP {} with unexpected body: {e}", response.status);
                Ok(None)
            }
        }
    }
}
