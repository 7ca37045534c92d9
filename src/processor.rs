use crate::config::Config;
use crate::delivery::{DeliveryClient, HttpTransport, SinkTransport};
use crate::email::{EmailMessage, Envelope, ProcessError};
use crate::report::{self, FormatResolver, NormalizedRecordRow};
use std::path::Path;

/// What an inbound email turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum EmailClassification {
    NoAttachment,
    NonReportAttachment { reason: String },
    DmarcReport { rows: Vec<NormalizedRecordRow> },
}

impl EmailClassification {
    pub fn rows(&self) -> &[NormalizedRecordRow] {
        match self {
            EmailClassification::DmarcReport { rows } => rows,
            _ => &[],
        }
    }
}

pub struct Processor<T: SinkTransport = HttpTransport> {
    delivery: DeliveryClient<T>,
}

impl Processor<HttpTransport> {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(DeliveryClient::from_config(config)?))
    }
}

impl<T: SinkTransport> Processor<T> {
    pub fn new(delivery: DeliveryClient<T>) -> Self {
        Self { delivery }
    }

    pub fn delivery(&self) -> &DeliveryClient<T> {
        &self.delivery
    }

    /// Top-level boundary: nothing escapes to the hosting runtime.
    pub async fn handle(&self, raw: &[u8], envelope: &Envelope) {
        if let Err(e) = self.process(raw, envelope).await {
            log::error!("Failed to process message: {e}");
        }
    }

    /// Classify one email and hand it to the sink. Only missing raw content
    /// is an error; delivery failures are logged.
    pub async fn process(
        &self,
        raw: &[u8],
        envelope: &Envelope,
    ) -> Result<EmailClassification, ProcessError> {
        let message = EmailMessage::parse(raw, envelope)?;
        let attachment = message.first_attachment();
        if message.attachments.len() > 1 {
            log::debug!(
                "Ignoring {} additional attachments",
                message.attachments.len() - 1
            );
        }

        let classification = match attachment {
            None => EmailClassification::NoAttachment,
            Some(a) => match report::extract_rows(
                a.mime_type.as_deref(),
                a.filename.as_deref(),
                &a.content,
            ) {
                Ok(rows) => EmailClassification::DmarcReport { rows },
                Err(e) => {
                    log::info!(
                        "Attachment {:?} is not a DMARC report: {e}",
                        a.filename.as_deref().unwrap_or("unnamed")
                    );
                    EmailClassification::NonReportAttachment {
                        reason: e.to_string(),
                    }
                }
            },
        };

        log::info!(
            "Message {} from {}: {}",
            message.summary.message_id,
            message.summary.from,
            match &classification {
                EmailClassification::NoAttachment => "no attachment".to_string(),
                EmailClassification::NonReportAttachment { .. } => "non-report attachment".to_string(),
                EmailClassification::DmarcReport { rows } => format!("DMARC report, {} rows", rows.len()),
            }
        );

        match self
            .delivery
            .deliver(&message.summary, attachment, classification.rows())
            .await
        {
            Ok(receipt) => log::info!(
                "Delivered message {} to sink{}",
                message.summary.message_id,
                if receipt.retried { " on retry" } else { "" }
            ),
            Err(e) => log::error!("Delivery of message {} failed: {e}", message.summary.message_id),
        }

        Ok(classification)
    }
}

/// Decode a report file from disk using its name to pick the container.
pub fn decode_report_file(path: &Path) -> anyhow::Result<Vec<NormalizedRecordRow>> {
    let content = std::fs::read(path)?;
    let filename = path.file_name().map(|n| n.to_string_lossy().into_owned());
    log::debug!(
        "Decoding {} as {:?}",
        path.display(),
        FormatResolver::resolve(None, filename.as_deref())
    );
    Ok(report::extract_rows(None, filename.as_deref(), &content)?)
}
