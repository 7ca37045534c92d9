use crate::report::{FormatResolver, ReportFormat};
use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Message has no raw content")]
    MissingRawContent,
}

/// SMTP envelope as seen by the MTA, used when headers are missing.
#[derive(Debug, Default, Clone)]
pub struct Envelope {
    pub sender: Option<String>,
    pub recipients: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct EmailSummary {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub date: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub summary: EmailSummary,
    pub attachments: Vec<Attachment>,
}

impl EmailMessage {
    pub fn parse(raw: &[u8], envelope: &Envelope) -> Result<Self, ProcessError> {
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(ProcessError::MissingRawContent);
        }

        let mail = match mailparse::parse_mail(raw) {
            Ok(mail) => mail,
            Err(e) => {
                log::warn!("Unparsable message, keeping envelope summary only: {e}");
                return Ok(Self::envelope_only(envelope));
            }
        };
        let headers = &mail.headers;

        let from = headers
            .get_first_value("From")
            .or_else(|| envelope.sender.clone())
            .unwrap_or_default();

        let mut to: Vec<String> = headers
            .get_first_header("To")
            .and_then(|h| mailparse::addrparse_header(h).ok())
            .map(|list| list.iter().flat_map(addresses).collect())
            .unwrap_or_default();
        if to.is_empty() {
            to = envelope.recipients.clone();
        }

        let summary = EmailSummary {
            from,
            to,
            subject: headers.get_first_value("Subject").unwrap_or_default(),
            date: headers.get_first_value("Date").unwrap_or_default(),
            message_id: headers.get_first_value("Message-ID").unwrap_or_default(),
        };

        let mut attachments = Vec::new();
        collect_attachments(&mail, &mut attachments);

        Ok(EmailMessage {
            summary,
            attachments,
        })
    }

    /// Summary built from the SMTP envelope alone, without attachments.
    pub fn envelope_only(envelope: &Envelope) -> Self {
        EmailMessage {
            summary: EmailSummary {
                from: envelope.sender.clone().unwrap_or_default(),
                to: envelope.recipients.clone(),
                ..Default::default()
            },
            attachments: Vec::new(),
        }
    }

    /// Only the first attachment is ever examined.
    pub fn first_attachment(&self) -> Option<&Attachment> {
        self.attachments.first()
    }
}

fn addresses(addr: &MailAddr) -> Vec<String> {
    match addr {
        MailAddr::Single(info) => vec![info.addr.clone()],
        MailAddr::Group(group) => group.addrs.iter().map(|a| a.addr.clone()).collect(),
    }
}

fn collect_attachments(part: &ParsedMail<'_>, out: &mut Vec<Attachment>) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_attachments(sub, out);
        }
        return;
    }

    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned();
    let mime_type = part
        .headers
        .get_first_value("Content-Type")
        .map(|_| part.ctype.mimetype.clone());

    let is_attachment = matches!(disposition.disposition, DispositionType::Attachment)
        || filename.is_some()
        || (mime_type.is_some()
            && FormatResolver::resolve(mime_type.as_deref(), None) != ReportFormat::Unsupported);
    if !is_attachment {
        return;
    }

    match part.get_body_raw() {
        Ok(content) => out.push(Attachment {
            filename,
            mime_type,
            content,
        }),
        Err(e) => log::warn!("Unable to decode attachment body: {e}"),
    }
}
