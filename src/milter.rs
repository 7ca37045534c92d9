use crate::config::Config;
use crate::delivery::SinkTransport;
use crate::email::Envelope;
use crate::processor::Processor;
use indymilter::{run, Callbacks, Config as IndyConfig, Status};
use std::ffi::CString;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

pub struct Milter {
    processor: Arc<Processor>,
}

/// Everything seen for one message, kept in the connection context.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    pub envelope: Envelope,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MessageBuffer {
    /// Rebuild the raw RFC 5322 message from the milter callbacks.
    pub fn raw_message(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.body.len() + 1024);
        for (name, value) in &self.headers {
            raw.extend_from_slice(name.as_bytes());
            raw.extend_from_slice(b": ");
            raw.extend_from_slice(value.as_bytes());
            raw.extend_from_slice(b"\r\n");
        }
        raw.extend_from_slice(b"\r\n");
        raw.extend_from_slice(&self.body);
        raw
    }
}

fn join_args(args: &[CString]) -> String {
    args.iter()
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join(",")
}

fn envelope_address(arg: &CString) -> String {
    arg.to_string_lossy().trim_matches(['<', '>']).to_string()
}

/// Hand a finished message to the processor without holding up the MTA.
pub fn spawn_processing<T>(processor: Arc<Processor<T>>, buffer: MessageBuffer) -> JoinHandle<()>
where
    T: SinkTransport + 'static,
{
    tokio::spawn(async move {
        processor
            .handle(&buffer.raw_message(), &buffer.envelope)
            .await;
    })
}

impl Milter {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let processor = Arc::new(Processor::from_config(config)?);
        Ok(Milter { processor })
    }

    pub async fn run(&self, socket_path: &str) -> anyhow::Result<()> {
        log::info!("Starting milter on: {}", socket_path);
        // Remove existing socket if it exists
        if std::path::Path::new(socket_path).exists() {
            std::fs::remove_file(socket_path)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        let processor = self.processor.clone();

        let callbacks = Callbacks::<MessageBuffer>::new()
            .on_connect(|_ctx, hostname, _socket_info| {
                Box::pin(async move {
                    log::debug!("Connection from: {}", hostname.to_string_lossy());
                    Status::Continue
                })
            })
            .on_mail(|ctx, args| {
                Box::pin(async move {
                    log::debug!("Mail from: {}", join_args(&args));
                    // Every MAIL FROM starts a fresh message.
                    ctx.data = Some(MessageBuffer {
                        envelope: Envelope {
                            sender: args.first().map(envelope_address),
                            recipients: Vec::new(),
                        },
                        ..Default::default()
                    });
                    Status::Continue
                })
            })
            .on_rcpt(|ctx, args| {
                Box::pin(async move {
                    log::debug!("Rcpt to: {}", join_args(&args));
                    if let (Some(buffer), Some(recipient)) = (ctx.data.as_mut(), args.first()) {
                        buffer.envelope.recipients.push(envelope_address(recipient));
                    }
                    Status::Continue
                })
            })
            .on_header(|ctx, name, value| {
                Box::pin(async move {
                    if let Some(buffer) = ctx.data.as_mut() {
                        buffer.headers.push((
                            name.to_string_lossy().into_owned(),
                            value.to_string_lossy().into_owned(),
                        ));
                    }
                    Status::Continue
                })
            })
            .on_body(|ctx, chunk| {
                Box::pin(async move {
                    if let Some(buffer) = ctx.data.as_mut() {
                        buffer.body.extend_from_slice(&chunk);
                    }
                    Status::Continue
                })
            })
            .on_eom(move |ctx| {
                let processor = processor.clone();
                Box::pin(async move {
                    match ctx.data.take() {
                        Some(buffer) => {
                            log::info!(
                                "End of message from {} - processing",
                                buffer.envelope.sender.as_deref().unwrap_or("unknown")
                            );
                            spawn_processing(processor, buffer);
                        }
                        None => log::warn!("End of message without buffered content"),
                    }
                    // Answer right away; processing finishes in the background.
                    Status::Accept
                })
            })
            .on_abort(|ctx| {
                Box::pin(async move {
                    ctx.data = None;
                    Status::Continue
                })
            });

        run(listener, callbacks, IndyConfig::default(), tokio::signal::ctrl_c()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerIdentity;
    use crate::delivery::tests::FakeTransport;
    use crate::delivery::DeliveryClient;
    use std::time::{Duration, Instant};

    #[test]
    fn test_raw_message_round_trip() {
        let buffer = MessageBuffer {
            envelope: Envelope::default(),
            headers: vec![
                ("From".to_string(), "reports@example.org".to_string()),
                ("Received".to_string(), "from a".to_string()),
                ("Received".to_string(), "from b".to_string()),
            ],
            body: b"hello\r\n".to_vec(),
        };
        assert_eq!(
            buffer.raw_message(),
            b"From: reports@example.org\r\nReceived: from a\r\nReceived: from b\r\n\r\nhello\r\n"
        );
    }

    #[tokio::test]
    async fn test_processing_does_not_block_caller() {
        let transport = FakeTransport {
            delay: Some(Duration::from_millis(300)),
            ..Default::default()
        };
        let processor = Arc::new(Processor::new(
            DeliveryClient::new(transport, WorkerIdentity::default(), Duration::from_secs(5))
                .unwrap(),
        ));
        let buffer = MessageBuffer {
            envelope: Envelope {
                sender: Some("reports@example.org".to_string()),
                recipients: vec!["dmarc@example.com".to_string()],
            },
            headers: vec![("Subject".to_string(), "hello".to_string())],
            body: b"body\r\n".to_vec(),
        };

        let started = Instant::now();
        let handle = spawn_processing(processor.clone(), buffer);
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(!handle.is_finished());

        handle.await.unwrap();
        assert_eq!(processor.delivery().transport().requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_join_args() {
        let args = vec![
            CString::new("<bounce@example.com>").unwrap(),
            CString::new("SIZE=100").unwrap(),
        ];
        assert_eq!(join_args(&args), "<bounce@example.com>,SIZE=100");
        assert_eq!(envelope_address(&args[0]), "bounce@example.com");
    }
}
