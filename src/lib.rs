pub mod config;
pub mod delivery;
pub mod email;
pub mod milter;
pub mod processor;
pub mod report;

pub use config::{Config, WorkerIdentity};
pub use delivery::{DeliveryClient, DeliveryError, HttpTransport, SinkTransport};
pub use email::{Attachment, EmailMessage, EmailSummary, Envelope, ProcessError};
pub use milter::Milter;
pub use processor::{EmailClassification, Processor};
pub use report::NormalizedRecordRow;
