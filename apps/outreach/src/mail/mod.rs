//! Outbound mail: message composition, the SMTP transport seam, the
//! per-account sender cache and the SMTP account service.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use thiserror::Error;

use crate::crypto::CryptoError;

pub mod cache;
pub mod handlers;
pub mod sender;
pub mod smtp_accounts;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address '{0}'")]
    Address(String),

    #[error("could not build message: {0}")]
    Compose(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),

    #[error("could not configure SMTP sender: {0}")]
    Setup(String),

    #[error("SMTP password could not be decrypted: {0}")]
    Credentials(#[from] CryptoError),
}

impl MailError {
    /// Errors that sending the same message again cannot fix.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, MailError::Transport(_))
    }
}

/// A file attached to an outgoing message.
#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A plain-text message with an optional single attachment.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub from_email: String,
    pub from_name: Option<String>,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<MailAttachment>,
}

/// Submits composed messages. Production wires in an SMTP transport; tests
/// use a recording one.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

fn mailbox(name: Option<&str>, address: &str) -> Result<Mailbox, MailError> {
    let address = address
        .trim()
        .parse()
        .map_err(|_| MailError::Address(address.to_string()))?;
    let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
    Ok(Mailbox::new(name, address))
}

/// Builds the MIME message: a text part, plus the attachment when present.
pub fn compose(email: &OutgoingEmail) -> Result<Message, MailError> {
    let builder = Message::builder()
        .from(mailbox(email.from_name.as_deref(), &email.from_email)?)
        .to(mailbox(None, &email.to)?)
        .subject(email.subject.clone());

    let text = SinglePart::plain(email.body.clone());
    let message = match &email.attachment {
        Some(file) => {
            let content_type = ContentType::parse(&file.content_type)
                .map_err(|e| MailError::Compose(format!("{}: {e}", file.content_type)))?;
            let attachment =
                Attachment::new(file.filename.clone()).body(file.bytes.clone(), content_type);
            builder.multipart(MultiPart::mixed().singlepart(text).singlepart(attachment))
        }
        None => builder.singlepart(text),
    };
    message.map_err(|e| MailError::Compose(e.to_string()))
}
