use std::path::PathBuf;

use lettre::{address::AddressError, message::Mailbox};

/// Transport-agnostic outbound mail envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailRequest {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

impl MailRequest {
    pub fn new(from: String, to: String, subject: String, body: String) -> Self {
        Self {
            from,
            to,
            subject,
            body,
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, path: PathBuf) -> Self {
        self.attachment = Some(path);
        self
    }
}

/// Display name and address mail is sent from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub name: String,
    pub address: String,
}

impl Sender {
    /// The display name is quoted when it contains characters such as `,`
    /// or `"` that a bare phrase cannot carry.
    pub fn mailbox(&self) -> Result<Mailbox, AddressError> {
        Ok(Mailbox::new(Some(self.name.clone()), self.address.parse()?))
    }
}
