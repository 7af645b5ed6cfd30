//! Outgoing mail. Messages are dropped into an outbox directory for a local
//! MTA or an operator to pick up.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::error::{Result, RollcallError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    /// Render as a plain RFC 5322 style message.
    pub fn to_rfc5322(&self) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}\r\n",
            self.from,
            self.to,
            self.subject,
            Utc::now().to_rfc2822(),
            self.body
        )
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Writes each message to `<outbox>/<timestamp>-<n>.eml`.
pub struct FileMailer {
    outbox: PathBuf,
    counter: AtomicU64,
}

impl FileMailer {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Mailer for FileMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        tokio::fs::create_dir_all(&self.outbox)
            .await
            .map_err(|e| RollcallError::Mail(format!("cannot create outbox: {e}")))?;

        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{n}.eml", Utc::now().format("%Y%m%d%H%M%S%6f"));
        let path = self.outbox.join(name);
        tokio::fs::write(&path, message.to_rfc5322())
            .await
            .map_err(|e| RollcallError::Mail(format!("cannot write {}: {e}", path.display())))?;

        info!(to = %message.to, subject = %message.subject, path = %path.display(), "queued mail");
        Ok(())
    }
}

/// Keeps messages in memory instead of delivering them.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| RollcallError::Mail("mailbox lock poisoned".into()))?
            .push(message.clone());
        Ok(())
    }
}
