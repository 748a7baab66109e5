//! Outbound survey mail.
//!
//! Delivery itself is out of scope for this tool; messages are rendered
//! and dropped into an outbox directory for the site's mailer to pick
//! up. The trait seam keeps command code testable without touching the
//! filesystem.

use anyhow::Context;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait MailSender {
    fn send(&self, message: &Message) -> anyhow::Result<()>;
}

/// Writes each message as one RFC-822-ish text file under the outbox
/// directory, named after the recipient and a sequence number.
pub struct FileOutbox {
    dir: PathBuf,
}

impl FileOutbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn unique_path(&self, recipient: &str) -> PathBuf {
        let slug: String = recipient
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let mut n = 0usize;
        loop {
            let candidate = self.dir.join(format!("{slug}.{n}.eml"));
            if !candidate.exists() {
                return candidate;
            }
            n += 1;
        }
    }
}

impl MailSender for FileOutbox {
    fn send(&self, message: &Message) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating outbox {}", self.dir.display()))?;
        let path = self.unique_path(&message.to);
        let rendered = format!(
            "To: {}\nSubject: {}\n\n{}\n",
            message.to, message.subject, message.body
        );
        fs::write(&path, rendered)
            .with_context(|| format!("writing message {}", path.display()))?;
        tracing::info!(to = %message.to, path = %path.display(), "message queued");
        Ok(())
    }
}
