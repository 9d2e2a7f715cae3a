//! Email alerts through the host's `mail` user agent.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, error, info, warn};

/// Split a comma-separated recipient list, trimming whitespace and dropping
/// empty entries.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
pub struct Email {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
    pub sender: String,
}

impl Email {
    /// Full message text: headers, body, and a "Sent at" trailer.
    pub fn render(&self) -> String {
        let now = Local::now();
        format!(
            "From: {}\nTo: {}\nSubject: {}\n\n{}\n\nSent at: {} {}\n",
            self.sender,
            self.recipients.join(","),
            self.subject,
            self.body,
            now.format("%Y-%m-%d %H:%M:%S"),
            now.format("%Z"),
        )
    }
}

/// Outcome of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The mail binary is not installed on this host.
    Skipped,
}

pub struct Mailer {
    binary: PathBuf,
}

impl Mailer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Hand `email` to the mail binary. A missing binary is not an error;
    /// the alert is dropped with a warning. A failing binary is.
    pub fn send(&self, email: &Email) -> Result<Delivery> {
        if !self.binary.exists() {
            error!(binary = %self.binary.display(), "mail binary not found");
            warn!(subject = %email.subject, "skipping sending email");
            return Ok(Delivery::Skipped);
        }

        let message = email.render();
        debug!(
            binary = %self.binary.display(),
            recipients = ?email.recipients,
            "sending email:\n{message}"
        );

        let mut child = Command::new(&self.binary)
            .arg("-s")
            .arg(&email.subject)
            .args(&email.recipients)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start {}", self.binary.display()))?;

        if let Some(mut stdin) = child.stdin.take() {
            // The exit status below is authoritative if the child closed early.
            match stdin.write_all(message.as_bytes()) {
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("mail closed stdin before reading the message");
                }
                other => other.context("failed to write email to mail stdin")?,
            }
        }

        let output = child
            .wait_with_output()
            .context("failed to wait for mail process")?;
        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        info!(recipients = ?email.recipients, subject = %email.subject, "email sent");
        Ok(Delivery::Sent)
    }
}
