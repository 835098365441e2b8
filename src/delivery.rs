//! Mail delivery of the finished workbook.
//!
//! Uses `lettre` over an authenticated STARTTLS session.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SmtpConfig;
use crate::error::ReportError;

const SMTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Sends a report file to a recipient
pub trait Delivery {
    fn send_report(&self, recipient: &str, attachment: &Path, report_date: NaiveDate) -> Result<()>;
}

/// SMTP delivery with the workbook attached as a binary part
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());

        let transport = SmtpTransport::starttls_relay(&self.config.host)
            .map_err(|e| ReportError::Delivery(e.to_string()))?
            .port(self.config.port)
            .credentials(creds)
            .timeout(Some(SMTP_TIMEOUT))
            .build();
        Ok(transport)
    }
}

impl Delivery for SmtpMailer {
    fn send_report(&self, recipient: &str, attachment: &Path, report_date: NaiveDate) -> Result<()> {
        let email = build_message(self.config.sender(), recipient, attachment, report_date)?;

        self.transport()?
            .send(&email)
            .map_err(|e| ReportError::Delivery(e.to_string()))?;

        info!("Report {} sent to {}", attachment.display(), recipient);
        Ok(())
    }
}

pub fn report_subject(report_date: NaiveDate) -> String {
    format!("Sales report {}", report_date.format("%Y-%m-%d"))
}

/// Multipart message: short text body plus the file as `application/octet-stream`
pub fn build_message(
    from: &str,
    recipient: &str,
    attachment: &Path,
    report_date: NaiveDate,
) -> Result<Message> {
    let bytes = fs::read(attachment)
        .with_context(|| format!("Failed to read attachment {}", attachment.display()))?;
    let file_name = attachment
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ReportError::Delivery(format!("no file name in {}", attachment.display())))?;

    let content_type = ContentType::parse("application/octet-stream")
        .map_err(|e| ReportError::Delivery(e.to_string()))?;
    let body = format!(
        "Daily sales report for {} attached ({}).",
        report_date.format("%Y-%m-%d"),
        file_name
    );

    let email = Message::builder()
        .from(
            from.parse()
                .map_err(|e| ReportError::Delivery(format!("invalid sender address: {e}")))?,
        )
        .to(recipient
            .parse()
            .map_err(|e| ReportError::Delivery(format!("invalid recipient address: {e}")))?)
        .subject(report_subject(report_date))
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(body))
                .singlepart(Attachment::new(file_name).body(bytes, content_type)),
        )
        .map_err(|e| ReportError::Delivery(e.to_string()))?;

    Ok(email)
}
