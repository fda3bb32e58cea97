//! Intruder notifications by e-mail over a STARTTLS relay.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use std::time::Duration;
use tracing::info;
use warden_access::{AlertEvent, DispatchError};

pub const SUBJECT: &str = "Intruder Alert!";
const SENDER_NAME: &str = "Vehicle Security";

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    /// Submission port; 587 for STARTTLS.
    pub port: u16,
    pub username: String,
    pub password: String,
    pub sender: String,
    pub recipient: String,
    pub dashboard_link: String,
    pub timeout: Duration,
}

pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
    dashboard_link: String,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Result<Self, DispatchError> {
        let from = mailbox(Some(SENDER_NAME), &config.sender)?;
        let to = mailbox(None, &config.recipient)?;
        let transport = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| DispatchError::Transport(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(config.username, config.password))
            .timeout(Some(config.timeout))
            .build();
        Ok(Self {
            transport,
            from,
            to,
            dashboard_link: config.dashboard_link,
        })
    }

    pub fn send(&self, event: &AlertEvent) -> Result<(), DispatchError> {
        let message = compose(&self.from, &self.to, &self.dashboard_link, event)?;
        self.transport
            .send(&message)
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        info!(to = %self.to, "intruder notification sent");
        Ok(())
    }
}

fn mailbox(name: Option<&str>, address: &str) -> Result<Mailbox, DispatchError> {
    let address: Address = address
        .parse()
        .map_err(|e| DispatchError::Message(format!("{address:?}: {e}")))?;
    Ok(Mailbox::new(name.map(str::to_string), address))
}

pub fn compose(
    from: &Mailbox,
    to: &Mailbox,
    dashboard_link: &str,
    event: &AlertEvent,
) -> Result<Message, DispatchError> {
    Message::builder()
        .from(from.clone())
        .to(to.clone())
        .subject(SUBJECT)
        .header(ContentType::TEXT_PLAIN)
        .body(alert_body(event, dashboard_link))
        .map_err(|e| DispatchError::Message(e.to_string()))
}

pub fn alert_body(event: &AlertEvent, dashboard_link: &str) -> String {
    let location = match event.location {
        Some(fix) => format!("{:.6}, {:.6}", fix.latitude, fix.longitude),
        None => "unknown".to_string(),
    };
    format!(
        "An intruder tried to use the vehicle! Check: {dashboard_link}\n\n\
         Device: {}\n\
         Time: {}\n\
         Location: {location}\n",
        event.device_id,
        event.timestamp.to_rfc3339(),
    )
}
