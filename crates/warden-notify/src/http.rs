//! Telemetry reports as a query-string GET (ThingSpeak-style channel update).

use reqwest::blocking::Client;
use std::time::Duration;
use tracing::debug;
use warden_access::{AlertEvent, DispatchError};

#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Channel update URL, e.g. `http://api.thingspeak.com/update`.
    pub url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Sends one flat record per call:
/// `field1` latitude, `field2` longitude, `field3` intruder (0|1),
/// `field4` access granted (0|1). Location fields are omitted when no fix
/// is available.
pub struct HttpReporter {
    client: Client,
    url: String,
    api_key: String,
}

impl HttpReporter {
    pub fn new(config: ReportConfig) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: config.url,
            api_key: config.api_key,
        })
    }

    pub fn query(&self, event: &AlertEvent) -> Vec<(&'static str, String)> {
        let mut query = vec![("api_key", self.api_key.clone())];
        if let Some(fix) = event.location {
            query.push(("field1", format!("{:.6}", fix.latitude)));
            query.push(("field2", format!("{:.6}", fix.longitude)));
        }
        query.push(("field3", event.intruder_flag().to_string()));
        query.push(("field4", event.access_flag().to_string()));
        query
    }

    pub fn send(&self, event: &AlertEvent) -> Result<(), DispatchError> {
        let response = self
            .client
            .get(&self.url)
            .query(&self.query(event))
            .send()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected(status.as_u16()));
        }
        debug!(status = status.as_u16(), "report delivered");
        Ok(())
    }
}
