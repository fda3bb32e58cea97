use chrono::{DateTime, Utc};
use thiserror::Error;
use warden_hw::GeoFix;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{0} path is not configured")]
    Disabled(&'static str),
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("endpoint answered with status {0}")]
    Rejected(u16),
    #[error("could not build message: {0}")]
    Message(String),
}

/// One status record handed to the dispatcher.
///
/// Built per iteration for telemetry, and once more with `intruder_alert`
/// set when escalation fires. Not persisted after dispatch.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub device_id: String,
    pub location: Option<GeoFix>,
    pub access_granted: bool,
    pub intruder_alert: bool,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(
        device_id: impl Into<String>,
        location: Option<GeoFix>,
        access_granted: bool,
        intruder_alert: bool,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            location,
            access_granted,
            intruder_alert,
            timestamp: Utc::now(),
        }
    }

    /// `accessGranted` as the 0/1 the reporting endpoint expects.
    pub fn access_flag(&self) -> u8 {
        u8::from(self.access_granted)
    }

    /// `intruderAlert` as the 0/1 the reporting endpoint expects.
    pub fn intruder_flag(&self) -> u8 {
        u8::from(self.intruder_alert)
    }
}
