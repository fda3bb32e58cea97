//! Buzzer and status display over sysfs-style files.
//!
//! The buzzer is a GPIO `value` file (`/sys/class/gpio/gpioN/value`); the
//! status line is a plain file that a display driver or operator can read.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndicatorError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Local buzzer + status line. Either half may be absent.
#[derive(Debug, Clone, Default)]
pub struct SysfsIndicator {
    buzzer: Option<PathBuf>,
    status: Option<PathBuf>,
}

impl SysfsIndicator {
    pub fn new(buzzer: Option<PathBuf>, status: Option<PathBuf>) -> Self {
        Self { buzzer, status }
    }

    /// Drive the buzzer high for `duration`, then low.
    ///
    /// The low write is attempted even if the high write failed.
    pub fn pulse(&self, duration: Duration) -> Result<(), IndicatorError> {
        let Some(path) = &self.buzzer else {
            return Ok(());
        };
        let high = write_value(path, "1");
        if high.is_ok() {
            std::thread::sleep(duration);
        }
        let low = write_value(path, "0");
        high.and(low)
    }

    /// Replace the status line.
    pub fn set_status(&self, message: &str) -> Result<(), IndicatorError> {
        match &self.status {
            Some(path) => write_value(path, &format!("{message}\n")),
            None => Ok(()),
        }
    }
}

fn write_value(path: &Path, value: &str) -> Result<(), IndicatorError> {
    std::fs::write(path, value).map_err(|source| IndicatorError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_leaves_buzzer_low() {
        let dir = tempfile::tempdir().unwrap();
        let value = dir.path().join("value");
        let indicator = SysfsIndicator::new(Some(value.clone()), None);
        indicator.pulse(Duration::from_millis(1)).unwrap();
        assert_eq!(std::fs::read_to_string(&value).unwrap(), "0");
    }

    #[test]
    fn test_status_written() {
        let dir = tempfile::tempdir().unwrap();
        let status = dir.path().join("status");
        let indicator = SysfsIndicator::new(None, Some(status.clone()));
        indicator.set_status("Access Granted").unwrap();
        assert_eq!(std::fs::read_to_string(&status).unwrap(), "Access Granted\n");
    }

    #[test]
    fn test_missing_gpio_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let value = dir.path().join("no-such-dir/value");
        let indicator = SysfsIndicator::new(Some(value), None);
        assert!(indicator.pulse(Duration::from_millis(1)).is_err());
    }

    #[test]
    fn test_unconfigured_is_noop() {
        let indicator = SysfsIndicator::default();
        assert!(indicator.pulse(Duration::from_millis(1)).is_ok());
        assert!(indicator.set_status("Present your face").is_ok());
    }
}
