use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use warden_access::AccessPolicy;
use warden_hw::CaptureSettings;
use warden_notify::{ReportConfig, SmtpConfig};

const DEFAULT_CONFIG_PATH: &str = "/etc/warden/warden.toml";

/// Daemon configuration.
///
/// Precedence, lowest first: built-in defaults, the TOML file named by
/// `WARDEN_CONFIG` (else `/etc/warden/warden.toml` if present), then
/// `WARDEN_*` environment variables named after each field.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Identity reported with every alert.
    pub device_id: String,

    /// V4L2 device path.
    pub camera_device: String,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Pixel buffers available to capture and enrollment together.
    pub frame_buffers: usize,
    /// Frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    pub clahe: bool,

    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Minimum SCRFD score for a candidate box.
    pub detection_confidence: f32,
    pub enrollment_dir: PathBuf,
    pub enrollment_image: String,

    pub acceptance_threshold: f32,
    pub max_attempts: u32,
    pub tick_interval_ms: u64,
    pub capture_retry_ms: u64,
    pub alarm_pulse_ms: u64,

    /// `host:port` probed at startup before the loop begins. Defaults to the
    /// SMTP relay when unset.
    pub link_probe_addr: Option<String>,
    pub link_timeout_secs: u64,

    pub report_url: Option<String>,
    pub report_api_key: String,
    pub report_timeout_secs: u64,

    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_sender: String,
    pub smtp_recipient: Option<String>,
    pub dashboard_link: String,
    pub smtp_timeout_secs: u64,

    /// GPIO value file driving the buzzer.
    pub buzzer_path: Option<PathBuf>,
    /// File receiving the status line.
    pub status_path: Option<PathBuf>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Serial device streaming NMEA sentences; takes precedence over fixed coordinates.
    pub gps_device: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: "warden-01".to_string(),
            camera_device: "/dev/video0".to_string(),
            capture_width: 640,
            capture_height: 480,
            frame_buffers: 2,
            warmup_frames: 4,
            clahe: true,
            model_dir: warden_core::default_model_dir(),
            detection_confidence: 0.5,
            enrollment_dir: PathBuf::from("/var/lib/warden/faces"),
            enrollment_image: "user1.jpg".to_string(),
            acceptance_threshold: 0.6,
            max_attempts: 3,
            tick_interval_ms: 2000,
            capture_retry_ms: 500,
            alarm_pulse_ms: 500,
            link_probe_addr: None,
            link_timeout_secs: 20,
            report_url: None,
            report_api_key: String::new(),
            report_timeout_secs: 10,
            smtp_host: None,
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_sender: String::new(),
            smtp_recipient: None,
            dashboard_link: String::new(),
            smtp_timeout_secs: 15,
            buzzer_path: None,
            status_path: None,
            latitude: None,
            longitude: None,
            gps_device: None,
        }
    }
}

impl Config {
    /// Load from the default sources and validate.
    pub fn load() -> Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok();
        let path = match lookup("WARDEN_CONFIG") {
            Some(path) => Some(PathBuf::from(path)),
            None => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|p| p.exists()),
        };
        Self::from_sources(path.as_deref(), lookup)
    }

    pub fn from_sources(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        macro_rules! set {
            ($cfg:ident, $lookup:ident; $($field:ident),* $(,)?) => {
                $(if let Some(v) = env_value(&$lookup, stringify!($field))? {
                    $cfg.$field = v;
                })*
            };
        }
        macro_rules! set_some {
            ($cfg:ident, $lookup:ident; $($field:ident),* $(,)?) => {
                $(if let Some(v) = env_value(&$lookup, stringify!($field))? {
                    $cfg.$field = Some(v);
                })*
            };
        }

        let cfg = self;
        set!(cfg, lookup;
            device_id, camera_device, capture_width, capture_height, frame_buffers,
            warmup_frames, model_dir, detection_confidence, enrollment_dir, enrollment_image,
            acceptance_threshold, max_attempts, tick_interval_ms, capture_retry_ms,
            alarm_pulse_ms, link_timeout_secs, report_api_key, report_timeout_secs,
            smtp_port, smtp_username, smtp_password, smtp_sender, dashboard_link,
            smtp_timeout_secs,
        );
        set_some!(cfg, lookup;
            link_probe_addr, report_url, smtp_host, smtp_recipient, buzzer_path,
            status_path, latitude, longitude, gps_device,
        );
        if let Some(v) = lookup("WARDEN_CLAHE") {
            cfg.clahe = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts < 1 {
            bail!("max_attempts must be at least 1");
        }
        if !(self.acceptance_threshold > 0.0 && self.acceptance_threshold <= 1.0) {
            bail!(
                "acceptance_threshold must be in (0, 1], got {}",
                self.acceptance_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.detection_confidence) {
            bail!("detection_confidence must be in [0, 1]");
        }
        if self.frame_buffers < 1 {
            bail!("frame_buffers must be at least 1");
        }
        if self.latitude.is_some() != self.longitude.is_some() {
            bail!("latitude and longitude must be set together");
        }
        Ok(())
    }

    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy {
            acceptance_threshold: self.acceptance_threshold,
            max_attempts: self.max_attempts,
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            capture_retry_delay: Duration::from_millis(self.capture_retry_ms),
            alarm_pulse: Duration::from_millis(self.alarm_pulse_ms),
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            width: self.capture_width,
            height: self.capture_height,
            clahe: self.clahe,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }

    pub fn link_probe(&self) -> Option<String> {
        self.link_probe_addr.clone().or_else(|| {
            self.smtp_host
                .as_ref()
                .map(|host| format!("{host}:{}", self.smtp_port))
        })
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_secs(self.link_timeout_secs)
    }

    pub fn report_config(&self) -> Option<ReportConfig> {
        self.report_url.as_ref().map(|url| ReportConfig {
            url: url.clone(),
            api_key: self.report_api_key.clone(),
            timeout: Duration::from_secs(self.report_timeout_secs),
        })
    }

    /// SMTP settings, when both a relay and a recipient are configured.
    pub fn smtp_config(&self) -> Option<SmtpConfig> {
        let host = self.smtp_host.as_ref()?;
        let recipient = self.smtp_recipient.as_ref()?;
        Some(SmtpConfig {
            host: host.clone(),
            port: self.smtp_port,
            username: self.smtp_username.clone(),
            password: self.smtp_password.clone(),
            sender: self.smtp_sender.clone(),
            recipient: recipient.clone(),
            dashboard_link: self.dashboard_link.clone(),
            timeout: Duration::from_secs(self.smtp_timeout_secs),
        })
    }
}

/// Parse `WARDEN_<FIELD>` if set. A set but unparsable value is an error.
fn env_value<T>(lookup: impl Fn(&str) -> Option<String>, field: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let key = format!("WARDEN_{}", field.to_ascii_uppercase());
    match lookup(&key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw:?}: {e}")),
        None => Ok(None),
    }
}
