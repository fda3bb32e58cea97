//! NMEA 0183 GPS receiver (e.g. u-blox NEO-6M on a UART).
//!
//! Only RMC (position, speed, course, date/time, validity) and GGA (fix
//! quality, satellites) sentences are decoded; everything else is ignored.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

const KNOTS_TO_KMH: f64 = 1.852;

#[derive(Debug, Error)]
pub enum GpsError {
    #[error("failed to open GPS device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("checksum mismatch: sentence says {expected:02X}, computed {actual:02X}")]
    Checksum { expected: u8, actual: u8 },
    #[error("unsupported sentence: {0}")]
    Unsupported(String),
    #[error("malformed sentence: {0}")]
    Malformed(&'static str),
}

/// A position fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: Option<f64>,
    pub course_deg: Option<f64>,
    pub fix_quality: Option<u8>,
    pub satellites: Option<u8>,
    pub time: Option<DateTime<Utc>>,
}

impl GeoFix {
    /// A bare position with no receiver metadata.
    pub fn fixed(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            speed_kmh: None,
            course_deg: None,
            fix_quality: None,
            satellites: None,
            time: None,
        }
    }
}

/// Decoded sentence.
#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    Rmc {
        time: Option<NaiveTime>,
        date: Option<NaiveDate>,
        active: bool,
        position: Option<(f64, f64)>,
        speed_knots: Option<f64>,
        course_deg: Option<f64>,
    },
    Gga {
        position: Option<(f64, f64)>,
        quality: Option<u8>,
        satellites: Option<u8>,
    },
}

/// Parse one NMEA line. A present checksum must match.
pub fn parse_sentence(line: &str) -> Result<Sentence, GpsError> {
    let line = line.trim();
    if !line.is_ascii() {
        return Err(GpsError::Malformed("non-ASCII bytes"));
    }
    let body = line.strip_prefix('$').ok_or(GpsError::Malformed("missing '$'"))?;
    let body = match body.split_once('*') {
        Some((body, checksum)) => {
            let expected = u8::from_str_radix(checksum.trim(), 16)
                .map_err(|_| GpsError::Malformed("bad checksum digits"))?;
            let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);
            if expected != actual {
                return Err(GpsError::Checksum { expected, actual });
            }
            body
        }
        None => body,
    };

    let fields: Vec<&str> = body.split(',').collect();
    let kind = fields[0];
    if kind.len() != 5 {
        return Err(GpsError::Malformed("bad sentence id"));
    }
    let field = |i: usize| fields.get(i).copied().unwrap_or("");

    match kind.get(2..).unwrap_or("") {
        "RMC" => Ok(Sentence::Rmc {
            time: parse_time(field(1)),
            active: field(2) == "A",
            position: parse_position(field(3), field(4), field(5), field(6)),
            speed_knots: field(7).parse().ok(),
            course_deg: field(8).parse().ok(),
            date: NaiveDate::parse_from_str(field(9), "%d%m%y").ok(),
        }),
        "GGA" => Ok(Sentence::Gga {
            position: parse_position(field(2), field(3), field(4), field(5)),
            quality: field(6).parse().ok(),
            satellites: field(7).parse().ok(),
        }),
        other => Err(GpsError::Unsupported(other.to_string())),
    }
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H%M%S%.f").ok()
}

/// `ddmm.mmmm`/`dddmm.mmmm` plus hemisphere letters → signed decimal degrees.
fn parse_position(lat: &str, ns: &str, lon: &str, ew: &str) -> Option<(f64, f64)> {
    let lat = parse_degrees(lat)? * hemisphere_sign(ns, 'N', 'S')?;
    let lon = parse_degrees(lon)? * hemisphere_sign(ew, 'E', 'W')?;
    Some((lat, lon))
}

fn parse_degrees(s: &str) -> Option<f64> {
    let dot = s.find('.').unwrap_or(s.len());
    if dot < 3 {
        return None;
    }
    let degrees: f64 = s.get(..dot - 2)?.parse().ok()?;
    let minutes: f64 = s.get(dot - 2..)?.parse().ok()?;
    Some(degrees + minutes / 60.0)
}

fn hemisphere_sign(s: &str, positive: char, negative: char) -> Option<f64> {
    match s.chars().next()? {
        c if c == positive => Some(1.0),
        c if c == negative => Some(-1.0),
        _ => None,
    }
}

/// Folds RMC and GGA sentences into the latest fix.
#[derive(Debug, Default)]
pub struct FixTracker {
    position: Option<(f64, f64)>,
    active: bool,
    speed_kmh: Option<f64>,
    course_deg: Option<f64>,
    fix_quality: Option<u8>,
    satellites: Option<u8>,
    time: Option<DateTime<Utc>>,
}

impl FixTracker {
    pub fn update(&mut self, sentence: Sentence) {
        match sentence {
            Sentence::Rmc { time, date, active, position, speed_knots, course_deg } => {
                self.active = active;
                self.speed_kmh = speed_knots.map(|k| k * KNOTS_TO_KMH);
                self.course_deg = course_deg;
                if let (Some(date), Some(time)) = (date, time) {
                    self.time = Some(Utc.from_utc_datetime(&date.and_time(time)));
                }
                if position.is_some() {
                    self.position = position;
                }
            }
            Sentence::Gga { position, quality, satellites } => {
                self.fix_quality = quality;
                self.satellites = satellites;
                if position.is_some() {
                    self.position = position;
                }
            }
        }
    }

    /// Latest fix, if the receiver reports an active fix with a position.
    pub fn latest(&self) -> Option<GeoFix> {
        if !self.active {
            return None;
        }
        let (latitude, longitude) = self.position?;
        Some(GeoFix {
            latitude,
            longitude,
            speed_kmh: self.speed_kmh,
            course_deg: self.course_deg,
            fix_quality: self.fix_quality,
            satellites: self.satellites,
            time: self.time,
        })
    }
}

/// Background reader that keeps the latest fix from a serial NMEA stream.
///
/// The serial line must already be configured (baud rate etc.). The reader
/// thread exits at end of stream, on a read error, or after the receiver is
/// dropped and the next line arrives.
pub struct GpsReceiver {
    latest: Arc<Mutex<Option<GeoFix>>>,
    stop: Arc<AtomicBool>,
}

impl GpsReceiver {
    pub fn spawn(device: impl AsRef<Path>) -> Result<Self, GpsError> {
        let path = device.as_ref();
        let file = std::fs::File::open(path).map_err(|source| GpsError::Open {
            path: path.display().to_string(),
            source,
        })?;

        let latest = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));
        let (shared, stop_flag) = (Arc::clone(&latest), Arc::clone(&stop));
        let path_label = path.display().to_string();

        std::thread::Builder::new()
            .name("warden-gps".into())
            .spawn(move || read_loop(BufReader::new(file), &shared, &stop_flag, &path_label))
            .map_err(|source| GpsError::Open {
                path: path.display().to_string(),
                source,
            })?;

        tracing::info!(device = %path.display(), "GPS reader started");
        Ok(Self { latest, stop })
    }

    /// Latest valid fix; `None` once the reader thread has exited.
    pub fn latest(&self) -> Option<GeoFix> {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for GpsReceiver {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Clears the shared fix when the reader exits, by return or unwind.
struct ClearOnExit<'a>(&'a Mutex<Option<GeoFix>>);

impl Drop for ClearOnExit<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

fn read_loop<R: BufRead>(
    reader: R,
    latest: &Mutex<Option<GeoFix>>,
    stop: &AtomicBool,
    device: &str,
) {
    let _clear = ClearOnExit(latest);
    let mut tracker = FixTracker::default();
    for line in reader.split(b'\n') {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(device, error = %e, "GPS read failed; reader stopping");
                return;
            }
        };
        match parse_sentence(&String::from_utf8_lossy(&line)) {
            Ok(sentence) => {
                tracker.update(sentence);
                *latest.lock().unwrap_or_else(|e| e.into_inner()) = tracker.latest();
            }
            Err(GpsError::Unsupported(_)) => {}
            Err(e) => tracing::trace!(error = %e, "skipping NMEA line"),
        }
    }
    tracing::info!(device, "GPS stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

    #[test]
    fn test_parse_rmc() {
        let Sentence::Rmc { active, position, speed_knots, date, .. } = parse_sentence(RMC).unwrap()
        else {
            panic!("expected RMC");
        };
        assert!(active);
        let (lat, lon) = position.unwrap();
        assert!((lat - 48.1173).abs() < 1e-4, "lat = {lat}");
        assert!((lon - 11.516_666).abs() < 1e-4, "lon = {lon}");
        assert!((speed_knots.unwrap() - 22.4).abs() < 1e-9);
        assert_eq!(date, NaiveDate::from_ymd_opt(1994, 3, 23));
    }

    #[test]
    fn test_parse_gga() {
        let sentence = parse_sentence(GGA).unwrap();
        assert!(matches!(
            sentence,
            Sentence::Gga { quality: Some(1), satellites: Some(8), position: Some(_) }
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let bad = RMC.replace("*6A", "*6B");
        assert!(matches!(parse_sentence(&bad), Err(GpsError::Checksum { expected: 0x6B, actual: 0x6A })));
    }

    #[test]
    fn test_southern_western_hemisphere() {
        let (lat, lon) = parse_position("2612.246", "S", "02802.838", "E").unwrap();
        assert!((lat + 26.2041).abs() < 1e-4, "lat = {lat}");
        assert!((lon - 28.0473).abs() < 1e-4, "lon = {lon}");
        let (_, lon) = parse_position("2612.246", "S", "02802.838", "W").unwrap();
        assert!(lon < 0.0);
    }

    #[test]
    fn test_unsupported_and_malformed() {
        assert!(matches!(parse_sentence("$GPGSV,1,1,00"), Err(GpsError::Unsupported(_))));
        assert!(matches!(parse_sentence("GPRMC,123519"), Err(GpsError::Malformed(_))));
    }

    #[test]
    fn test_tracker_requires_active_fix() {
        let mut tracker = FixTracker::default();
        tracker.update(parse_sentence(GGA).unwrap());
        assert!(tracker.latest().is_none());

        tracker.update(parse_sentence(RMC).unwrap());
        let fix = tracker.latest().unwrap();
        assert_eq!(fix.satellites, Some(8));
        assert!((fix.speed_kmh.unwrap() - 22.4 * KNOTS_TO_KMH).abs() < 1e-9);
        assert!(fix.time.is_some());

        let void = RMC.replace(",A,", ",V,");
        let void = void.split('*').next().unwrap().to_string();
        tracker.update(parse_sentence(&void).unwrap());
        assert!(tracker.latest().is_none());
    }

    /// Reader that records the published fix at the moment the stream ends.
    struct EofSnapshot<'a> {
        data: std::io::Cursor<Vec<u8>>,
        latest: &'a Mutex<Option<GeoFix>>,
        at_eof: &'a std::cell::Cell<Option<GeoFix>>,
    }

    impl std::io::Read for EofSnapshot<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = Read::read(&mut self.data, buf)?;
            if n == 0 {
                self.at_eof.set(*self.latest.lock().unwrap());
            }
            Ok(n)
        }
    }

    fn run_stream(bytes: &[u8]) -> (Option<GeoFix>, Option<GeoFix>) {
        let latest = Mutex::new(None);
        let at_eof = std::cell::Cell::new(None);
        let reader = BufReader::new(EofSnapshot {
            data: std::io::Cursor::new(bytes.to_vec()),
            latest: &latest,
            at_eof: &at_eof,
        });
        read_loop(reader, &latest, &AtomicBool::new(false), "test");
        let after = *latest.lock().unwrap();
        (at_eof.get(), after)
    }

    #[test]
    fn test_read_loop_publishes_fix() {
        let input = format!("garbage\n{GGA}\n{RMC}\n");
        let (during, _) = run_stream(input.as_bytes());
        let fix = during.unwrap();
        assert!((fix.latitude - 48.1173).abs() < 1e-4);
    }

    #[test]
    fn test_line_noise_does_not_stop_reader() {
        let mut input = b"$GPRMC,123519,A,4\xFF.038,N,01131.000,E,022.4,084.4,230394,003.1,W\n".to_vec();
        input.extend_from_slice(RMC.as_bytes());
        input.push(b'\n');
        let (during, _) = run_stream(&input);
        let fix = during.expect("valid sentence after noise was not read");
        assert!((fix.latitude - 48.1173).abs() < 1e-4);
    }

    #[test]
    fn test_non_ascii_fields_rejected() {
        assert!(parse_degrees("4\u{FFFD}.038").is_none());
        assert!(matches!(
            parse_sentence("$GPRMC,123519,A,4\u{FFFD}.038,N,01131.000,E"),
            Err(GpsError::Malformed(_))
        ));
    }

    #[test]
    fn test_fix_cleared_when_stream_ends() {
        let input = format!("{GGA}\n{RMC}\n");
        let (during, after) = run_stream(input.as_bytes());
        assert!(during.is_some());
        assert_eq!(after, None);
    }

    #[test]
    fn test_fix_cleared_on_read_error() {
        struct Failing;
        impl std::io::Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "line dropped"))
            }
        }
        let latest = Mutex::new(Some(GeoFix::fixed(1.0, 2.0)));
        read_loop(BufReader::new(Failing), &latest, &AtomicBool::new(false), "test");
        assert_eq!(*latest.lock().unwrap(), None);
    }
}
