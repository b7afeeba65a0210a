use std::{
    sync::mpsc::{Receiver, RecvTimeoutError},
    time::{Duration, Instant},
};

use log::debug;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;


pub const LOCATION_TIMEOUT: Duration = Duration::from_secs(10);


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinates { latitude, longitude }
    }

    /// Finite and inside [-90, 90] x [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}


/// Settings of one position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    /// How old a position may be and still be accepted.
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        PositionOptions {
            enable_high_accuracy: true,
            timeout: LOCATION_TIMEOUT,
            maximum_age: Duration::from_secs(0),
        }
    }
}

impl PositionOptions {
    /// Shape expected by `navigator.geolocation.getCurrentPosition`.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "enableHighAccuracy": self.enable_high_accuracy,
            "timeout": self.timeout.as_millis() as u64,
            "maximumAge": self.maximum_age.as_millis() as u64,
        })
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location permission denied. Please allow location access or enter the coordinates manually.")]
    PermissionDenied,
    #[error("Location information is unavailable.")]
    PositionUnavailable,
    #[error("The request to get your location timed out.")]
    Timeout,
    #[error("Geolocation is not supported by this browser.")]
    Unsupported,
    #[error("An unknown error occurred while getting your location.")]
    Unknown,
}

impl LocationError {
    /// Maps a `GeolocationPositionError.code`.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => LocationError::PermissionDenied,
            2 => LocationError::PositionUnavailable,
            3 => LocationError::Timeout,
            _ => LocationError::Unknown,
        }
    }
}


pub trait GeolocationProvider {
    /// One position request. Never a continuous watch.
    fn acquire_location(&self, options: &PositionOptions) -> Result<Coordinates, LocationError>;
}


/// Result of a `getCurrentPosition` call made by a browser and posted back.
///
/// The browser applies the [`PositionOptions`] itself, so they are not
/// consulted again here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BrowserFix {
    Position(Coordinates),
    Failed(u16),
    Unsupported,
}

impl GeolocationProvider for BrowserFix {
    fn acquire_location(&self, _: &PositionOptions) -> Result<Coordinates, LocationError> {
        match *self {
            BrowserFix::Position(coords) if coords.is_valid() => Ok(coords),
            BrowserFix::Position(_) => Err(LocationError::PositionUnavailable),
            BrowserFix::Failed(code) => Err(LocationError::from_code(code)),
            BrowserFix::Unsupported => Err(LocationError::Unsupported),
        }
    }
}


/// A position reported by a device, stamped when it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub coordinates: Coordinates,
    pub taken_at: Instant,
}

impl Fix {
    pub fn now(coordinates: Coordinates) -> Self {
        Fix {
            coordinates,
            taken_at: Instant::now(),
        }
    }
}


/// Reads positions from a device feed such as a GPS receiver thread.
///
/// For hosts with their own positioning hardware. The web server takes
/// positions from the browser through [`BrowserFix`] instead.
pub struct DeviceLocator {
    feed: Option<Receiver<Result<Fix, LocationError>>>,
}

impl DeviceLocator {
    pub fn new(feed: Receiver<Result<Fix, LocationError>>) -> Self {
        DeviceLocator { feed: Some(feed) }
    }

    /// A host without any location hardware.
    pub fn unavailable() -> Self {
        DeviceLocator { feed: None }
    }
}

impl GeolocationProvider for DeviceLocator {
    fn acquire_location(&self, options: &PositionOptions) -> Result<Coordinates, LocationError> {
        let feed = self.feed.as_ref().ok_or(LocationError::Unsupported)?;

        let requested_at = Instant::now();
        let deadline = requested_at + options.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());

            match feed.recv_timeout(remaining) {
                Ok(Ok(fix)) => {
                    if fix.taken_at + options.maximum_age < requested_at {
                        debug!("Skip a cached position fix");
                        continue;
                    }
                    return Ok(fix.coordinates);
                },
                Ok(Err(err)) => return Err(err),
                Err(RecvTimeoutError::Timeout) => return Err(LocationError::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Err(LocationError::PositionUnavailable),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::mpsc, thread};

    fn short_timeout() -> PositionOptions {
        PositionOptions {
            timeout: Duration::from_millis(50),
            ..PositionOptions::default()
        }
    }

    #[test]
    fn default_options_request_a_fresh_accurate_fix() {
        let options = PositionOptions::default();

        assert!(options.enable_high_accuracy);
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.maximum_age, Duration::from_secs(0));
        assert_eq!(
            options.to_json(),
            json!({ "enableHighAccuracy": true, "timeout": 10000, "maximumAge": 0 })
        );
    }

    #[test]
    fn browser_codes_map_to_error_kinds() {
        assert_eq!(LocationError::from_code(1), LocationError::PermissionDenied);
        assert_eq!(LocationError::from_code(2), LocationError::PositionUnavailable);
        assert_eq!(LocationError::from_code(3), LocationError::Timeout);
        assert_eq!(LocationError::from_code(7), LocationError::Unknown);
    }

    #[test]
    fn browser_fix_reports_its_outcome() {
        let options = PositionOptions::default();

        assert_eq!(
            BrowserFix::Position(Coordinates::new(27.7, 85.3)).acquire_location(&options),
            Ok(Coordinates::new(27.7, 85.3))
        );
        assert_eq!(
            BrowserFix::Position(Coordinates::new(95.0, 85.3)).acquire_location(&options),
            Err(LocationError::PositionUnavailable)
        );
        assert_eq!(BrowserFix::Failed(3).acquire_location(&options), Err(LocationError::Timeout));
        assert_eq!(BrowserFix::Unsupported.acquire_location(&options), Err(LocationError::Unsupported));
    }

    #[test]
    fn device_locator_times_out_without_a_fix() {
        let (_sender, feed) = mpsc::channel();
        let locator = DeviceLocator::new(feed);

        assert_eq!(locator.acquire_location(&short_timeout()), Err(LocationError::Timeout));
    }

    #[test]
    fn device_locator_skips_fixes_taken_before_the_request() {
        let (sender, feed) = mpsc::channel();
        let locator = DeviceLocator::new(feed);

        sender.send(Ok(Fix::now(Coordinates::new(1.0, 1.0)))).unwrap();
        thread::sleep(Duration::from_millis(5));

        let fresh_sender = sender.clone();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            fresh_sender.send(Ok(Fix::now(Coordinates::new(27.7172, 85.324)))).unwrap();
        });

        let options = PositionOptions {
            timeout: Duration::from_secs(2),
            ..PositionOptions::default()
        };
        assert_eq!(locator.acquire_location(&options), Ok(Coordinates::new(27.7172, 85.324)));
        producer.join().unwrap();
    }

    #[test]
    fn device_locator_passes_device_errors_through() {
        let (sender, feed) = mpsc::channel();
        sender.send(Err(LocationError::PermissionDenied)).unwrap();

        let locator = DeviceLocator::new(feed);
        assert_eq!(locator.acquire_location(&short_timeout()), Err(LocationError::PermissionDenied));

        drop(sender);
        assert_eq!(locator.acquire_location(&short_timeout()), Err(LocationError::PositionUnavailable));
    }

    #[test]
    fn missing_hardware_is_unsupported() {
        assert_eq!(
            DeviceLocator::unavailable().acquire_location(&short_timeout()),
            Err(LocationError::Unsupported)
        );
    }
}
