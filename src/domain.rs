use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// number of digits in a sensor id
const SENSOR_ID_LEN: usize = 5;

/// identifier of the remote wind sensor, e.g. "12345"
///
/// five digits with a non-zero leading digit. checked once when the config
/// is loaded and never changed afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SensorId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("wrong format of sensor ID \"{0}\", expected format = [1-9][0-9]{{4}}")]
pub struct InvalidSensorId(pub String);

impl SensorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SensorId {
    type Err = InvalidSensorId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let well_formed = bytes.len() == SENSOR_ID_LEN
            && bytes.iter().all(u8::is_ascii_digit)
            && bytes[0] != b'0';

        if well_formed {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidSensorId(s.to_string()))
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// the two cached documents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Averages,
    History,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Averages, Slot::History];

    pub fn description(self) -> &'static str {
        match self {
            Slot::Averages => "averages",
            Slot::History => "history",
        }
    }
}

/// remote urls of the two slots, derived from base url + sensor id
#[derive(Clone, Debug)]
pub struct SensorEndpoints {
    pub averages: String,
    pub history: String,
}

impl SensorEndpoints {
    pub fn new(base_url: &str, sensor_id: &SensorId) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            averages: format!("{}/windsensor/{}", base, sensor_id),
            history: format!("{}/windsensor/history/{}", base, sensor_id),
        }
    }

    pub fn url(&self, slot: Slot) -> &str {
        match slot {
            Slot::Averages => &self.averages,
            Slot::History => &self.history,
        }
    }
}

/// static process identity served by /info
#[derive(Clone, Debug, Serialize)]
pub struct ServerInfo {
    /// crate version
    pub version: String,
    /// process start, rfc 3339 utc with milliseconds
    pub start: String,
}

impl ServerInfo {
    pub fn capture() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            start: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_id_accepts_five_digits() {
        let id: SensorId = "12345".parse().unwrap();
        assert_eq!(id.as_str(), "12345");
    }

    #[test]
    fn test_sensor_id_rejects_bad_shapes() {
        for bad in ["", "01234", "1234", "123456", "12a45", " 1234", "١٢٣٤٥"] {
            assert!(bad.parse::<SensorId>().is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_endpoints_follow_remote_layout() {
        let id: SensorId = "40001".parse().unwrap();
        let endpoints = SensorEndpoints::new("https://sensors.example.org/", &id);
        assert_eq!(endpoints.url(Slot::Averages), "https://sensors.example.org/windsensor/40001");
        assert_eq!(endpoints.url(Slot::History), "https://sensors.example.org/windsensor/history/40001");
    }

    #[test]
    fn test_server_info_start_is_utc_millis() {
        let info = ServerInfo::capture();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(info.start.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&info.start).is_ok());
    }
}
