//! Deterministic flight status derivation
//!
//! Oracles never talk to each other. Every oracle assigned the same index
//! reports the same status because the status is a pure function of the index.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every value `derive_status_code` can produce
pub const STATUS_CODES: [u8; 6] = [0, 10, 20, 30, 40, 50];

/// Map a request index to its status code: `(index mod 6) * 10`, floor semantics.
pub fn derive_status_code(index: i64) -> u8 {
    // rem_euclid keeps negative inputs in 0..6
    (index.rem_euclid(6) * 10) as u8
}

/// Named flight statuses as understood by the FlightSurety contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    Unknown,
    OnTime,
    LateAirline,
    LateWeather,
    LateTechnical,
    LateOther,
}

impl FlightStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FlightStatus::Unknown),
            10 => Some(FlightStatus::OnTime),
            20 => Some(FlightStatus::LateAirline),
            30 => Some(FlightStatus::LateWeather),
            40 => Some(FlightStatus::LateTechnical),
            50 => Some(FlightStatus::LateOther),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            FlightStatus::Unknown => 0,
            FlightStatus::OnTime => 10,
            FlightStatus::LateAirline => 20,
            FlightStatus::LateWeather => 30,
            FlightStatus::LateTechnical => 40,
            FlightStatus::LateOther => 50,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FlightStatus::Unknown => "Unknown",
            FlightStatus::OnTime => "On time",
            FlightStatus::LateAirline => "Late (airline)",
            FlightStatus::LateWeather => "Late (weather)",
            FlightStatus::LateTechnical => "Late (technical)",
            FlightStatus::LateOther => "Late (other)",
        }
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
