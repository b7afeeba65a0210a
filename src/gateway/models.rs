use std::{fmt, str::FromStr};

use chrono::{DateTime, FixedOffset};
use serde_json::{json, Value as JsonValue};

use crate::error::ValidationError;


/// Most reports the map ever shows at once.
pub const REPORT_PAGE_SIZE: usize = 500;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollutionType {
    TrashDump,
    SewageLeak,
    AirPollution,
    WaterPollution,
    IndustrialWaste,
    Other,
}

impl PollutionType {
    pub const ALL: [PollutionType; 6] = [
        PollutionType::TrashDump,
        PollutionType::SewageLeak,
        PollutionType::AirPollution,
        PollutionType::WaterPollution,
        PollutionType::IndustrialWaste,
        PollutionType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PollutionType::TrashDump => "Trash Dump",
            PollutionType::SewageLeak => "Sewage Leak",
            PollutionType::AirPollution => "Air Pollution",
            PollutionType::WaterPollution => "Water Pollution",
            PollutionType::IndustrialWaste => "Industrial Waste",
            PollutionType::Other => "Other",
        }
    }
}

impl Default for PollutionType {
    fn default() -> Self {
        PollutionType::TrashDump
    }
}

impl fmt::Display for PollutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PollutionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = display_category(s.trim());

        PollutionType::ALL.iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| ValidationError::UnknownCategory(s.to_owned()))
    }
}

/// Category text as shown to people: separators become spaces.
pub fn display_category(raw: &str) -> String {
    raw.replace(|c: char| c == '_' || c == '-', " ")
}


/// Row written by a submission. `id` and `created_at` are assigned by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub latitude: f64,
    pub longitude: f64,
    pub pollution_type: PollutionType,
    pub description: String,
    pub image_url: Option<String>,
}

impl NewReport {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "latitude": self.latitude,
            "longitude": self.longitude,
            "pollution_type": self.pollution_type.as_str(),
            "description": self.description,
            "image_url": self.image_url,
        })
    }
}


/// Row read back from the backend.
///
/// Every field is decoded leniently; a record with a broken coordinate still
/// decodes and is filtered out when markers are built.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    pub id: Option<String>,
    pub created_at: Option<DateTime<FixedOffset>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub pollution_type: String,
    pub description: String,
    pub image_url: Option<String>,
}

impl StoredReport {
    pub fn from_json(row: &JsonValue) -> Self {
        let id = match &row["id"] {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        };

        StoredReport {
            id,
            created_at: row["created_at"].as_str()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok()),
            latitude: read_coordinate(&row["latitude"]),
            longitude: read_coordinate(&row["longitude"]),
            pollution_type: row["pollution_type"].as_str().unwrap_or("").to_owned(),
            description: row["description"].as_str().unwrap_or("").to_owned(),
            image_url: row["image_url"].as_str()
                .filter(|url| !url.trim().is_empty())
                .map(str::to_owned),
        }
    }
}

fn read_coordinate(value: &JsonValue) -> Option<f64> {
    let number = match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    number.filter(|v| v.is_finite())
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportQuery {
    pub limit: usize,
    pub newest_first: bool,
}

impl ReportQuery {
    /// The map's query: newest reports first, one page.
    pub fn recent() -> Self {
        ReportQuery {
            limit: REPORT_PAGE_SIZE,
            newest_first: true,
        }
    }
}

impl Default for ReportQuery {
    fn default() -> Self {
        ReportQuery::recent()
    }
}
