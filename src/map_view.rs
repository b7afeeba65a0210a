use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use log::{debug, info, warn};
use reqwest::Url;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use crate::error::FetchError;
use crate::gateway::BackendGateway;
use crate::gateway::models::{display_category, ReportQuery, StoredReport};
use crate::geolocation::Coordinates;
use crate::util::escape_html;


pub const DEFAULT_CENTER: Coordinates = Coordinates { latitude: 27.7172, longitude: 85.324 };
pub const DEFAULT_ZOOM: u8 = 13;

const TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
const TILE_ATTRIBUTION: &str = "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors";
const NO_DESCRIPTION: &str = "No description provided.";
const UNKNOWN_CATEGORY: &str = "Unknown type";
const UNKNOWN_TIME: &str = "Unknown time";
const TIME_FORMAT: &str = "%b %-d, %Y %H:%M";
const THUMBNAIL_WIDTH: u32 = 150;


#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub report_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Popup markup, already escaped.
    pub popup: String,
}

impl Marker {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "id": self.report_id,
            "latitude": self.latitude,
            "longitude": self.longitude,
            "popup": self.popup,
        })
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MarkerError {
    #[error("missing or non-numeric {0}")]
    BadCoordinate(&'static str),
    #[error("coordinates out of range")]
    OutOfRange,
}

pub fn build_marker(report: &StoredReport) -> Result<Marker, MarkerError> {
    let latitude = report.latitude.ok_or(MarkerError::BadCoordinate("latitude"))?;
    let longitude = report.longitude.ok_or(MarkerError::BadCoordinate("longitude"))?;

    if !Coordinates::new(latitude, longitude).is_valid() {
        return Err(MarkerError::OutOfRange);
    }

    Ok(Marker {
        report_id: report.id.clone(),
        latitude,
        longitude,
        popup: render_popup(report),
    })
}

fn render_popup(report: &StoredReport) -> String {
    let category = display_category(report.pollution_type.trim());
    let category = if category.trim().is_empty() {
        UNKNOWN_CATEGORY
    }
    else {
        category.trim()
    };

    let description = report.description.trim();
    let description = if description.is_empty() {
        NO_DESCRIPTION
    }
    else {
        description
    };

    let mut html = String::from("<div class=\"report-popup\">");
    html.push_str(&format!("<strong>{}</strong>", escape_html(category)));
    html.push_str(&format!("<p>{}</p>", escape_html(description)));

    if let Some(url) = report.image_url.as_deref().filter(|url| is_web_url(url)) {
        let url = escape_html(url);
        html.push_str(&format!(
            "<a href=\"{0}\" target=\"_blank\" rel=\"noopener noreferrer\">\
             <img src=\"{0}\" alt=\"Report photo\" width=\"{1}\"></a>",
            url, THUMBNAIL_WIDTH
        ));
    }

    html.push_str(&format!("<small>{}</small></div>", format_timestamp(report.created_at.as_ref())));
    html
}

fn is_web_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => true,
        _ => {
            warn!("Drop image URL with an unsupported scheme: {}", url);
            false
        },
    }
}

fn format_timestamp(time: Option<&DateTime<FixedOffset>>) -> String {
    match time {
        Some(time) => time.format(TIME_FORMAT).to_string(),
        None => UNKNOWN_TIME.to_owned(),
    }
}


#[derive(Debug, Clone, PartialEq)]
pub struct TileLayer {
    pub url_template: String,
    pub attribution: String,
}

impl TileLayer {
    fn open_street_map() -> Self {
        TileLayer {
            url_template: TILE_URL.to_owned(),
            attribution: TILE_ATTRIBUTION.to_owned(),
        }
    }
}


/// Overlay holding every marker on the map.
#[derive(Debug, Default)]
pub struct MarkerLayer {
    markers: Vec<Marker>,
}

impl MarkerLayer {
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    fn clear(&mut self) {
        self.markers.clear();
    }

    fn add(&mut self, marker: Marker) {
        self.markers.push(marker);
    }
}


#[derive(Debug)]
pub struct MapWidget {
    pub center: Coordinates,
    pub zoom: u8,
    pub tiles: TileLayer,
    pub markers: MarkerLayer,
}

impl MapWidget {
    fn new() -> Self {
        MapWidget {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            tiles: TileLayer::open_street_map(),
            markers: MarkerLayer::default(),
        }
    }

    fn to_json(&self) -> JsonValue {
        json!({
            "center": [self.center.latitude, self.center.longitude],
            "zoom": self.zoom,
            "tile_layer": {
                "url": self.tiles.url_template,
                "attribution": self.tiles.attribution,
            },
            "markers": self.markers.markers().iter().map(Marker::to_json).collect::<Vec<_>>(),
            "size": self.markers.len(),
        })
    }
}


/// The report map: one widget, refreshed wholesale from the backend.
pub struct MapView {
    gateway: Arc<dyn BackendGateway>,
    widget: Option<MapWidget>,
    last_error: Option<FetchError>,
}

impl MapView {
    pub fn new(gateway: Arc<dyn BackendGateway>) -> Self {
        MapView {
            gateway,
            widget: None,
            last_error: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.widget.is_some()
    }

    pub fn widget(&self) -> Option<&MapWidget> {
        self.widget.as_ref()
    }

    /// Creates the widget and loads the reports.
    ///
    /// Calling this on an initialized map does nothing. A failed first load
    /// still leaves the map initialized.
    pub fn initialize(&mut self) -> Result<(), FetchError> {
        if self.widget.is_some() {
            debug!("Map is already initialized");
            return Ok(());
        }

        self.widget = Some(MapWidget::new());
        info!("Map initialized");

        self.refresh().map(|_| ())
    }

    /// Rebuilds every marker from a fresh report list.
    ///
    /// Returns the number of markers shown. On a fetch failure the current
    /// markers are kept.
    pub fn refresh(&mut self) -> Result<usize, FetchError> {
        let widget = match self.widget.as_mut() {
            Some(widget) => widget,
            None => {
                warn!("Map refresh requested before initialization");
                return Ok(0);
            },
        };

        let reports = match self.gateway.list_reports(&ReportQuery::recent()) {
            Ok(reports) => reports,
            Err(err) => {
                warn!("Fail to load reports: {}", err);
                self.last_error = Some(err.clone());
                return Err(err);
            },
        };

        widget.markers.clear();

        let mut skipped = 0;
        for report in &reports {
            match build_marker(report) {
                Ok(marker) => widget.markers.add(marker),
                Err(err) => {
                    skipped += 1;
                    warn!("Skip report {}: {}", report.id.as_deref().unwrap_or("<no id>"), err);
                },
            }
        }

        if skipped > 0 {
            info!("Rendered {} of {} reports", widget.markers.len(), reports.len());
        }

        self.last_error = None;
        Ok(widget.markers.len())
    }

    pub fn markers(&self) -> &[Marker] {
        self.widget.as_ref()
            .map(|widget| widget.markers.markers())
            .unwrap_or(&[])
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    /// Releases the widget. Safe to call repeatedly; `initialize` works again afterwards.
    pub fn teardown(&mut self) {
        if self.widget.take().is_some() {
            debug!("Map released");
        }
        self.last_error = None;
    }

    pub fn to_json(&self) -> JsonValue {
        let error = self.last_error.as_ref().map(|err| err.to_string());

        match &self.widget {
            Some(widget) => {
                let mut map = widget.to_json();
                map["initialized"] = json!(true);
                map["error"] = json!(error);
                map
            },
            None => json!({
                "initialized": false,
                "markers": [],
                "size": 0,
                "error": error,
            }),
        }
    }
}

impl Drop for MapView {
    fn drop(&mut self) {
        self.teardown();
    }
}
