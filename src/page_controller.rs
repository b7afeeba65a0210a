use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use log::{info, warn};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use crate::error::{InsertError, UploadError};
use crate::gateway::BackendGateway;
use crate::gateway::models::NewReport;
use crate::map_view::MapView;
use crate::report_form::{FormError, ReportForm, SubmittedReport};
use crate::util;


pub const STATUS_DURATION: Duration = Duration::from_secs(7);

const SUBMIT_SUCCESS: &str = "Report submitted successfully!";


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

impl StatusKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusKind::Info => "info",
            StatusKind::Success => "success",
            StatusKind::Error => "error",
        }
    }
}


#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
    posted_time: Instant,
}


/// The page's one status line. A new message replaces the old one.
#[derive(Debug)]
pub struct StatusSlot {
    message: Option<StatusMessage>,
    duration: Duration,
}

impl StatusSlot {
    pub fn new(duration: Duration) -> Self {
        StatusSlot {
            message: None,
            duration,
        }
    }

    pub fn post<T: Into<String>>(&mut self, kind: StatusKind, text: T) {
        self.message = Some(StatusMessage {
            kind,
            text: text.into(),
            posted_time: Instant::now(),
        });
    }

    /// The message, unless it has expired.
    pub fn current(&self) -> Option<&StatusMessage> {
        self.message.as_ref()
            .filter(|m| m.posted_time.elapsed() < self.duration)
    }

    pub fn to_json(&self) -> JsonValue {
        match self.current() {
            Some(m) => {
                let left = self.duration.checked_sub(m.posted_time.elapsed())
                    .unwrap_or_default();

                json!({
                    "kind": m.kind.as_str(),
                    "message": m.text,
                    "dismiss_after_ms": left.as_millis() as u64,
                })
            },
            None => json!({
                "kind": null,
                "message": null,
            }),
        }
    }
}


#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Please attach a photo of the pollution to submit a report.")]
    ImageRequired,
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Insert(#[from] InsertError),
}


/// Ties the report form to the backend and the map.
pub struct PageController {
    gateway: Arc<dyn BackendGateway>,
    map: MapView,
    status: StatusSlot,
    require_image: bool,
}

impl PageController {
    pub fn new(gateway: Arc<dyn BackendGateway>, require_image: bool) -> Self {
        PageController {
            map: MapView::new(gateway.clone()),
            gateway,
            status: StatusSlot::new(STATUS_DURATION),
            require_image,
        }
    }

    pub fn with_status_duration(mut self, duration: Duration) -> Self {
        self.status = StatusSlot::new(duration);
        self
    }

    pub fn map(&self) -> &MapView {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut MapView {
        &mut self.map
    }

    pub fn status(&self) -> &StatusSlot {
        &self.status
    }

    pub fn submit_form(&mut self, form: &mut ReportForm) -> Result<(), FormError> {
        form.submit(|report| self.handle_submission(report))
    }

    /// Upload, insert, then refresh. Stops at the first failure.
    pub fn handle_submission(&mut self, report: SubmittedReport<'_>) -> Result<(), SubmitError> {
        if let Err(err) = self.persist(&report) {
            warn!("Fail to submit report: {}", err);

            let kind = match err {
                SubmitError::ImageRequired => StatusKind::Info,
                _ => StatusKind::Error,
            };
            self.status.post(kind, err.to_string());

            return Err(err);
        }

        if let Err(err) = self.map.refresh() {
            warn!("Report saved but the map was not refreshed: {}", err);
        }

        self.status.post(StatusKind::Success, SUBMIT_SUCCESS);
        Ok(())
    }

    fn persist(&self, report: &SubmittedReport<'_>) -> Result<(), SubmitError> {
        let image_url = match report.image {
            Some(image) => {
                let path = util::object_key(Utc::now().timestamp_millis(), &image.extension());
                let url = self.gateway.upload_image(&path, &image.media_type, &image.bytes)?;
                info!("Uploaded report image to {}", path);
                url
            },
            None if self.require_image => return Err(SubmitError::ImageRequired),
            None => None,
        };

        self.gateway.insert_report(&NewReport {
            latitude: report.coordinates.latitude,
            longitude: report.coordinates.longitude,
            pollution_type: report.pollution_type,
            description: report.description.clone(),
            image_url,
        })?;

        info!("Saved a {} report", report.pollution_type);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use crate::error::ValidationError;
    use crate::gateway::memory::MemoryGateway;
    use crate::geolocation::Coordinates;
    use crate::report_form::{FormState, ImageFile};

    fn setup(require_image: bool) -> (Arc<MemoryGateway>, PageController) {
        let gateway = Arc::new(MemoryGateway::new());
        let backend: Arc<dyn BackendGateway> = gateway.clone();
        let mut page = PageController::new(backend, require_image);
        page.map_mut().initialize().unwrap();
        (gateway, page)
    }

    fn form_with_image() -> ReportForm {
        let mut form = ReportForm::new();
        form.select_pollution_type("Sewage Leak").unwrap();
        form.set_description("x").unwrap();
        form.set_coordinates(Coordinates::new(27.7, 85.3)).unwrap();
        form.select_image(Some(ImageFile::new("drain.jpg", "image/jpeg", vec![7, 7, 7]))).unwrap();
        form
    }

    #[test]
    fn submission_uploads_inserts_and_refreshes() {
        let (gateway, mut page) = setup(true);

        let mut form = form_with_image();
        page.submit_form(&mut form).unwrap();

        let keys = gateway.object_keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("public/"));
        assert!(keys[0].ends_with(".jpg"));
        assert_eq!(gateway.object(&keys[0]), Some(("image/jpeg".to_owned(), vec![7, 7, 7])));

        let rows = gateway.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["pollution_type"], "Sewage Leak");
        assert_eq!(rows[0]["description"], "x");
        assert_eq!(rows[0]["image_url"], format!("https://storage.test/public/{}", keys[0]));

        let markers = page.map().markers();
        assert_eq!(markers.len(), 1);
        assert!(markers[0].popup.contains("Sewage Leak"));

        let status = page.status().current().unwrap();
        assert_eq!(status.kind, StatusKind::Success);
        assert_eq!(status.text, SUBMIT_SUCCESS);
        assert_eq!(form.state(), FormState::Idle);
        assert_eq!(form.description(), "");
    }

    #[test]
    fn upload_without_public_url_inserts_a_null_image() {
        let (gateway, mut page) = setup(true);
        gateway.hide_public_urls();

        page.submit_form(&mut form_with_image()).unwrap();

        assert!(gateway.rows()[0]["image_url"].is_null());
    }

    #[test]
    fn upload_failure_stops_before_insert() {
        let (gateway, mut page) = setup(true);
        gateway.fail_uploads("Payload too large");
        let fetches = gateway.fetch_count();

        let mut form = form_with_image();
        let err = page.submit_form(&mut form).unwrap_err();

        assert_eq!(err.to_string(), "Image upload failed: Payload too large");
        assert_eq!(gateway.insert_count(), 0);
        assert_eq!(gateway.fetch_count(), fetches);

        let status = page.status().current().unwrap();
        assert_eq!(status.kind, StatusKind::Error);
        assert_eq!(status.text, "Image upload failed: Payload too large");
        assert_eq!(form.message(), Some("Image upload failed: Payload too large"));
        assert_eq!(form.description(), "x");
    }

    #[test]
    fn insert_failure_stops_before_refresh() {
        let (gateway, mut page) = setup(true);
        gateway.fail_inserts("new row violates row-level security policy");
        let fetches = gateway.fetch_count();

        let err = page.submit_form(&mut form_with_image()).unwrap_err();

        assert_eq!(
            err.to_string(),
            "Failed to save report: new row violates row-level security policy"
        );
        assert_eq!(gateway.upload_count(), 1);
        assert_eq!(gateway.fetch_count(), fetches);
        assert!(page.map().markers().is_empty());
        assert_eq!(page.status().current().unwrap().kind, StatusKind::Error);
    }

    #[test]
    fn refresh_failure_after_insert_still_counts_as_success() {
        let (gateway, mut page) = setup(true);
        gateway.fail_fetches("timeout");

        page.submit_form(&mut form_with_image()).unwrap();

        assert_eq!(gateway.rows().len(), 1);
        assert_eq!(page.status().current().unwrap().kind, StatusKind::Success);
        assert!(page.map().last_error().is_some());
    }

    #[test]
    fn reports_without_a_photo_are_not_saved_by_default() {
        let (gateway, mut page) = setup(true);
        let mut form = form_with_image();
        form.select_image(None).unwrap();

        let err = page.submit_form(&mut form).unwrap_err();

        assert_eq!(err.to_string(), SubmitError::ImageRequired.to_string());
        assert_eq!(gateway.upload_count() + gateway.insert_count(), 0);
        assert_eq!(page.status().current().unwrap().kind, StatusKind::Info);
    }

    #[test]
    fn reports_without_a_photo_are_saved_when_allowed() {
        let (gateway, mut page) = setup(false);
        let mut form = form_with_image();
        form.select_image(None).unwrap();

        page.submit_form(&mut form).unwrap();

        assert_eq!(gateway.upload_count(), 0);
        assert!(gateway.rows()[0]["image_url"].is_null());

        let markers = page.map().markers();
        assert_eq!(markers.len(), 1);
        assert!(markers[0].popup.contains("Sewage Leak"));
        assert!(markers[0].popup.contains("<p>x</p>"));
    }

    #[test]
    fn invalid_drafts_never_touch_the_backend() {
        let (gateway, mut page) = setup(false);
        let calls = gateway.call_count();

        let mut form = form_with_image();
        form.set_description("  \t ").unwrap();
        assert!(matches!(
            page.submit_form(&mut form),
            Err(FormError::Validation(ValidationError::MissingFields))
        ));

        let mut form = form_with_image();
        form.set_latitude("123").unwrap();
        assert!(matches!(
            page.submit_form(&mut form),
            Err(FormError::Validation(ValidationError::InvalidLocation))
        ));

        assert_eq!(gateway.call_count(), calls);
        assert!(page.status().current().is_none());
    }

    #[test]
    fn status_message_expires() {
        let gateway: Arc<dyn BackendGateway> = Arc::new(MemoryGateway::new());
        let mut page = PageController::new(gateway, true)
            .with_status_duration(Duration::from_millis(30));
        page.map_mut().initialize().unwrap();

        page.submit_form(&mut form_with_image()).unwrap();
        assert!(page.status().current().is_some());
        assert_eq!(page.status().to_json()["kind"], "success");

        thread::sleep(Duration::from_millis(60));
        assert!(page.status().current().is_none());
        assert!(page.status().to_json()["kind"].is_null());
    }

    #[test]
    fn default_status_lasts_seven_seconds() {
        let mut slot = StatusSlot::new(STATUS_DURATION);
        slot.post(StatusKind::Info, "hello");

        let json = slot.to_json();
        assert_eq!(json["message"], "hello");
        assert!(json["dismiss_after_ms"].as_u64().unwrap() <= 7000);
        assert!(json["dismiss_after_ms"].as_u64().unwrap() > 6000);
    }
}
