use std::{
    collections::HashSet,
    fmt,
    path::Path,
    sync::{Arc, Mutex},
};

use thiserror::Error;

use crate::error::{InvalidFileError, ValidationError};
use crate::gateway::models::PollutionType;
use crate::geolocation::{Coordinates, GeolocationProvider, LocationError, PositionOptions};
use crate::util;


const MAX_EXTENSION_LEN: usize = 8;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormState {
    Idle,
    Validating,
    Submitting,
}


/// A file picked by the user, held locally until submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new<N: Into<String>, M: Into<String>>(name: N, media_type: M, bytes: Vec<u8>) -> Self {
        ImageFile {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Reads a `data:<media type>;base64,<payload>` URI.
    pub fn from_data_uri(name: &str, uri: &str) -> Result<Self, InvalidFileError> {
        let (header, payload) = uri.strip_prefix("data:")
            .and_then(|rest| rest.split_once(','))
            .ok_or_else(|| InvalidFileError { media_type: String::new() })?;

        let mut params = header.split(';');
        let media_type = params.next().unwrap_or("").trim().to_owned();

        if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(InvalidFileError { media_type });
        }

        match base64::decode(payload.trim()) {
            Ok(bytes) => Ok(ImageFile::new(name, media_type, bytes)),
            Err(_) => Err(InvalidFileError { media_type }),
        }
    }

    pub fn is_image(&self) -> bool {
        self.media_type.trim().to_ascii_lowercase().starts_with("image/")
    }

    /// Extension for the stored object: the file name's, else the media subtype.
    ///
    /// Only short alphanumeric candidates are used, so the object key stays a
    /// plain path segment.
    pub fn extension(&self) -> String {
        let from_name = Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| is_plain_extension(ext));

        let from_type = || {
            self.media_type.split('/')
                .nth(1)
                .and_then(|subtype| subtype.split(|c: char| c == ';' || c == '+').next())
                .map(str::trim)
                .filter(|subtype| is_plain_extension(subtype))
        };

        from_name.or_else(from_type)
            .unwrap_or("bin")
            .to_ascii_lowercase()
    }
}


/// Hands out object URLs for local image previews and tracks which are live.
///
/// For hosts that render the form themselves. The HTTP routes receive the
/// photo as a data URI and build their forms without previews.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    live: Arc<Mutex<HashSet<String>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        PreviewRegistry::default()
    }

    pub fn create(&self) -> PreviewUrl {
        let url = format!("blob:preview/{}", util::generate_rand_id(16));
        if let Ok(mut live) = self.live.lock() {
            live.insert(url.clone());
        }

        PreviewUrl {
            url,
            registry: self.clone(),
        }
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.live.lock().map(|live| live.contains(url)).unwrap_or(false)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or(0)
    }

    fn revoke(&self, url: &str) {
        if let Ok(mut live) = self.live.lock() {
            live.remove(url);
        }
    }
}

/// A live preview URL. Revoked when dropped.
#[derive(Debug)]
pub struct PreviewUrl {
    url: String,
    registry: PreviewRegistry,
}

impl PreviewUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl Drop for PreviewUrl {
    fn drop(&mut self) {
        self.registry.revoke(&self.url);
    }
}


#[derive(Debug, Error)]
pub enum FormError {
    #[error("A report is already being submitted.")]
    Busy,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    InvalidFile(#[from] InvalidFileError),
    #[error(transparent)]
    Location(#[from] LocationError),
    #[error("{0}")]
    Rejected(String),
}


/// Validated snapshot handed to the submit callback.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedReport<'a> {
    pub pollution_type: PollutionType,
    pub description: String,
    pub coordinates: Coordinates,
    pub image: Option<&'a ImageFile>,
}


/// Draft of one report plus the transient state of the form editing it.
///
/// Every mutator fails with [`FormError::Busy`] while a submission runs.
#[derive(Debug)]
pub struct ReportForm {
    pollution_type: PollutionType,
    description: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    image: Option<ImageFile>,
    preview: Option<PreviewUrl>,
    previews: Option<PreviewRegistry>,
    state: FormState,
    message: Option<String>,
}

impl Default for ReportForm {
    fn default() -> Self {
        ReportForm::new()
    }
}

impl ReportForm {
    pub fn new() -> Self {
        ReportForm {
            pollution_type: PollutionType::default(),
            description: String::new(),
            latitude: None,
            longitude: None,
            image: None,
            preview: None,
            previews: None,
            state: FormState::Idle,
            message: None,
        }
    }

    /// A form that creates a preview URL for every selected image.
    pub fn with_previews(previews: PreviewRegistry) -> Self {
        ReportForm {
            previews: Some(previews),
            ..ReportForm::new()
        }
    }

    pub fn state(&self) -> FormState {
        self.state
    }

    pub fn is_disabled(&self) -> bool {
        self.state == FormState::Submitting
    }

    /// Last error shown by the form, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn pollution_type(&self) -> PollutionType {
        self.pollution_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn latitude(&self) -> Option<f64> {
        self.latitude
    }

    pub fn longitude(&self) -> Option<f64> {
        self.longitude
    }

    pub fn image(&self) -> Option<&ImageFile> {
        self.image.as_ref()
    }

    pub fn preview_url(&self) -> Option<&str> {
        self.preview.as_ref().map(PreviewUrl::as_str)
    }

    fn ensure_editable(&self) -> Result<(), FormError> {
        if self.is_disabled() {
            Err(FormError::Busy)
        }
        else {
            Ok(())
        }
    }

    pub fn set_pollution_type(&mut self, pollution_type: PollutionType) -> Result<(), FormError> {
        self.ensure_editable()?;
        self.pollution_type = pollution_type;
        Ok(())
    }

    pub fn select_pollution_type(&mut self, raw: &str) -> Result<(), FormError> {
        self.ensure_editable()?;

        match raw.parse::<PollutionType>() {
            Ok(pollution_type) => {
                self.pollution_type = pollution_type;
                Ok(())
            },
            Err(err) => {
                self.message = Some(err.to_string());
                Err(err.into())
            },
        }
    }

    pub fn set_description(&mut self, text: &str) -> Result<(), FormError> {
        self.ensure_editable()?;
        self.description = text.to_owned();
        Ok(())
    }

    /// Text typed into the latitude field. Unparsable text counts as empty.
    pub fn set_latitude(&mut self, input: &str) -> Result<(), FormError> {
        self.ensure_editable()?;
        self.latitude = parse_coordinate(input);
        Ok(())
    }

    pub fn set_longitude(&mut self, input: &str) -> Result<(), FormError> {
        self.ensure_editable()?;
        self.longitude = parse_coordinate(input);
        Ok(())
    }

    pub fn set_coordinates(&mut self, coordinates: Coordinates) -> Result<(), FormError> {
        self.ensure_editable()?;
        self.latitude = Some(coordinates.latitude);
        self.longitude = Some(coordinates.longitude);
        Ok(())
    }

    /// Replaces the selected image. `None` clears the selection.
    ///
    /// A non-image file is rejected and not kept; the previous selection is
    /// cleared either way.
    pub fn select_image(&mut self, file: Option<ImageFile>) -> Result<(), FormError> {
        self.ensure_editable()?;

        self.preview = None;
        self.image = None;

        let file = match file {
            Some(file) => file,
            None => return Ok(()),
        };

        if !file.is_image() {
            let err = InvalidFileError { media_type: file.media_type };
            self.message = Some(err.to_string());
            return Err(err.into());
        }

        self.preview = self.previews.as_ref().map(PreviewRegistry::create);
        self.image = Some(file);
        self.message = None;
        Ok(())
    }

    /// Fills the coordinates from `provider`.
    ///
    /// On failure the provider's message is shown and the coordinates stay as
    /// they were.
    pub fn locate(&mut self, provider: &dyn GeolocationProvider) -> Result<Coordinates, FormError> {
        self.ensure_editable()?;

        match provider.acquire_location(&PositionOptions::default()) {
            Ok(coordinates) => {
                self.latitude = Some(coordinates.latitude);
                self.longitude = Some(coordinates.longitude);
                self.message = None;
                Ok(coordinates)
            },
            Err(err) => {
                self.message = Some(err.to_string());
                Err(err.into())
            },
        }
    }

    fn validate(&self) -> Result<(String, Coordinates), ValidationError> {
        let description = self.description.trim();
        if description.is_empty() {
            return Err(ValidationError::MissingFields);
        }

        let coordinates = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Coordinates::new(latitude, longitude),
            _ => return Err(ValidationError::InvalidLocation),
        };
        if !coordinates.is_valid() {
            return Err(ValidationError::InvalidLocation);
        }

        Ok((description.to_owned(), coordinates))
    }

    /// Validates the draft and hands it to `on_submit`.
    ///
    /// The draft is cleared when `on_submit` succeeds and kept, with the
    /// failure message shown, when it fails.
    pub fn submit<F, E>(&mut self, on_submit: F) -> Result<(), FormError>
        where F: FnOnce(SubmittedReport<'_>) -> Result<(), E>,
              E: fmt::Display {

        self.ensure_editable()?;
        self.state = FormState::Validating;

        let (description, coordinates) = match self.validate() {
            Ok(valid) => valid,
            Err(err) => {
                self.state = FormState::Idle;
                self.message = Some(err.to_string());
                return Err(err.into());
            },
        };

        self.state = FormState::Submitting;
        self.message = None;

        let outcome = on_submit(SubmittedReport {
            pollution_type: self.pollution_type,
            description,
            coordinates,
            image: self.image.as_ref(),
        });

        self.state = FormState::Idle;

        match outcome {
            Ok(()) => {
                self.reset();
                Ok(())
            },
            Err(err) => {
                let message = err.to_string();
                self.message = Some(message.clone());
                Err(FormError::Rejected(message))
            },
        }
    }

    fn reset(&mut self) {
        self.pollution_type = PollutionType::default();
        self.description.clear();
        self.latitude = None;
        self.longitude = None;
        self.preview = None;
        self.image = None;
        self.message = None;
    }
}

fn is_plain_extension(ext: &str) -> bool {
    !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn parse_coordinate(input: &str) -> Option<f64> {
    input.trim().parse::<f64>().ok()
}
