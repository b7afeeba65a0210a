use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use chrono::Utc;
use serde_json::{json, Value as JsonValue};

use crate::error::{FetchError, InsertError, UploadError};
use super::BackendGateway;
use super::models::{NewReport, ReportQuery, StoredReport};


const PUBLIC_BASE: &str = "https://storage.test/public";


/// In-process backend for tests. Rows are kept in insertion order.
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    rows: Vec<JsonValue>,
    objects: HashMap<String, (String, Vec<u8>)>,
    next_id: u64,
    hide_public_urls: bool,
    upload_failure: Option<String>,
    insert_failure: Option<String>,
    fetch_failure: Option<String>,
    uploads: usize,
    inserts: usize,
    fetches: usize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        MemoryGateway {
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory gateway lock")
    }

    /// Uploads succeed but report no public URL.
    pub fn hide_public_urls(&self) {
        self.state().hide_public_urls = true;
    }

    pub fn fail_uploads(&self, message: &str) {
        self.state().upload_failure = Some(message.to_owned());
    }

    pub fn fail_inserts(&self, message: &str) {
        self.state().insert_failure = Some(message.to_owned());
    }

    pub fn fail_fetches(&self, message: &str) {
        self.state().fetch_failure = Some(message.to_owned());
    }

    pub fn recover(&self) {
        let mut state = self.state();
        state.upload_failure = None;
        state.insert_failure = None;
        state.fetch_failure = None;
    }

    /// Appends a row exactly as given, bypassing the insert path.
    pub fn push_row(&self, row: JsonValue) {
        self.state().rows.push(row);
    }

    pub fn rows(&self) -> Vec<JsonValue> {
        self.state().rows.clone()
    }

    pub fn object_keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.state().objects.get(key).cloned()
    }

    pub fn upload_count(&self) -> usize {
        self.state().uploads
    }

    pub fn insert_count(&self) -> usize {
        self.state().inserts
    }

    pub fn fetch_count(&self) -> usize {
        self.state().fetches
    }

    pub fn call_count(&self) -> usize {
        let state = self.state();
        state.uploads + state.inserts + state.fetches
    }
}

impl BackendGateway for MemoryGateway {
    fn upload_image(&self, path: &str, content_type: &str, bytes: &[u8])
        -> Result<Option<String>, UploadError> {

        let mut state = self.state();
        state.uploads += 1;

        if let Some(message) = &state.upload_failure {
            return Err(UploadError::rejected(500, message.clone()));
        }
        if state.objects.contains_key(path) {
            return Err(UploadError::rejected(409, "The resource already exists"));
        }

        state.objects.insert(path.to_owned(), (content_type.to_owned(), bytes.to_vec()));

        if state.hide_public_urls {
            Ok(None)
        }
        else {
            Ok(Some(format!("{}/{}", PUBLIC_BASE, path)))
        }
    }

    fn insert_report(&self, report: &NewReport) -> Result<(), InsertError> {
        let mut state = self.state();
        state.inserts += 1;

        if let Some(message) = &state.insert_failure {
            return Err(InsertError::rejected(403, message.clone()));
        }

        state.next_id += 1;

        let mut row = report.to_json();
        row["id"] = json!(state.next_id);
        row["created_at"] = json!(Utc::now().to_rfc3339());
        state.rows.push(row);

        Ok(())
    }

    fn list_reports(&self, query: &ReportQuery) -> Result<Vec<StoredReport>, FetchError> {
        let mut state = self.state();
        state.fetches += 1;

        if let Some(message) = &state.fetch_failure {
            return Err(FetchError::network(message));
        }

        let rows: Box<dyn Iterator<Item = &JsonValue>> = if query.newest_first {
            Box::new(state.rows.iter().rev())
        }
        else {
            Box::new(state.rows.iter())
        };

        Ok(rows.take(query.limit).map(StoredReport::from_json).collect())
    }
}
