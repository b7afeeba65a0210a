pub mod models;
pub mod rest;
#[cfg(test)]
pub mod memory;


use crate::error::{FetchError, InsertError, UploadError};
use models::{NewReport, ReportQuery, StoredReport};


/// The managed backend: one report table and one image bucket.
///
/// Calls are never retried here. A failure ends the action that made the
/// call and is shown to the user, who can trigger it again.
pub trait BackendGateway: Send + Sync {
    /// Stores `bytes` under `path` in the image bucket.
    ///
    /// Returns the public URL of the stored object, if the backend exposes one.
    fn upload_image(&self, path: &str, content_type: &str, bytes: &[u8])
        -> Result<Option<String>, UploadError>;

    fn insert_report(&self, report: &NewReport) -> Result<(), InsertError>;

    fn list_reports(&self, query: &ReportQuery) -> Result<Vec<StoredReport>, FetchError>;
}
