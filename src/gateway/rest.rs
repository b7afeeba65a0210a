use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Client, RequestBuilder, Response,
};
use serde_json::Value as JsonValue;

use crate::config::BackendConfig;
use crate::error::{FetchError, InsertError, UploadError};
use super::BackendGateway;
use super::models::{NewReport, ReportQuery, StoredReport};


/// JSON fields the backend puts its error text in, most specific first.
const ERROR_FIELDS: [&str; 3] = ["message", "error_description", "error"];


/// Gateway speaking the PostgREST and Storage HTTP APIs of the managed backend.
pub struct RestGateway {
    client: Client,
    base_url: String,
    api_key: String,
    bucket: String,
    table: String,
}

impl RestGateway {
    pub fn new(config: &BackendConfig) -> Result<Self, reqwest::Error> {
        // Backend calls run until the backend answers.
        let client = Client::builder()
            .timeout(None)
            .build()?;

        Ok(RestGateway {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            bucket: config.bucket.clone(),
            table: config.table.clone(),
        })
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, self.bucket, path)
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", self.api_key.as_str())
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
    }
}

impl BackendGateway for RestGateway {
    fn upload_image(&self, path: &str, content_type: &str, bytes: &[u8])
        -> Result<Option<String>, UploadError> {

        let mut res = self.authorized(self.client.post(self.object_url(path).as_str()))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes.to_vec())
            .send()
            .map_err(UploadError::network)?;

        if !res.status().is_success() {
            let (status, message) = read_failure(&mut res);
            return Err(UploadError::rejected(status, message));
        }

        Ok(Some(self.public_url(path)))
    }

    fn insert_report(&self, report: &NewReport) -> Result<(), InsertError> {
        let mut res = self.authorized(self.client.post(self.table_url().as_str()))
            .header("Prefer", "return=minimal")
            .json(&report.to_json())
            .send()
            .map_err(InsertError::network)?;

        if !res.status().is_success() {
            let (status, message) = read_failure(&mut res);
            return Err(InsertError::rejected(status, message));
        }

        Ok(())
    }

    fn list_reports(&self, query: &ReportQuery) -> Result<Vec<StoredReport>, FetchError> {
        let order = if query.newest_first {
            "created_at.desc"
        }
        else {
            "created_at.asc"
        };

        let mut res = self.authorized(self.client.get(self.table_url().as_str()))
            .query(&[
                ("select", "*".to_owned()),
                ("order", order.to_owned()),
                ("limit", query.limit.to_string()),
            ])
            .send()
            .map_err(FetchError::network)?;

        if !res.status().is_success() {
            let (status, message) = read_failure(&mut res);
            return Err(FetchError::rejected(status, message));
        }

        let body = res.json::<JsonValue>()
            .map_err(FetchError::malformed)?;

        body.as_array()
            .map(|rows| rows.iter().map(StoredReport::from_json).collect())
            .ok_or_else(|| FetchError::malformed("Expected a list of reports"))
    }
}

fn read_failure(res: &mut Response) -> (u16, String) {
    let status = res.status();
    let body = res.text().unwrap_or_default();

    (status.as_u16(), failure_message(&body).unwrap_or_else(|| status.to_string()))
}

fn failure_message(body: &str) -> Option<String> {
    let from_json = serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| {
            ERROR_FIELDS.iter()
                .find_map(|field| v[*field].as_str().map(str::to_owned))
        });

    from_json.or_else(|| {
        Some(body.trim().to_owned()).filter(|text| !text.is_empty())
    })
}
