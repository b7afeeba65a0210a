use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};
use rocket::{
    config::Config,
    request::Form,
    response::{
        status::BadRequest,
        content::Json,
        NamedFile,
    },
    Rocket, State,
};
use serde_json::{json, Value as JsonValue};

use crate::geolocation::{BrowserFix, Coordinates, GeolocationProvider, PositionOptions};
use crate::page_controller::PageController;
use crate::report_form::{FormError, ImageFile, ReportForm};


type JsonResult = Result<Json<String>, BadRequest<String>>;


pub const STATIC_DIR: &str = "static/";
/// Largest accepted form body. Photos travel base64 encoded inside it.
pub const FORM_LIMIT: u64 = 12 * 1024 * 1024;


fn make_json_result(value: JsonValue) -> JsonResult {
    Ok(Json(value.to_string()))
}

fn make_json_error(message: String) -> JsonResult {
    Err(BadRequest(Some(json!({
        "kind": "error",
        "message": message,
    }).to_string())))
}

fn lock_page(page: &Mutex<PageController>) -> MutexGuard<'_, PageController> {
    page.lock().unwrap_or_else(PoisonError::into_inner)
}


#[derive(FromForm)]
pub struct ReportInput {
    pollution_type: Option<String>,
    description: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
    // `data:` URI of the photo
    image: Option<String>,
    image_name: Option<String>,
}

impl ReportInput {
    fn fill(self, form: &mut ReportForm) -> Result<(), FormError> {
        if let Some(raw) = self.pollution_type.as_deref().filter(|t| !t.trim().is_empty()) {
            form.select_pollution_type(raw)?;
        }

        form.set_description(self.description.as_deref().unwrap_or(""))?;
        form.set_latitude(self.latitude.as_deref().unwrap_or(""))?;
        form.set_longitude(self.longitude.as_deref().unwrap_or(""))?;

        if let Some(uri) = self.image.filter(|uri| !uri.trim().is_empty()) {
            let name = self.image_name.unwrap_or_default();
            form.select_image(Some(ImageFile::from_data_uri(&name, &uri)?))?;
        }

        Ok(())
    }
}


/// What the browser's `getCurrentPosition` produced.
#[derive(FromForm)]
pub struct LocateInput {
    latitude: Option<f64>,
    longitude: Option<f64>,
    code: Option<u16>,
    unsupported: Option<bool>,
}

impl LocateInput {
    fn to_fix(&self) -> BrowserFix {
        if self.unsupported.unwrap_or(false) {
            return BrowserFix::Unsupported;
        }
        if let Some(code) = self.code {
            return BrowserFix::Failed(code);
        }

        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => BrowserFix::Position(Coordinates::new(latitude, longitude)),
            _ => BrowserFix::Failed(0),
        }
    }
}


#[get("/")]
pub fn index() -> &'static str {
    "Pollution Map Server"
}

#[get("/<file..>")]
pub fn get_static_file(file: PathBuf) -> Option<NamedFile> {
    NamedFile::open(Path::new(STATIC_DIR).join(file)).ok()
}

#[get("/report-map")]
pub fn get_report_map(page: State<Mutex<PageController>>) -> Json<String> {
    Json(lock_page(page.inner()).map().to_json().to_string())
}

#[post("/report-map/refresh")]
pub fn refresh_report_map(page: State<Mutex<PageController>>) -> JsonResult {
    let mut page = lock_page(page.inner());

    match page.map_mut().refresh() {
        Ok(_) => make_json_result(page.map().to_json()),
        Err(err) => make_json_error(err.to_string()),
    }
}

#[post("/report", format="application/x-www-form-urlencoded", data="<input>")]
pub fn post_report(input: Form<ReportInput>, page: State<Mutex<PageController>>) -> JsonResult {
    let mut form = ReportForm::new();

    if let Err(err) = input.into_inner().fill(&mut form) {
        return make_json_error(err.to_string());
    }

    let mut page = lock_page(page.inner());

    match page.submit_form(&mut form) {
        Ok(()) => make_json_result(page.status().to_json()),
        Err(err) => make_json_error(err.to_string()),
    }
}

#[get("/status")]
pub fn get_status(page: State<Mutex<PageController>>) -> Json<String> {
    Json(lock_page(page.inner()).status().to_json().to_string())
}

#[get("/location-options")]
pub fn get_location_options() -> Json<String> {
    Json(PositionOptions::default().to_json().to_string())
}

#[post("/locate", format="application/x-www-form-urlencoded", data="<input>")]
pub fn post_locate(input: Form<LocateInput>) -> JsonResult {
    match input.to_fix().acquire_location(&PositionOptions::default()) {
        Ok(coords) => make_json_result(json!({
            "latitude": coords.latitude,
            "longitude": coords.longitude,
        })),
        Err(err) => make_json_error(err.to_string()),
    }
}


pub fn build_rocket(config: Config, page: PageController) -> Rocket {
    rocket::custom(config)
        .manage(Mutex::new(page))
        .mount("/static", routes![get_static_file])
        .mount("/", routes![
            index,
            get_report_map,
            refresh_report_map,
            post_report,
            get_status,
            get_location_options,
            post_locate,
        ])
}
