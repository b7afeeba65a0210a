use std::{fs, process, sync::Arc};

use log::{error, info, warn};
use rocket::config::{Config as RocketConfig, Environment, Limits, LoggingLevel};

use pollution_map_server::{
    config::Config,
    gateway::{rest::RestGateway, BackendGateway},
    logger,
    page_controller::PageController,
    report_route,
};


fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {}", err);
            process::exit(1);
        },
    };

    let sentry_guard = config.sentry_dsn.as_ref().map(|dsn| {
        sentry::init((dsn.as_str(), sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        }))
    });

    if let Err(err) = logger::init(config.log_level, sentry_guard.is_some()) {
        eprintln!("Logger initialization failed: {}", err);
    }

    let gateway: Arc<dyn BackendGateway> = match RestGateway::new(&config.backend) {
        Ok(gateway) => Arc::new(gateway),
        Err(err) => {
            error!("Fail to create the backend client: {}", err);
            process::exit(1);
        },
    };

    if let Err(err) = fs::create_dir_all(report_route::STATIC_DIR) {
        warn!("Fail to create the static directory: {}", err);
    }

    let mut page = PageController::new(gateway, config.require_image);
    if let Err(err) = page.map_mut().initialize() {
        warn!("Initial report load failed: {}", err);
    }

    let environment = Environment::active().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            Environment::Development
        }
        else {
            Environment::Production
        }
    });

    // The log facade is ours; Rocket's own logger stays off.
    let rocket_config = RocketConfig::build(environment)
        .address(config.address.clone())
        .port(config.port)
        .limits(Limits::new().limit("forms", report_route::FORM_LIMIT))
        .log_level(LoggingLevel::Off)
        .finalize();

    let rocket_config = match rocket_config {
        Ok(rocket_config) => rocket_config,
        Err(err) => {
            error!("Invalid server configuration: {}", err);
            process::exit(1);
        },
    };

    info!("Listening on {}:{}", config.address, config.port);

    let err = report_route::build_rocket(rocket_config, page).launch();
    error!("Server stopped: {}", err);
}
