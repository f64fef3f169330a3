use std::sync::Arc;

use actix_easy_multipart::MultipartFormConfig;
use actix_web::web;
use colored::Colorize;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api;
use crate::infrastructure::{build_config, initialize_telemetry, ServiceProvider, UploadSystemConfig};

pub fn run() {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(x) => x,
        Err(e) => return eprintln!("{}: {}", "Cannot build runtime".red(), e),
    };
    runtime.block_on(async_run());
}

pub async fn async_run() {
    let config = match build_config() {
        Ok(x) => x,
        Err(e) => {
            return eprintln!("{}: {}", "Cannot build config".red(), e);
        }
    };
    let telemetry = match config.clone().try_deserialize::<UploadSystemConfig>() {
        Ok(x) => x.common.telemetry,
        Err(e) => {
            return eprintln!("{}: {}", "Cannot read config".red(), e);
        }
    };
    if let Err(e) = initialize_telemetry(&telemetry) {
        return eprintln!("{}: {}", "Cannot build logger".red(), e);
    };
    let service_provider = match ServiceProvider::build(config).await {
        Ok(x) => Arc::new(x),
        Err(e) => {
            return eprintln!("{}: {:?}", "Cannot build Service Provider".red(), e);
        }
    };
    let handles = service_provider
        .background_services()
        .into_iter()
        .map(|x| tokio::spawn(async move { x.run().await }))
        .collect::<Vec<JoinHandle<()>>>();
    tokio::select! {
        _ = initialize_web_host(service_provider) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Stopping services (ctrl-c handling).");
        }
    }
    for handle in handles {
        handle.abort()
    }
}

pub async fn initialize_web_host(sp: Arc<ServiceProvider>) {
    let host = sp.config.common.host.clone();
    let multipart_total_limit = sp.config.upload.multipart_total_limit;
    let server = actix_web::HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_header()
            .allow_any_method()
            .max_age(86400);

        actix_web::App::new()
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(cors)
            .app_data(MultipartFormConfig::default().total_limit(multipart_total_limit))
            .app_data(web::Data::from(sp.clone()))
            .service(api::healthz)
            .service(api::upload::start_upload)
            .service(api::upload::upload_chunk)
            .service(api::upload::complete_upload)
            .service(api::upload::cancel_upload)
            .service(api::upload::get_upload_progress)
    })
    .bind((host.bind_address.to_owned(), host.bind_port));
    let server = match server {
        Ok(x) => x,
        Err(e) => return error!("Cannot bind {}:{}: {}", host.bind_address, host.bind_port, e),
    };
    info!("Listening on {}:{}.", host.bind_address, host.bind_port);
    match server.disable_signals().run().await {
        Ok(_) => info!("Web server stopped successfully."),
        Err(e) => error!("Web server into error: {}", e),
    }
}
