use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use std::io;
use std::time::Duration;

use infra::config::AppConfigImpl;
use log::{error, info};
use log4rs::{
    append::{console::ConsoleAppender, file::FileAppender},
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {m}{n}";

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build("app.log")?;

    // 同时输出到控制台和文件
    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .appender(Appender::builder().build(
            "stdout",
            Box::new(
                ConsoleAppender::builder()
                    .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
                    .build(),
            ),
        ))
        .build(
            Root::builder()
                .appender("file")
                .appender("stdout")
                .build(log_level.parse().unwrap_or(log::LevelFilter::Info)),
        )?;

    log4rs::init_config(config)?;
    Ok(())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    init_logging().map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    let cfg = AppConfigImpl::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;
    let server_cfg = cfg.server();
    let playback_cfg = cfg.playback();

    let mut app_state = server::AppState::new(&cfg).map_err(|e| {
        error!("Failed to initialise playback services: {}", e);
        io::Error::new(io::ErrorKind::Other, e)
    })?;
    server::setup_event_bus(&mut app_state).await;

    if playback_cfg.auto_end && playback_cfg.auto_end_sweep_secs > 0 {
        server::spawn_auto_end_sweep(
            app_state.controller.clone(),
            Duration::from_secs(playback_cfg.auto_end_sweep_secs),
        );
        info!(
            "[AutoEnd] sweeping every {}s, leaving after {}s without listeners",
            playback_cfg.auto_end_sweep_secs, playback_cfg.auto_end_after_secs
        );
    }
    if server_cfg.api_token.is_none() {
        info!("No api_token configured, command API is open");
    }

    let app_state = web::Data::new(app_state);
    info!("Listening on {}:{}", server_cfg.host, server_cfg.port);
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Logger::default())
            .configure(server::api::configure_service)
    })
    .bind((server_cfg.host.as_str(), server_cfg.port))?
    .run()
    .await
}
