//! # HTTP Engine - Entry Point
//! src/main.rs
//!
//! Binario de demostración: lee la configuración (CLI + entorno), registra
//! `/status` y `/echo` y atiende hasta recibir Ctrl-C.

use http_engine::config::Config;
use http_engine::error::HttpError;
use http_engine::http::{Request, Response, StatusCode};
use http_engine::logging::init_logging;
use http_engine::router::HandlerRegistry;
use http_engine::server::{Connection, Server};
use tracing::{error, info};

/// Límite del body que `/echo` devuelve
const ECHO_LIMIT: usize = 1024 * 1024;

fn status_handler(_request: &Request, conn: &mut Connection) -> Result<(), HttpError> {
    let status = conn.context().status();
    conn.send(Response::json(&status))
}

fn echo_handler(request: &Request, conn: &mut Connection) -> Result<(), HttpError> {
    let body = match conn.read_body_to_end(ECHO_LIMIT) {
        Ok(body) => body,
        Err(HttpError::RequestTooLarge) => {
            return conn.send_error(StatusCode::PayloadTooLarge, "body too large");
        }
        Err(e) => return Err(e),
    };

    let content_type = request
        .header("Content-Type")
        .unwrap_or("application/octet-stream")
        .to_string();
    conn.send(
        Response::new(StatusCode::Ok)
            .with_header("Content-Type", &content_type)
            .with_body_bytes(body),
    )
}

fn main() {
    let config = Config::new();
    init_logging(&config.log_level);

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        std::process::exit(1);
    }

    let mut registry = HandlerRegistry::new();
    registry.on("/status", status_handler);
    registry.on("/echo", echo_handler);

    let server = match Server::start(config, registry) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "cannot start server");
            std::process::exit(1);
        }
    };

    let stop = server.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Ctrl-C received, stopping");
        stop.stop();
    }) {
        error!(error = %e, "cannot install Ctrl-C handler");
    }

    server.wait();
}
