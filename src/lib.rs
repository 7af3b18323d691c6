//! # HTTP Engine
//! src/lib.rs
//!
//! Motor HTTP/1.1 embebible: acepta conexiones TCP (opcionalmente TLS),
//! parsea requests, los despacha a handlers registrados y reutiliza cada
//! conexión para varios requests, todo sobre un pool fijo de workers.
//!
//! ## Arquitectura
//!
//! - `net`: primitivo push/pull con deadline sobre socket, TLS o archivo
//! - `http`: framing de mensajes (headers, `Content-Length`, chunked) y respuestas
//! - `router`: tabla ordenada patrón → handler
//! - `auth`: nonces sin estado y autenticación Digest
//! - `server`: acceptor, cola acotada, workers y ciclo de vida de la conexión
//! - `config`, `error`, `logging`: configuración, errores y trazas
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use http_engine::config::Config;
//! use http_engine::http::Response;
//! use http_engine::router::HandlerRegistry;
//! use http_engine::server::Server;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.on("/hello", |_req: &http_engine::http::Request, conn: &mut http_engine::server::Connection| {
//!     conn.send(Response::text("hola"))
//! });
//!
//! let config = Config {
//!     listening_ports: "127.0.0.1:8080".to_string(),
//!     ..Config::default()
//! };
//! let server = Server::start(config, registry).expect("no se pudo arrancar");
//! server.wait();
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod net;
pub mod router;
pub mod server;
