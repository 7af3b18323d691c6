//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Protocolo HTTP/1.0 y HTTP/1.1 implementado sobre el primitivo de I/O:
//!
//! - `headers`: mapa ordenado y case-insensitive
//! - `request`: request line y headers
//! - `parser`: framer por conexión (headers, Content-Length, chunked)
//! - `body`: política de body y codificación chunked
//! - `response`: construcción de respuestas
//! - `status`: códigos de estado
//!
//! ### Formato de Request
//!
//! ```text
//! POST /upload HTTP/1.1\r\n
//! Transfer-Encoding: chunked\r\n
//! \r\n
//! 5\r\n
//! hello\r\n
//! 0\r\n
//! \r\n
//! ```

pub mod body;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod status;

pub use body::BodyKind;
pub use headers::Headers;
pub use parser::{Framer, FramerState};
pub use request::{Method, Request};
pub use response::Response;
pub use status::StatusCode;
