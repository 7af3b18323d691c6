//! # Módulo de red
//! src/net/mod.rs
//!
//! - `transport`: primitivo push/pull sobre socket, TLS o archivo
//! - `socket`: sockets de escucha y sockets aceptados
//! - `tls`: carga de la configuración rustls

pub mod socket;
pub mod tls;
pub mod transport;

pub use socket::{Listener, Socket};
pub use transport::{pull, pull_all, push, push_all, ByteSource, Channel, Transport};
