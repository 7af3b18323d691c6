//! # Contexto del servidor
//! src/server/context.rs
//!
//! Estado compartido por el acceptor y todos los workers. Se crea al
//! arrancar y se destruye al terminar el último worker.
//!
//! - Configuración y registro de handlers: solo lectura tras el arranque
//! - Cola de conexiones y nonces: con su propio lock
//! - Flag de parada y contadores: atómicos

use crate::auth::{DigestAuth, NonceSource};
use crate::config::Config;
use crate::net::transport::deadline_from_ms;
use crate::net::Socket;
use crate::router::HandlerRegistry;
use crate::server::queue::ConnectionQueue;
use rustls::ServerConfig;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Foto del estado del servidor
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub uptime_secs: u64,
    pub num_threads: usize,
    pub queued_connections: usize,
    pub queue_capacity: usize,
    pub active_connections: usize,
    pub connections_accepted: u64,
    pub requests_served: u64,
    pub stopping: bool,
}

/// Estado global de un servidor
pub struct Context {
    config: Config,
    registry: HandlerRegistry,
    stop: AtomicBool,
    start_time: Instant,
    nonces: NonceSource,
    queue: ConnectionQueue<Socket>,
    tls: Option<Arc<ServerConfig>>,

    /// Protección Digest de todas las URIs (`global_passwords_file`)
    global_auth: Option<DigestAuth>,

    /// Primer puerto TLS, destino de las redirecciones
    tls_port: Option<u16>,

    active_connections: AtomicUsize,
    connections_accepted: AtomicU64,
    requests_served: AtomicU64,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("handlers", &self.registry.len())
            .field("tls", &self.tls.is_some())
            .field("stopping", &self.is_stopping())
            .finish()
    }
}

impl Context {
    pub fn new(
        config: Config,
        registry: HandlerRegistry,
        tls: Option<Arc<ServerConfig>>,
        global_auth: Option<DigestAuth>,
        tls_port: Option<u16>,
    ) -> Self {
        Self {
            nonces: NonceSource::new(config.nonce_lifetime_secs),
            queue: ConnectionQueue::new(config.queue_capacity),
            config,
            registry,
            stop: AtomicBool::new(false),
            start_time: Instant::now(),
            tls,
            global_auth,
            tls_port,
            active_connections: AtomicUsize::new(0),
            connections_accepted: AtomicU64::new(0),
            requests_served: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn nonces(&self) -> &NonceSource {
        &self.nonces
    }

    pub fn queue(&self) -> &ConnectionQueue<Socket> {
        &self.queue
    }

    pub fn tls(&self) -> Option<&Arc<ServerConfig>> {
        self.tls.as_ref()
    }

    pub fn global_auth(&self) -> Option<&DigestAuth> {
        self.global_auth.as_ref()
    }

    pub fn tls_port(&self) -> Option<u16> {
        self.tls_port
    }

    /// Flag que revisan todos los bucles de I/O
    pub fn stop_flag(&self) -> &AtomicBool {
        &self.stop
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Activa la parada y libera a quienes esperan en la cola
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.queue.close();
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        deadline_from_ms(self.config.request_timeout_ms)
    }

    pub fn keep_alive_timeout(&self) -> Option<Duration> {
        deadline_from_ms(self.config.keep_alive_timeout_ms)
    }

    pub fn websocket_timeout(&self) -> Option<Duration> {
        deadline_from_ms(self.config.websocket_timeout_ms)
    }

    pub(crate) fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn request_served(&self) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            uptime_secs: self.uptime().as_secs(),
            num_threads: self.config.num_threads,
            queued_connections: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            requests_served: self.requests_served.load(Ordering::Relaxed),
            stopping: self.is_stopping(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Context {
        Context::new(Config::default(), HandlerRegistry::new(), None, None, None)
    }

    #[test]
    fn test_stop_closes_queue() {
        let ctx = context();
        assert!(!ctx.is_stopping());
        ctx.request_stop();
        assert!(ctx.is_stopping());
        assert!(ctx.queue().is_closed());
    }

    #[test]
    fn test_status_counters() {
        let ctx = context();
        ctx.connection_accepted();
        ctx.connection_opened();
        ctx.request_served();
        ctx.request_served();

        let status = ctx.status();
        assert_eq!(status.connections_accepted, 1);
        assert_eq!(status.active_connections, 1);
        assert_eq!(status.requests_served, 2);
        assert_eq!(status.queue_capacity, Config::default().queue_capacity);

        ctx.connection_closed();
        assert_eq!(ctx.status().active_connections, 0);

        let json = serde_json::to_value(ctx.status()).unwrap();
        assert_eq!(json["requests_served"], 2);
    }

    #[test]
    fn test_timeouts_from_config() {
        let ctx = context();
        assert_eq!(
            ctx.request_timeout(),
            Some(Duration::from_millis(Config::default().request_timeout_ms))
        );
    }
}
