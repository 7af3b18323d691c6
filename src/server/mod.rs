//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! Arquitectura de hilos:
//!
//! ```text
//! http-master ──accept──▶ ConnectionQueue (capacidad fija) ──▶ http-worker-0..N
//! ```
//!
//! - El acceptor es el único productor de la cola
//! - Cada worker atiende una conexión completa (keep-alive incluido)
//! - `stop` activa el flag compartido, cierra la cola y espera a todos

mod acceptor;
pub mod connection;
pub mod context;
pub mod queue;
pub mod throttle;
pub mod websocket;
mod worker;

pub use connection::Connection;
pub use context::{Context, ServerStatus};
pub use websocket::WebSocket;

use crate::auth::{DigestAuth, PasswordFile};
use crate::config::Config;
use crate::error::ServerError;
use crate::net::{tls, Listener};
use crate::router::HandlerRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::info;

/// Servidor en ejecución
#[derive(Debug)]
pub struct Server {
    ctx: Arc<Context>,
    local_addrs: Vec<SocketAddr>,
    acceptor: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

/// Permite detener el servidor desde otro hilo (p. ej. un handler de señal)
#[derive(Debug, Clone)]
pub struct StopHandle {
    ctx: Arc<Context>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.ctx.request_stop();
    }
}

impl Server {
    /// Valida la configuración, abre los puertos y lanza los hilos.
    ///
    /// Si algo falla no queda ningún hilo corriendo.
    pub fn start(config: Config, registry: HandlerRegistry) -> Result<Server, ServerError> {
        config.validate().map_err(ServerError::Config)?;
        let specs = config.listen_specs().map_err(ServerError::Config)?;

        let tls = match &config.ssl_certificate {
            Some(path) if specs.iter().any(|s| s.tls) => Some(tls::load_server_config(path)?),
            _ => None,
        };

        let global_auth = match &config.global_passwords_file {
            Some(path) => {
                let store = PasswordFile::load(path)?;
                Some(DigestAuth::new(&config.authentication_domain, Arc::new(store)))
            }
            None => None,
        };

        let listeners = specs
            .into_iter()
            .map(Listener::bind)
            .collect::<Result<Vec<_>, _>>()?;
        let local_addrs: Vec<SocketAddr> = listeners.iter().map(Listener::local_addr).collect();
        let tls_port = listeners
            .iter()
            .find(|l| l.spec().tls)
            .map(|l| l.local_addr().port());

        let num_threads = config.num_threads;
        let ctx = Arc::new(Context::new(config, registry, tls, global_auth, tls_port));

        let mut server = Server {
            ctx: Arc::clone(&ctx),
            local_addrs,
            acceptor: None,
            workers: Vec::new(),
        };

        // Si falla un spawn, Drop detiene lo que ya arrancó
        server.workers = worker::spawn_workers(&ctx, num_threads)?;
        server.acceptor = Some(acceptor::spawn_acceptor(Arc::clone(&ctx), listeners)?);

        info!(
            addrs = ?server.local_addrs,
            workers = num_threads,
            queue = ctx.queue().capacity(),
            "server started"
        );
        Ok(server)
    }

    /// Direcciones reales de escucha, en el orden de `listening_ports`
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn status(&self) -> ServerStatus {
        self.ctx.status()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            ctx: Arc::clone(&self.ctx),
        }
    }

    /// Detiene el servidor y espera a que terminen todos los hilos
    pub fn stop(mut self) {
        self.ctx.request_stop();
        self.join_all();
    }

    /// Bloquea hasta que alguien llame a [`StopHandle::stop`]
    pub fn wait(mut self) {
        self.join_all();
    }

    fn join_all(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        if !self.local_addrs.is_empty() {
            info!(served = self.ctx.status().requests_served, "server stopped");
            self.local_addrs.clear();
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.ctx.request_stop();
        self.join_all();
    }
}
