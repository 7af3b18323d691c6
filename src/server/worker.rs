//! # Workers
//! src/server/worker.rs
//!
//! Cada worker toma sockets de la cola y atiende la conexión completa
//! antes de pedir la siguiente. Un pánico dentro de un handler cierra esa
//! conexión pero no mata al worker.

use crate::net::Socket;
use crate::server::connection::Connection;
use crate::server::context::Context;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// Lanza `count` workers con nombre `http-worker-N`
pub fn spawn_workers(ctx: &Arc<Context>, count: usize) -> io::Result<Vec<JoinHandle<()>>> {
    (0..count)
        .map(|i| {
            let ctx = Arc::clone(ctx);
            thread::Builder::new()
                .name(format!("http-worker-{i}"))
                .spawn(move || worker_loop(i, ctx))
        })
        .collect()
}

/// Loop principal del worker
fn worker_loop(index: usize, ctx: Arc<Context>) {
    debug!(worker = index, "worker started");

    while let Some(socket) = ctx.queue().consume() {
        handle_socket(index, &ctx, socket);
    }

    debug!(worker = index, "worker stopped");
}

fn handle_socket(index: usize, ctx: &Arc<Context>, socket: Socket) {
    let remote = socket.remote_addr;

    if let Err(e) = socket.prepare(ctx.config().tcp_nodelay) {
        warn!(worker = index, remote = %remote, error = %e, "cannot configure socket");
        return;
    }

    let conn = match Connection::new(Arc::clone(ctx), socket, index) {
        Ok(conn) => conn,
        Err(e) => {
            error!(worker = index, remote = %remote, error = %e, "cannot set up connection");
            return;
        }
    };

    // `serve` es dueña de la conexión: si hay pánico, se cierra al desenrollar
    if panic::catch_unwind(AssertUnwindSafe(|| conn.serve())).is_err() {
        error!(worker = index, remote = %remote, "handler panicked, connection dropped");
        ctx.connection_closed();
    }
}
