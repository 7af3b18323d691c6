//! # Acceptor
//! src/server/acceptor.rs
//!
//! Un único hilo (`http-master`) recorre todos los listeners en modo no
//! bloqueante y encola lo que acepta. Cuando la cola está llena, el
//! acceptor espera: la contrapresión queda en el backlog del kernel.

use crate::net::Listener;
use crate::server::context::Context;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pausa cuando ningún listener tiene conexiones pendientes
const IDLE_SLEEP: Duration = Duration::from_millis(50);

pub fn spawn_acceptor(ctx: Arc<Context>, listeners: Vec<Listener>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("http-master".to_string())
        .spawn(move || accept_loop(&ctx, &listeners))
}

fn accept_loop(ctx: &Context, listeners: &[Listener]) {
    for listener in listeners {
        info!(
            addr = %listener.local_addr(),
            tls = listener.spec().tls,
            redirect = listener.spec().redirect,
            "listening"
        );
    }

    while !ctx.is_stopping() {
        let mut accepted_any = false;

        for listener in listeners {
            match listener.accept() {
                Ok(Some(socket)) => {
                    accepted_any = true;
                    ctx.connection_accepted();
                    debug!(remote = %socket.remote_addr, local = %socket.local_addr, "accepted");

                    if let Err(socket) = ctx.queue().produce(socket) {
                        debug!(remote = %socket.remote_addr, "server stopping, dropping connection");
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(addr = %listener.local_addr(), error = %e, "accept failed"),
            }
        }

        if !accepted_any {
            thread::sleep(IDLE_SLEEP);
        }
    }

    // Lo que quedó en la cola no llegará a ningún worker
    let dropped = ctx.queue().drain().len();
    if dropped > 0 {
        debug!(dropped, "closing queued connections");
    }
    info!("acceptor stopped");
}
