//! # Sockets de escucha y sockets aceptados
//! src/net/socket.rs

use crate::config::ListenSpec;
use crate::error::ServerError;
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

/// Timeout de cada intento de lectura/escritura sobre un socket aceptado.
/// Los bucles de push/pull revisan el flag de parada en cada vuelta.
pub const IO_POLL_SLICE: Duration = Duration::from_millis(200);

/// Socket aceptado por el acceptor y aún no atendido.
///
/// Tiene un único dueño a la vez: acceptor → cola → worker → conexión.
#[derive(Debug)]
pub struct Socket {
    pub stream: TcpStream,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    /// El puerto exige TLS
    pub is_tls: bool,
    /// El puerto solo redirige a HTTPS
    pub tls_redirect: bool,
}

impl Socket {
    /// Deja el socket en modo bloqueante con timeouts cortos
    pub fn prepare(&self, tcp_nodelay: bool) -> io::Result<()> {
        self.stream.set_nonblocking(false)?;
        self.stream.set_read_timeout(Some(IO_POLL_SLICE))?;
        self.stream.set_write_timeout(Some(IO_POLL_SLICE))?;
        if tcp_nodelay {
            self.stream.set_nodelay(true)?;
        }
        Ok(())
    }
}

/// Socket de escucha no bloqueante asociado a su especificación
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
    spec: ListenSpec,
    local_addr: SocketAddr,
}

impl Listener {
    /// Hace bind del puerto descrito por `spec`
    pub fn bind(spec: ListenSpec) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(spec.addr).map_err(|source| ServerError::Bind {
            addr: spec.addr.to_string(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            spec,
            local_addr,
        })
    }

    /// Dirección real (con el puerto resuelto si se pidió el 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn spec(&self) -> &ListenSpec {
        &self.spec
    }

    /// Acepta una conexión pendiente. `Ok(None)` si no hay ninguna.
    pub fn accept(&self) -> io::Result<Option<Socket>> {
        match self.listener.accept() {
            Ok((stream, remote_addr)) => Ok(Some(Socket {
                local_addr: stream.local_addr().unwrap_or(self.local_addr),
                stream,
                remote_addr,
                is_tls: self.spec.tls,
                tls_redirect: self.spec.redirect,
            })),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}
