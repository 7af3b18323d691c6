//! # Primitivo de I/O (push / pull)
//! src/net/transport.rs
//!
//! Transferencia de bytes independiente del transporte: socket plano,
//! sesión TLS o archivo local. Cada operación:
//!
//! 1. Intenta una escritura/lectura sobre el transporte
//! 2. Un "would block" (o timeout del socket) cuenta como cero progreso, no como error
//! 3. Si hay deadline, reintenta hasta agotarlo; sin deadline reintenta indefinidamente
//! 4. El flag de parada del servidor aborta siempre con error
//!
//! Los sockets se configuran con un timeout corto de lectura/escritura
//! (ver [`crate::net::socket::IO_POLL_SLICE`]) para que estos bucles
//! puedan revisar el flag de parada y el deadline con frecuencia.

use crate::error::TransferError;
use rustls::{ServerConnection, StreamOwned};
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Sesión TLS del lado servidor sobre un socket TCP
pub type TlsStream = StreamOwned<ServerConnection, TcpStream>;

/// Conjunto cerrado de transportes soportados
pub enum Transport {
    /// Socket TCP sin cifrar
    Plain(TcpStream),

    /// Sesión TLS (rustls) sobre TCP
    Tls(Box<TlsStream>),

    /// Archivo local (p. ej. destino de un body reenviado)
    File(File),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Plain(s) => write!(f, "Plain({:?})", s.peer_addr().ok()),
            Transport::Tls(s) => write!(f, "Tls({:?})", s.sock.peer_addr().ok()),
            Transport::File(_) => write!(f, "File"),
        }
    }
}

/// Errores que solo significan "todavía no hay progreso"
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

/// Convierte un timeout en milisegundos de la configuración a deadline.
/// `0` significa sin deadline.
pub fn deadline_from_ms(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

impl Transport {
    /// `true` si el transporte es una sesión TLS
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    /// Socket TCP subyacente, si existe
    pub fn tcp(&self) -> Option<&TcpStream> {
        match self {
            Transport::Plain(s) => Some(s),
            Transport::Tls(s) => Some(&s.sock),
            Transport::File(_) => None,
        }
    }

    fn write_once(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(s) => s.write(buf),
            Transport::Tls(s) => {
                let n = s.write(buf)?;
                // Los bytes ya quedaron en el buffer de rustls: un flush
                // incompleto se completa en la próxima operación.
                match s.flush() {
                    Err(e) if !is_transient(&e) => Err(e),
                    _ => Ok(n),
                }
            }
            Transport::File(f) => f.write(buf),
        }
    }

    fn read_once(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(s) => s.read(buf),
            Transport::Tls(s) => match s.read(buf) {
                // Cliente que cierra TCP sin close_notify: lo tratamos como EOF
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(0),
                other => other,
            },
            Transport::File(f) => f.read(buf),
        }
    }

    /// Cierre ordenado: close_notify (TLS), shutdown de escritura y drenado
    /// acotado de la entrada pendiente para que el peer reciba todo antes del RST.
    pub fn close_gracefully(mut self, linger: Duration) {
        if let Transport::Tls(s) = &mut self {
            s.conn.send_close_notify();
            let _ = s.flush();
        }

        let Some(sock) = self.tcp() else {
            return;
        };

        let _ = sock.shutdown(Shutdown::Write);
        let _ = sock.set_read_timeout(Some(Duration::from_millis(10)));

        let start = Instant::now();
        let mut scratch = [0u8; 1024];
        let mut sock = sock;
        while start.elapsed() < linger {
            match sock.read(&mut scratch) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if is_transient(&e) => continue,
                Err(_) => break,
            }
        }
    }
}

/// Escribe lo que el transporte acepte de `buf` en un solo intento efectivo.
///
/// Retorna los bytes escritos (>0), `Ok(0)` solo si `buf` está vacío.
pub fn push(
    stop: &AtomicBool,
    transport: &mut Transport,
    buf: &[u8],
    timeout: Option<Duration>,
) -> Result<usize, TransferError> {
    if buf.is_empty() {
        return Ok(0);
    }

    let start = Instant::now();

    loop {
        let n = match transport.write_once(buf) {
            Ok(0) => return Err(TransferError::Closed),
            Ok(n) => n,
            Err(e) if is_transient(&e) => 0,
            Err(e) => return Err(TransferError::Io(e)),
        };

        if stop.load(Ordering::Acquire) {
            return Err(TransferError::Stopped);
        }

        if n > 0 {
            return Ok(n);
        }

        if let Some(limit) = timeout {
            if start.elapsed() > limit {
                return Err(TransferError::TimedOut);
            }
        }
    }
}

/// Lee lo que haya disponible en el transporte. `Ok(0)` indica EOF
/// (o que `buf` está vacío).
pub fn pull(
    stop: &AtomicBool,
    transport: &mut Transport,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> Result<usize, TransferError> {
    if buf.is_empty() {
        return Ok(0);
    }

    let start = Instant::now();

    loop {
        let progress = match transport.read_once(buf) {
            Ok(n) => Some(n),
            Err(e) if is_transient(&e) => None,
            Err(e) => return Err(TransferError::Io(e)),
        };

        if stop.load(Ordering::Acquire) {
            return Err(TransferError::Stopped);
        }

        if let Some(n) = progress {
            return Ok(n);
        }

        if let Some(limit) = timeout {
            if start.elapsed() > limit {
                return Err(TransferError::TimedOut);
            }
        }
    }
}

/// Repite [`push`] hasta escribir todo `buf`.
///
/// Retorna los bytes escritos hasta el momento; el error solo se propaga
/// si no se llegó a escribir nada.
pub fn push_all(
    stop: &AtomicBool,
    transport: &mut Transport,
    buf: &[u8],
    timeout: Option<Duration>,
) -> Result<usize, TransferError> {
    let mut written = 0;

    while written < buf.len() {
        if stop.load(Ordering::Acquire) {
            if written == 0 {
                return Err(TransferError::Stopped);
            }
            break;
        }

        match push(stop, transport, &buf[written..], timeout) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) => {
                if written == 0 {
                    return Err(e);
                }
                break;
            }
        }
    }

    Ok(written)
}

/// Repite [`pull`] hasta llenar `buf`, llegar a EOF o fallar.
pub fn pull_all(
    stop: &AtomicBool,
    transport: &mut Transport,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> Result<usize, TransferError> {
    let mut read = 0;

    while read < buf.len() {
        if stop.load(Ordering::Acquire) {
            if read == 0 {
                return Err(TransferError::Stopped);
            }
            break;
        }

        match pull(stop, transport, &mut buf[read..], timeout) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) => {
                if read == 0 {
                    return Err(e);
                }
                break;
            }
        }
    }

    Ok(read)
}

/// Vacía los buffers del transporte (registros TLS pendientes).
pub fn flush(
    stop: &AtomicBool,
    transport: &mut Transport,
    timeout: Option<Duration>,
) -> Result<(), TransferError> {
    let start = Instant::now();

    loop {
        let result = match transport {
            Transport::Plain(s) => s.flush(),
            Transport::Tls(s) => s.flush(),
            Transport::File(f) => f.flush(),
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) if is_transient(&e) => {}
            Err(e) => return Err(TransferError::Io(e)),
        }

        if stop.load(Ordering::Acquire) {
            return Err(TransferError::Stopped);
        }

        if let Some(limit) = timeout {
            if start.elapsed() > limit {
                return Err(TransferError::TimedOut);
            }
        }
    }
}

/// Fuente de bytes de la que se alimenta el parser HTTP
pub trait ByteSource {
    /// Igual que [`pull`]: `Ok(0)` es EOF
    fn pull(&mut self, buf: &mut [u8]) -> Result<usize, TransferError>;
}

/// Un transporte junto con el flag de parada y el deadline vigente
pub struct Channel<'a> {
    pub transport: &'a mut Transport,
    pub stop: &'a AtomicBool,
    pub timeout: Option<Duration>,
}

impl ByteSource for Channel<'_> {
    fn pull(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        pull(self.stop, self.transport, buf, self.timeout)
    }
}
