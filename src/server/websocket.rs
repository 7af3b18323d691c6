//! # WebSocket (RFC 6455)
//! src/server/websocket.rs
//!
//! Handshake sobre una conexión ya parseada y bucle de frames. Los frames
//! del cliente llegan enmascarados; los del servidor salen sin máscara y
//! con FIN. La fragmentación no se reensambla: cada frame llega al
//! handler con su opcode tal cual.

use crate::error::{HttpError, TransferError};
use crate::http::{Request, Response, StatusCode};
use crate::router::WebSocketHandler;
use crate::server::connection::Connection;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use tracing::debug;

/// GUID fijo del handshake
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub const OPCODE_CONTINUATION: u8 = 0x0;
pub const OPCODE_TEXT: u8 = 0x1;
pub const OPCODE_BINARY: u8 = 0x2;
pub const OPCODE_CLOSE: u8 = 0x8;
pub const OPCODE_PING: u8 = 0x9;
pub const OPCODE_PONG: u8 = 0xA;

/// Payload máximo aceptado en un frame
pub const MAX_FRAME_PAYLOAD: u64 = 16 * 1024 * 1024;

/// `Sec-WebSocket-Accept` para una `Sec-WebSocket-Key`
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Frame servidor → cliente: FIN, sin máscara
pub fn encode_frame(opcode: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(data.len() + 10);
    frame.push(0x80 | (opcode & 0x0F));

    match data.len() {
        len if len < 126 => frame.push(len as u8),
        len if len <= u16::MAX as usize => {
            frame.push(126);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        }
        len => {
            frame.push(127);
            frame.extend_from_slice(&(len as u64).to_be_bytes());
        }
    }

    frame.extend_from_slice(data);
    frame
}

/// Frame recibido (payload ya desenmascarado)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: u8,
    pub payload: Vec<u8>,
}

fn read_frame(conn: &mut Connection) -> Result<Frame, HttpError> {
    let timeout = conn.context().websocket_timeout();

    let mut header = [0u8; 2];
    conn.read_raw_exact(&mut header, timeout)?;
    let fin = header[0] & 0x80 != 0;
    let opcode = header[0] & 0x0F;
    let masked = header[1] & 0x80 != 0;

    let len = match header[1] & 0x7F {
        126 => {
            let mut ext = [0u8; 2];
            conn.read_raw_exact(&mut ext, timeout)?;
            u16::from_be_bytes(ext) as u64
        }
        127 => {
            let mut ext = [0u8; 8];
            conn.read_raw_exact(&mut ext, timeout)?;
            u64::from_be_bytes(ext)
        }
        n => n as u64,
    };
    if len > MAX_FRAME_PAYLOAD {
        return Err(HttpError::RequestTooLarge);
    }

    let mut mask = [0u8; 4];
    if masked {
        conn.read_raw_exact(&mut mask, timeout)?;
    }

    let mut payload = vec![0u8; len as usize];
    conn.read_raw_exact(&mut payload, timeout)?;
    if masked {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }
    }

    Ok(Frame {
        fin,
        opcode,
        payload,
    })
}

/// Vista de la conexión entregada a los callbacks del handler
pub struct WebSocket<'a> {
    conn: &'a mut Connection,
}

impl<'a> WebSocket<'a> {
    /// Envía un frame al cliente
    pub fn send(&mut self, opcode: u8, data: &[u8]) -> Result<(), HttpError> {
        self.conn.write(&encode_frame(opcode, data))
    }

    pub fn send_text(&mut self, text: &str) -> Result<(), HttpError> {
        self.send(OPCODE_TEXT, text.as_bytes())
    }

    /// Frame de cierre con código de estado
    pub fn close(&mut self, code: u16) -> Result<(), HttpError> {
        self.send(OPCODE_CLOSE, &code.to_be_bytes())
    }

    pub fn connection(&self) -> &Connection {
        &*self.conn
    }
}

/// Handshake y bucle de frames de un request `Upgrade: websocket`
pub(crate) fn serve(
    conn: &mut Connection,
    request: &Request,
    handler: &dyn WebSocketHandler,
) -> Result<(), HttpError> {
    if request.header("Sec-WebSocket-Version").map(str::trim) != Some("13") {
        return conn.send(
            Response::error(StatusCode::UpgradeRequired, "unsupported websocket version")
                .with_header("Sec-WebSocket-Version", "13"),
        );
    }
    let Some(key) = request.header("Sec-WebSocket-Key") else {
        return conn.send_error(StatusCode::BadRequest, "missing Sec-WebSocket-Key");
    };

    if !handler.connect(request, conn) {
        debug!(remote = %conn.remote_addr(), uri = request.uri(), "websocket refused");
        conn.set_must_close();
        return Ok(());
    }

    conn.send(
        Response::new(StatusCode::SwitchingProtocols)
            .with_header("Upgrade", "websocket")
            .with_header("Connection", "Upgrade")
            .with_header("Sec-WebSocket-Accept", &accept_key(key)),
    )?;
    conn.set_must_close();

    handler.ready(&mut WebSocket { conn: &mut *conn });
    let outcome = frame_loop(conn, handler);
    handler.close(conn);

    match outcome {
        Err(HttpError::Transport(TransferError::Closed | TransferError::Stopped)) => Ok(()),
        other => other,
    }
}

fn frame_loop(conn: &mut Connection, handler: &dyn WebSocketHandler) -> Result<(), HttpError> {
    loop {
        let frame = read_frame(conn)?;
        match frame.opcode {
            OPCODE_CLOSE => {
                conn.write(&encode_frame(OPCODE_CLOSE, &frame.payload))?;
                return Ok(());
            }
            OPCODE_PING => conn.write(&encode_frame(OPCODE_PONG, &frame.payload))?,
            OPCODE_PONG => {}
            opcode => {
                let opcode = if frame.fin { opcode | 0x80 } else { opcode };
                if !handler.data(&mut WebSocket { conn: &mut *conn }, opcode, &frame.payload) {
                    return Ok(());
                }
            }
        }
    }
}
