//! # Framer HTTP
//! src/http/parser.rs
//!
//! Máquina de estados por conexión que convierte un flujo de bytes en
//! requests y bodies:
//!
//! ```text
//! AwaitingHeaders → HeadersComplete → ReadingBody{ContentLength|Chunked} → Complete
//! ```
//!
//! El buffer es propio del framer (tamaño `max_request_size`) y se maneja
//! con dos cursores: `start` (primer byte sin consumir) y `end` (fin de los
//! datos recibidos). Los bytes que sobran tras un request (pipelining) se
//! conservan para el siguiente.
//!
//! El resultado no depende de cómo lleguen partidos los bytes: cada etapa
//! vuelve a pedir datos a la [`ByteSource`] hasta tener lo que necesita.

use crate::error::HttpError;
use crate::http::body::{parse_chunk_size, BodyKind, ChunkState, MAX_CHUNK_LINE};
use crate::http::request::{is_token_byte, MAX_HEADERS};
use crate::http::{Headers, Request};
use crate::net::ByteSource;

/// Resultado de buscar el fin del bloque de headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadScan {
    /// Todavía no llegó la línea vacía
    Partial,

    /// El bloque termina en este offset (incluye la línea vacía)
    Complete(usize),

    /// Byte de control no permitido dentro de los headers
    Invalid,
}

/// Busca `CRLFCRLF` (o `LFLF`, o mezclas) validando los bytes a la vez.
///
/// Son inválidos los bytes de control excepto CR, LF y TAB; los bytes
/// `>= 0x80` se aceptan.
pub fn scan_head(buf: &[u8]) -> HeadScan {
    for (i, &b) in buf.iter().enumerate() {
        if (b < 0x20 && b != b'\r' && b != b'\n' && b != b'\t') || b == 0x7f {
            return HeadScan::Invalid;
        }

        if b == b'\n' {
            match buf.get(i + 1) {
                Some(b'\n') => return HeadScan::Complete(i + 2),
                Some(b'\r') if buf.get(i + 2) == Some(&b'\n') => {
                    return HeadScan::Complete(i + 3)
                }
                _ => {}
            }
        }
    }

    HeadScan::Partial
}

/// Estados del framer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    AwaitingHeaders,

    /// Headers parseados; todavía no se tocó el body
    HeadersComplete(BodyKind),

    ReadingBody(BodyKind),

    /// El request actual no tiene más bytes de body
    Complete,
}

/// Framer de una conexión
#[derive(Debug)]
pub struct Framer {
    buf: Vec<u8>,
    start: usize,
    end: usize,
    state: FramerState,

    /// Bytes de body pendientes (Content-Length)
    remaining: u64,
    chunk: ChunkState,
    trailers: Headers,
    /// Bytes de trailers recibidos, acotados por el tamaño del buffer
    trailer_bytes: usize,
    body_read: u64,
}

impl Framer {
    pub fn new(max_request_size: usize) -> Self {
        Self {
            buf: vec![0; max_request_size.max(1)],
            start: 0,
            end: 0,
            state: FramerState::AwaitingHeaders,
            remaining: 0,
            chunk: ChunkState::Size,
            trailers: Headers::new(),
            trailer_bytes: 0,
            body_read: 0,
        }
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Bytes recibidos y aún no consumidos
    pub fn buffered(&self) -> usize {
        self.end - self.start
    }

    /// Bytes de body entregados al handler en el request actual
    pub fn body_read(&self) -> u64 {
        self.body_read
    }

    /// Trailers recibidos tras el último chunk
    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }

    pub fn take_trailers(&mut self) -> Headers {
        std::mem::take(&mut self.trailers)
    }

    /// Prepara el framer para el siguiente request de la conexión,
    /// conservando los bytes ya recibidos
    pub fn reset(&mut self) {
        self.state = FramerState::AwaitingHeaders;
        self.remaining = 0;
        self.chunk = ChunkState::Size;
        self.trailers = Headers::new();
        self.trailer_bytes = 0;
        self.body_read = 0;
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Mueve los bytes pendientes al inicio del buffer
    fn compact(&mut self) {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
    }

    /// Pide más bytes a la fuente. `Ok(0)` es EOF.
    fn fill(&mut self, src: &mut dyn ByteSource) -> Result<usize, HttpError> {
        if self.end == self.buf.len() {
            self.compact();
        }
        let n = src.pull(&mut self.buf[self.end..])?;
        self.end += n;
        Ok(n)
    }

    /// Lee el siguiente bloque de headers y fija la política de body.
    ///
    /// Los CR/LF sueltos antes de la request line se ignoran.
    pub fn read_head(&mut self, src: &mut dyn ByteSource) -> Result<Request, HttpError> {
        if self.state != FramerState::AwaitingHeaders {
            self.reset();
        }

        loop {
            while self.start < self.end && matches!(self.buf[self.start], b'\r' | b'\n') {
                self.start += 1;
            }

            match scan_head(&self.buf[self.start..self.end]) {
                HeadScan::Complete(len) => {
                    let head = &self.buf[self.start..self.start + len];
                    let request = Request::parse(head);
                    self.start += len;
                    let request = request?;
                    self.begin_body(BodyKind::from_headers(request.headers())?);
                    return Ok(request);
                }
                HeadScan::Invalid => {
                    return Err(HttpError::MalformedRequest(
                        "invalid character in header block".into(),
                    ));
                }
                HeadScan::Partial => {
                    if self.buffered() >= self.buf.len() {
                        return Err(HttpError::RequestTooLarge);
                    }
                    if self.fill(src)? == 0 {
                        return Err(HttpError::IncompleteRequest);
                    }
                }
            }
        }
    }

    fn begin_body(&mut self, kind: BodyKind) {
        self.body_read = 0;
        self.state = match kind {
            BodyKind::None => FramerState::Complete,
            BodyKind::ContentLength(n) => {
                self.remaining = n;
                FramerState::HeadersComplete(kind)
            }
            BodyKind::Chunked => {
                self.chunk = ChunkState::Size;
                self.trailers = Headers::new();
                self.trailer_bytes = 0;
                FramerState::HeadersComplete(kind)
            }
        };
    }

    /// Lee bytes decodificados del body en `out`. `Ok(0)` marca el fin del body.
    pub fn read_body(
        &mut self,
        src: &mut dyn ByteSource,
        out: &mut [u8],
    ) -> Result<usize, HttpError> {
        if out.is_empty() {
            return Ok(0);
        }

        let kind = match self.state {
            FramerState::HeadersComplete(kind) | FramerState::ReadingBody(kind) => kind,
            FramerState::AwaitingHeaders | FramerState::Complete => return Ok(0),
        };
        self.state = FramerState::ReadingBody(kind);

        let n = match kind {
            BodyKind::ContentLength(_) => self.read_content_length(src, out)?,
            BodyKind::Chunked => self.read_chunked(src, out)?,
            BodyKind::None => 0,
        };

        if n == 0 {
            self.state = FramerState::Complete;
        }
        self.body_read += n as u64;
        Ok(n)
    }

    /// Copia del buffer interno a `out`, como mucho `limit` bytes
    fn take_buffered(&mut self, out: &mut [u8], limit: u64) -> usize {
        let n = (self.buffered() as u64).min(limit).min(out.len() as u64) as usize;
        out[..n].copy_from_slice(&self.buf[self.start..self.start + n]);
        self.start += n;
        n
    }

    fn read_content_length(
        &mut self,
        src: &mut dyn ByteSource,
        out: &mut [u8],
    ) -> Result<usize, HttpError> {
        if self.remaining == 0 {
            return Ok(0);
        }

        let n = if self.buffered() > 0 {
            self.take_buffered(out, self.remaining)
        } else {
            // Directo al buffer del handler, sin pasar de lo declarado
            let want = (out.len() as u64).min(self.remaining) as usize;
            let n = src.pull(&mut out[..want])?;
            if n == 0 {
                return Err(HttpError::IncompleteBody);
            }
            n
        };

        self.remaining -= n as u64;
        Ok(n)
    }

    fn read_chunked(
        &mut self,
        src: &mut dyn ByteSource,
        out: &mut [u8],
    ) -> Result<usize, HttpError> {
        loop {
            match self.chunk {
                ChunkState::Size => {
                    let line = self.read_line(src, MAX_CHUNK_LINE)?;
                    self.chunk = match parse_chunk_size(&line)? {
                        0 => ChunkState::Trailers,
                        size => ChunkState::Data(size),
                    };
                }
                ChunkState::Data(left) => {
                    if self.buffered() == 0 && self.fill(src)? == 0 {
                        return Err(HttpError::IncompleteBody);
                    }
                    let n = self.take_buffered(out, left);
                    let left = left - n as u64;
                    self.chunk = if left == 0 {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data(left)
                    };
                    return Ok(n);
                }
                ChunkState::DataEnd => {
                    let line = self.read_line(src, MAX_CHUNK_LINE)?;
                    if !line.is_empty() {
                        return Err(HttpError::MalformedChunk(
                            "missing CRLF after chunk data".into(),
                        ));
                    }
                    self.chunk = ChunkState::Size;
                }
                ChunkState::Trailers => {
                    let line = self.read_line(src, self.buf.len())?;
                    if line.is_empty() {
                        self.chunk = ChunkState::Done;
                        continue;
                    }
                    // La línea más su CRLF cuentan contra max_request_size
                    self.trailer_bytes += line.len() + 2;
                    if self.trailer_bytes >= self.buf.len() {
                        return Err(HttpError::RequestTooLarge);
                    }
                    if self.trailers.len() == MAX_HEADERS {
                        return Err(HttpError::MalformedChunk("too many trailers".into()));
                    }
                    let text = String::from_utf8_lossy(&line);
                    let (name, value) = text
                        .split_once(':')
                        .filter(|(name, _)| !name.is_empty() && name.bytes().all(is_token_byte))
                        .ok_or_else(|| HttpError::MalformedChunk(format!("invalid trailer: {text}")))?;
                    self.trailers.append(name, value.trim());
                }
                ChunkState::Done => return Ok(0),
            }
        }
    }

    /// Lee una línea terminada en LF (sin el CR/LF final)
    fn read_line(&mut self, src: &mut dyn ByteSource, limit: usize) -> Result<Vec<u8>, HttpError> {
        loop {
            let pending = &self.buf[self.start..self.end];
            if let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let mut line = pending[..pos].to_vec();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                self.start += pos + 1;
                return Ok(line);
            }

            if pending.len() >= limit || pending.len() >= self.buf.len() {
                return Err(HttpError::MalformedChunk("chunk line too long".into()));
            }
            if self.fill(src)? == 0 {
                return Err(HttpError::IncompleteBody);
            }
        }
    }

    /// Bytes crudos una vez abandonado HTTP (WebSocket): primero lo que
    /// quedó en el buffer, después la fuente. `Ok(0)` es EOF.
    pub fn read_raw(
        &mut self,
        src: &mut dyn ByteSource,
        out: &mut [u8],
    ) -> Result<usize, HttpError> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.buffered() > 0 {
            return Ok(self.take_buffered(out, u64::MAX));
        }
        Ok(src.pull(out)?)
    }

    /// Lee y descarta lo que quede del body actual
    pub fn discard_body(&mut self, src: &mut dyn ByteSource) -> Result<u64, HttpError> {
        let mut scratch = [0u8; 4096];
        let mut discarded = 0u64;
        loop {
            match self.read_body(src, &mut scratch)? {
                0 => return Ok(discarded),
                n => discarded += n as u64,
            }
        }
    }
}
