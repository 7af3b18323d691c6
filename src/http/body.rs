//! # Política de lectura del body
//! src/http/body.rs
//!
//! - [`BodyKind`]: cómo se delimita el body de un request
//! - [`ChunkState`]: posición del decodificador chunked
//! - Codificación chunked para responses y tests

use crate::error::HttpError;
use crate::http::Headers;

/// Longitud máxima de una línea de tamaño de chunk (con extensiones)
pub const MAX_CHUNK_LINE: usize = 256;

/// Delimitación del body de un request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Sin body (ni `Content-Length` ni `Transfer-Encoding`)
    None,

    /// Exactamente N bytes
    ContentLength(u64),

    /// `Transfer-Encoding: chunked`
    Chunked,
}

impl BodyKind {
    /// Elige la política a partir de los headers.
    ///
    /// `Transfer-Encoding: chunked` tiene prioridad sobre `Content-Length`.
    /// Sin ninguno de los dos el body es vacío: nunca se lee hasta el cierre.
    pub fn from_headers(headers: &Headers) -> Result<Self, HttpError> {
        if let Some(te) = headers.get("Transfer-Encoding") {
            let last = te.rsplit(',').next().unwrap_or("").trim();
            if last.eq_ignore_ascii_case("chunked") {
                return Ok(BodyKind::Chunked);
            }
            return Err(HttpError::MalformedRequest(format!(
                "unsupported transfer-encoding: {te}"
            )));
        }

        let mut length = None;
        for value in headers.get_all("Content-Length") {
            let parsed = parse_content_length(value)?;
            if length.is_some_and(|prev| prev != parsed) {
                return Err(HttpError::MalformedRequest(
                    "conflicting content-length headers".into(),
                ));
            }
            length = Some(parsed);
        }

        Ok(match length {
            Some(0) | None => BodyKind::None,
            Some(n) => BodyKind::ContentLength(n),
        })
    }
}

fn parse_content_length(value: &str) -> Result<u64, HttpError> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HttpError::MalformedRequest(format!(
            "invalid content-length: {value}"
        )));
    }
    value
        .parse()
        .map_err(|_| HttpError::MalformedRequest(format!("invalid content-length: {value}")))
}

/// Estado del decodificador chunked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Esperando `<hex-size>[;ext]CRLF`
    Size,

    /// Quedan N bytes de datos del chunk actual
    Data(u64),

    /// Esperando el CRLF que cierra los datos del chunk
    DataEnd,

    /// Después del chunk de tamaño cero: trailers hasta la línea vacía
    Trailers,

    Done,
}

/// Parsea la línea de tamaño de un chunk, ignorando extensiones (`;name=value`)
pub fn parse_chunk_size(line: &[u8]) -> Result<u64, HttpError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| HttpError::MalformedChunk("non-ASCII chunk size".into()))?;
    let size = text.split(';').next().unwrap_or("").trim();

    if size.is_empty() || size.len() > 16 || !size.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(HttpError::MalformedChunk(format!("invalid chunk size: {size:?}")));
    }

    u64::from_str_radix(size, 16)
        .map_err(|_| HttpError::MalformedChunk(format!("invalid chunk size: {size:?}")))
}

/// Agrega a `out` un chunk con `data`. Un `data` vacío no produce nada
/// (el chunk vacío es el terminador, ver [`encode_last_chunk`]).
pub fn encode_chunk(data: &[u8], out: &mut Vec<u8>) {
    if data.is_empty() {
        return;
    }
    out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Chunk terminador sin trailers
pub fn encode_last_chunk(out: &mut Vec<u8>) {
    out.extend_from_slice(b"0\r\n\r\n");
}

/// Codifica `body` completo en chunks de como mucho `chunk_size` bytes
pub fn encode_chunked(body: &[u8], chunk_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 32);
    for chunk in body.chunks(chunk_size.max(1)) {
        encode_chunk(chunk, &mut out);
    }
    encode_last_chunk(&mut out);
    out
}
