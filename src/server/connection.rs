//! # Ciclo de vida de una conexión
//! src/server/connection.rs
//!
//! Un worker toma un [`Socket`] de la cola y lo convierte en una
//! [`Connection`], que atiende requests uno tras otro hasta cerrarse:
//!
//! ```text
//! leer headers → redirección TLS → autorización → dispatch → handler
//!     → descartar body sobrante → ¿keep-alive? → siguiente request | cerrar
//! ```
//!
//! La conexión se cierra ante un fallo de transporte, un request mal
//! formado o incompleto, un body que no se pudo descartar, una respuesta
//! sin longitud delimitada o un `Connection: close`. Un 404 o un 401 no
//! cierran la conexión.

use crate::error::{HttpError, ServerError, TransferError};
use crate::http::body::{encode_chunk, encode_last_chunk};
use crate::http::{Framer, FramerState, Headers, Request, Response, StatusCode};
use crate::net::transport::{push_all, Channel, Transport};
use crate::net::Socket;
use crate::router::{AuthorizationHandler, HandlerKind};
use crate::server::context::Context;
use crate::server::throttle::{Pace, Throttle};
use crate::server::websocket;
use rustls::{ServerConnection, StreamOwned};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// Versión con la que se responde siempre
const RESPONSE_VERSION: &str = "HTTP/1.1";

const SERVER_NAME: &str = concat!("http_engine/", env!("CARGO_PKG_VERSION"));

/// Tiempo máximo drenando la entrada al cerrar
const CLOSE_LINGER: Duration = Duration::from_millis(500);

/// Granularidad de las pausas del throttle
const PAUSE_SLICE: Duration = Duration::from_millis(100);

/// Estado de un intercambio request/response
#[derive(Debug)]
struct Exchange {
    is_head: bool,
    wants_keep_alive: bool,

    /// `Expect: 100-continue` pendiente de contestar
    expect_continue: bool,

    /// Headers del request, más los trailers una vez leído el body
    headers: Headers,
    trailers: Headers,

    remote_user: Option<String>,
    status: Option<StatusCode>,
    head_sent: bool,
    chunked: bool,
    chunks_finished: bool,

    /// El cliente puede saber dónde termina la respuesta
    delimited: bool,
    bytes_sent: u64,
    started: Instant,
}

impl Default for Exchange {
    fn default() -> Self {
        Self {
            is_head: false,
            wants_keep_alive: false,
            expect_continue: false,
            headers: Headers::new(),
            trailers: Headers::new(),
            remote_user: None,
            status: None,
            head_sent: false,
            chunked: false,
            chunks_finished: false,
            delimited: true,
            bytes_sent: 0,
            started: Instant::now(),
        }
    }
}

impl Exchange {
    fn begin(request: &Request) -> Self {
        Self {
            is_head: request.method() == crate::http::Method::HEAD,
            wants_keep_alive: wants_keep_alive(request),
            expect_continue: request.expects_continue(),
            headers: request.headers().clone(),
            ..Self::default()
        }
    }
}

/// Lo que pide el cliente: `Connection: close` / `keep-alive`, o el
/// default de la versión (HTTP/1.1 mantiene, HTTP/1.0 cierra)
pub fn wants_keep_alive(request: &Request) -> bool {
    let headers = request.headers();
    if headers.has_token("Connection", "close") {
        false
    } else if headers.has_token("Connection", "keep-alive") {
        true
    } else {
        request.is_http11()
    }
}

/// `host:port` → `host` (respeta `[::1]:8080`)
fn host_without_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host)
}

/// Conexión de un cliente, propiedad exclusiva de un worker
pub struct Connection {
    ctx: Arc<Context>,
    transport: Transport,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    tls_redirect: bool,
    worker: usize,
    framer: Framer,
    exchange: Exchange,
    throttle: Option<Throttle>,
    must_close: bool,
    born: Instant,
    requests: u64,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("remote_addr", &self.remote_addr)
            .field("worker", &self.worker)
            .field("tls", &self.transport.is_tls())
            .field("requests", &self.requests)
            .finish()
    }
}

impl Connection {
    /// Envuelve el socket (en TLS si el puerto lo exige)
    pub fn new(ctx: Arc<Context>, socket: Socket, worker: usize) -> Result<Self, ServerError> {
        let transport = if socket.is_tls {
            let config = ctx
                .tls()
                .cloned()
                .ok_or_else(|| ServerError::Tls("TLS port without certificate".into()))?;
            let session =
                ServerConnection::new(config).map_err(|e| ServerError::Tls(e.to_string()))?;
            Transport::Tls(Box::new(StreamOwned::new(session, socket.stream)))
        } else {
            Transport::Plain(socket.stream)
        };

        let now = Instant::now();
        Ok(Self {
            framer: Framer::new(ctx.config().max_request_size),
            throttle: Throttle::new(ctx.config().throttle, now),
            ctx,
            transport,
            local_addr: socket.local_addr,
            remote_addr: socket.remote_addr,
            tls_redirect: socket.tls_redirect,
            worker,
            exchange: Exchange::default(),
            must_close: false,
            born: now,
            requests: 0,
        })
    }

    // === Ciclo de vida ===

    /// Atiende requests hasta que la conexión deba cerrarse
    pub fn serve(mut self) {
        let ctx = Arc::clone(&self.ctx);
        ctx.connection_opened();
        debug!(remote = %self.remote_addr, worker = self.worker, tls = self.is_tls(), "connection opened");

        let mut first = true;
        while !ctx.is_stopping() {
            let timeout = if first {
                ctx.request_timeout()
            } else {
                ctx.keep_alive_timeout()
            };
            self.exchange = Exchange::default();

            let request = match self.read_head(timeout) {
                Ok(request) => request,
                Err(e) => {
                    self.reject(e);
                    break;
                }
            };
            first = false;
            self.exchange = Exchange::begin(&request);

            if let Err(e) = self.process(&ctx, &request) {
                self.handler_failed(&request, e);
            }
            self.complete(&ctx, &request);

            if !self.should_keep_alive() {
                break;
            }
            self.framer.reset();
        }

        debug!(
            remote = %self.remote_addr,
            requests = self.requests,
            lifetime_ms = self.born.elapsed().as_millis() as u64,
            "connection closed"
        );
        self.transport.close_gracefully(CLOSE_LINGER);
        ctx.connection_closed();
    }

    fn read_head(&mut self, timeout: Option<Duration>) -> Result<Request, HttpError> {
        let Self {
            ctx,
            transport,
            framer,
            ..
        } = self;
        let mut channel = Channel {
            transport,
            stop: ctx.stop_flag(),
            timeout,
        };
        framer.read_head(&mut channel)
    }

    /// El request no llegó a parsearse: responder si tiene sentido y cerrar
    fn reject(&mut self, err: HttpError) {
        self.must_close = true;
        let partial = self.framer.buffered() > 0;

        match &err {
            HttpError::IncompleteRequest
            | HttpError::Transport(
                TransferError::Stopped | TransferError::Closed | TransferError::Io(_),
            ) => {
                debug!(remote = %self.remote_addr, error = %err, "peer gone");
            }
            HttpError::Transport(TransferError::TimedOut) if !partial => {
                debug!(remote = %self.remote_addr, "idle timeout");
            }
            _ => {
                warn!(remote = %self.remote_addr, error = %err, "rejecting request");
                let _ = self.send_error(err.status(), &err.to_string());
            }
        }
    }

    /// Redirección, autorización y dispatch de un request
    fn process(&mut self, ctx: &Context, request: &Request) -> Result<(), HttpError> {
        if self.tls_redirect {
            return self.redirect_to_tls(ctx, request);
        }

        let mut gates: Vec<&dyn AuthorizationHandler> = Vec::with_capacity(2);
        if let Some(global) = ctx.global_auth() {
            gates.push(global);
        }
        if let Some(auth) = ctx.registry().authorizer(request.method(), request.path()) {
            gates.push(auth.as_ref());
        }

        for gate in gates {
            match gate.authorize(request, self) {
                Ok(Some(user)) => self.exchange.remote_user = Some(user),
                Ok(None) => {}
                Err(e) => {
                    debug!(remote = %self.remote_addr, uri = request.uri(), error = %e, "authorization failed");
                    let challenge = gate.challenge(request, self, &e);
                    return self.send(challenge);
                }
            }
        }

        let binding = ctx.registry().dispatch(request.method(), request.path());
        match binding.map(|b| b.kind()) {
            Some(HandlerKind::Request(handler)) => handler.handle(request, self),
            Some(HandlerKind::WebSocket(handler)) if request.is_websocket_upgrade() => {
                websocket::serve(self, request, handler.as_ref())
            }
            Some(HandlerKind::WebSocket(_)) => {
                self.send_error(StatusCode::BadRequest, "websocket upgrade required")
            }
            Some(HandlerKind::Authorization(_)) | None => self.send_error(
                StatusCode::NotFound,
                &format!("no handler for {}", request.path()),
            ),
        }
    }

    fn redirect_to_tls(&mut self, ctx: &Context, request: &Request) -> Result<(), HttpError> {
        let Some(port) = ctx.tls_port() else {
            return self.send_error(StatusCode::InternalServerError, "no TLS port configured");
        };

        let host = request
            .header("Host")
            .map(host_without_port)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| match self.local_addr {
                SocketAddr::V4(addr) => addr.ip().to_string(),
                SocketAddr::V6(addr) => format!("[{}]", addr.ip()),
            });
        let target = if request.uri().starts_with('/') {
            request.uri()
        } else {
            request.path()
        };

        self.send(Response::redirect(&format!("https://{host}:{port}{target}")))
    }

    fn handler_failed(&mut self, request: &Request, err: HttpError) {
        self.must_close = true;

        if err.is_transport() || matches!(err, HttpError::IncompleteBody) {
            // El peer ya no está: no hay a quién responder
            debug!(remote = %self.remote_addr, uri = request.uri(), error = %err, "peer gone");
            return;
        }

        warn!(remote = %self.remote_addr, uri = request.uri(), error = %err, "request failed");
        let _ = self.send_error(err.status(), &err.to_string());
    }

    /// Cierra el intercambio: respuesta por defecto, terminador chunked,
    /// descarte del body sobrante y access log
    fn complete(&mut self, ctx: &Context, request: &Request) {
        if !self.exchange.head_sent && !self.must_close {
            let _ = self.send_error(StatusCode::InternalServerError, "handler sent no response");
        }

        if self.exchange.chunked && !self.exchange.chunks_finished && self.finish_chunks().is_err() {
            self.must_close = true;
        }

        if self.exchange.head_sent && !self.exchange.delimited {
            self.must_close = true;
        }

        if !self.must_close {
            let unsent_continue = self.exchange.expect_continue
                && matches!(self.framer.state(), FramerState::HeadersComplete(_));
            if unsent_continue {
                // El cliente espera el 100 antes de enviar el body
                self.must_close = true;
            } else if let Err(e) = self.discard_body() {
                debug!(remote = %self.remote_addr, error = %e, "cannot discard request body");
                self.must_close = true;
            }
        }

        ctx.request_served();
        self.requests += 1;

        info!(
            target: "http_engine::access",
            remote = %self.remote_addr,
            method = %request.method(),
            uri = request.uri(),
            version = request.version(),
            status = self.exchange.status.map(|s| s.as_u16()).unwrap_or(0),
            bytes = self.exchange.bytes_sent,
            elapsed_ms = self.exchange.started.elapsed().as_millis() as u64,
            user = self.exchange.remote_user.as_deref().unwrap_or("-"),
            worker = self.worker,
        );
    }

    /// Keep-alive habilitado, sin errores, sin parada y pedido por el cliente
    fn should_keep_alive(&self) -> bool {
        self.ctx.config().enable_keep_alive
            && !self.must_close
            && !self.ctx.is_stopping()
            && self.exchange.wants_keep_alive
    }

    // === Lectura del body ===

    /// Lee bytes decodificados del body. `Ok(0)` al terminar.
    ///
    /// Contesta `100 Continue` antes de la primera lectura si el cliente lo pidió.
    pub fn read_body(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        if self.exchange.expect_continue
            && matches!(self.framer.state(), FramerState::HeadersComplete(_))
        {
            self.exchange.expect_continue = false;
            if !self.exchange.head_sent {
                let ctx = Arc::clone(&self.ctx);
                push_all(
                    ctx.stop_flag(),
                    &mut self.transport,
                    b"HTTP/1.1 100 Continue\r\n\r\n",
                    ctx.request_timeout(),
                )?;
            }
        }

        let Self {
            ctx,
            transport,
            framer,
            ..
        } = self;
        let mut channel = Channel {
            transport,
            stop: ctx.stop_flag(),
            timeout: ctx.request_timeout(),
        };
        let n = framer.read_body(&mut channel, buf)?;

        if n == 0 && !self.framer.trailers().is_empty() {
            let trailers = self.framer.take_trailers();
            self.exchange.headers.extend(trailers.clone());
            self.exchange.trailers = trailers;
        }
        Ok(n)
    }

    /// Lee el body completo; falla si supera `limit` bytes
    pub fn read_body_to_end(&mut self, limit: usize) -> Result<Vec<u8>, HttpError> {
        let mut body = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            match self.read_body(&mut buf)? {
                0 => return Ok(body),
                n if body.len() + n > limit => return Err(HttpError::RequestTooLarge),
                n => body.extend_from_slice(&buf[..n]),
            }
        }
    }

    /// Copia el body decodificado a otro transporte (p. ej. un archivo)
    pub fn forward_body_to(&mut self, dest: &mut Transport) -> Result<u64, HttpError> {
        let ctx = Arc::clone(&self.ctx);
        let mut buf = [0u8; 8192];
        let mut total = 0u64;

        loop {
            let n = self.read_body(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            let written = push_all(ctx.stop_flag(), dest, &buf[..n], ctx.request_timeout())?;
            if written < n {
                return Err(TransferError::Closed.into());
            }
            total += n as u64;
        }
    }

    fn discard_body(&mut self) -> Result<(), HttpError> {
        let Self {
            ctx,
            transport,
            framer,
            ..
        } = self;
        let mut channel = Channel {
            transport,
            stop: ctx.stop_flag(),
            timeout: ctx.request_timeout(),
        };
        framer.discard_body(&mut channel).map(|_| ())
    }

    /// Bytes crudos tras un upgrade (WebSocket). Falla si el peer cierra.
    pub(crate) fn read_raw_exact(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<(), HttpError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = {
                let Self {
                    ctx,
                    transport,
                    framer,
                    ..
                } = &mut *self;
                let mut channel = Channel {
                    transport,
                    stop: ctx.stop_flag(),
                    timeout,
                };
                framer.read_raw(&mut channel, &mut buf[filled..])?
            };
            if n == 0 {
                return Err(TransferError::Closed.into());
            }
            filled += n;
        }
        Ok(())
    }

    // === Escritura de la respuesta ===

    /// Completa los headers de transporte y marca la respuesta como iniciada
    fn prepare_head(&mut self, response: &mut Response) {
        let keep_alive = self.should_keep_alive() && response.is_delimited();

        let headers = response.headers_mut();
        if !headers.contains("Date") {
            headers.set("Date", &httpdate::fmt_http_date(SystemTime::now()));
        }
        if !headers.contains("Server") {
            headers.set("Server", SERVER_NAME);
        }
        if !headers.contains("Connection") {
            headers.set("Connection", if keep_alive { "keep-alive" } else { "close" });
        }

        self.exchange.chunked = response.headers().has_token("Transfer-Encoding", "chunked");
        self.exchange.delimited = response.is_delimited();
        self.exchange.status = Some(response.status());
        self.exchange.head_sent = true;

        if !self.exchange.delimited || response.headers().has_token("Connection", "close") {
            self.must_close = true;
        }
    }

    /// Envía una respuesta completa (sin body si el request es HEAD)
    pub fn send(&mut self, mut response: Response) -> Result<(), HttpError> {
        if self.exchange.head_sent {
            warn!(remote = %self.remote_addr, "response already sent");
            self.must_close = true;
            return Ok(());
        }

        self.prepare_head(&mut response);
        self.push_bytes(&response.head_bytes(RESPONSE_VERSION))?;

        if !self.exchange.is_head && response.status().allows_body() {
            self.push_bytes(response.body())?;
        }
        Ok(())
    }

    /// Envía solo status line y headers; el body sigue con [`write`] o
    /// [`write_chunk`]
    ///
    /// [`write`]: Connection::write
    /// [`write_chunk`]: Connection::write_chunk
    pub fn send_head(&mut self, mut response: Response) -> Result<(), HttpError> {
        if self.exchange.head_sent {
            self.must_close = true;
            return Ok(());
        }
        self.prepare_head(&mut response);
        self.push_bytes(&response.head_bytes(RESPONSE_VERSION))
    }

    /// Escribe bytes del body tal cual. Sin headers previos, la
    /// respuesta queda sin delimitar y la conexión se cerrará.
    pub fn write(&mut self, data: &[u8]) -> Result<(), HttpError> {
        if !self.exchange.head_sent {
            self.exchange.head_sent = true;
            self.exchange.delimited = false;
            self.must_close = true;
        }
        if self.exchange.is_head {
            return Ok(());
        }
        self.push_bytes(data)
    }

    /// Escribe un chunk (respuesta con `Transfer-Encoding: chunked`)
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<(), HttpError> {
        if !self.exchange.chunked {
            // El cliente leería el framing como datos del body
            self.must_close = true;
            return Err(HttpError::InvalidResponse(
                "write_chunk without Transfer-Encoding: chunked".into(),
            ));
        }
        if data.is_empty() || self.exchange.is_head {
            return Ok(());
        }
        let mut framed = Vec::with_capacity(data.len() + 16);
        encode_chunk(data, &mut framed);
        self.push_bytes(&framed)
    }

    /// Chunk terminador. Se envía solo si el handler no lo hizo.
    pub fn finish_chunks(&mut self) -> Result<(), HttpError> {
        if !self.exchange.chunked || self.exchange.chunks_finished {
            return Ok(());
        }
        self.exchange.chunks_finished = true;
        if self.exchange.is_head {
            return Ok(());
        }
        let mut last = Vec::with_capacity(5);
        encode_last_chunk(&mut last);
        self.push_bytes(&last)
    }

    /// Error JSON. Si la respuesta ya empezó, solo fuerza el cierre.
    pub fn send_error(&mut self, status: StatusCode, message: &str) -> Result<(), HttpError> {
        if self.exchange.head_sent {
            self.must_close = true;
            return Ok(());
        }
        self.send(Response::error(status, message))
    }

    /// Escritura con límite de ancho de banda
    fn push_bytes(&mut self, data: &[u8]) -> Result<(), HttpError> {
        let ctx = Arc::clone(&self.ctx);
        let mut offset = 0;

        while offset < data.len() {
            let wanted = data.len() - offset;
            let n = match self.throttle.as_mut().map(|t| t.plan(Instant::now(), wanted)) {
                None => wanted,
                Some(Pace::Send(n)) => n,
                Some(Pace::Sleep(pause)) => {
                    self.pause(&ctx, pause)?;
                    continue;
                }
            };

            let written = match push_all(
                ctx.stop_flag(),
                &mut self.transport,
                &data[offset..offset + n],
                ctx.request_timeout(),
            ) {
                Ok(written) => written,
                Err(e) => {
                    self.must_close = true;
                    return Err(e.into());
                }
            };

            if let Some(throttle) = self.throttle.as_mut() {
                throttle.record(written);
            }
            self.exchange.bytes_sent += written as u64;
            offset += written;

            if written < n {
                self.must_close = true;
                return Err(TransferError::Closed.into());
            }
        }

        Ok(())
    }

    /// Espera del throttle, interrumpible por la parada del servidor
    fn pause(&self, ctx: &Context, duration: Duration) -> Result<(), HttpError> {
        let deadline = Instant::now() + duration;
        loop {
            if ctx.is_stopping() {
                return Err(TransferError::Stopped.into());
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(PAUSE_SLICE));
        }
    }

    // === Accesores ===

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_tls(&self) -> bool {
        self.transport.is_tls()
    }

    /// Índice del worker que atiende la conexión
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Usuario autenticado en el request actual
    pub fn remote_user(&self) -> Option<&str> {
        self.exchange.remote_user.as_deref()
    }

    /// Status de la respuesta ya enviada
    pub fn status(&self) -> Option<StatusCode> {
        self.exchange.status
    }

    /// Bytes enviados en el request actual
    pub fn bytes_sent(&self) -> u64 {
        self.exchange.bytes_sent
    }

    /// Trailers del body chunked (disponibles tras leerlo completo)
    pub fn trailers(&self) -> &Headers {
        &self.exchange.trailers
    }

    /// Headers del request actual. Una vez leído el body chunked incluye
    /// también sus trailers, al final.
    pub fn headers(&self) -> &Headers {
        &self.exchange.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.exchange.headers.get(name)
    }

    /// Cambia el límite de ancho de banda de esta conexión (0 = sin límite)
    pub fn set_throttle(&mut self, rate: u64) {
        self.throttle = Throttle::new(rate, Instant::now());
    }

    /// Cierra la conexión al terminar el request actual
    pub fn set_must_close(&mut self) {
        self.must_close = true;
    }

    /// Requests completados en esta conexión
    pub fn requests(&self) -> u64 {
        self.requests
    }
}
