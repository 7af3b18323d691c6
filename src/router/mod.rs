//! # Registro de Handlers
//! src/router/mod.rs
//!
//! Tabla ordenada de bindings `patrón de URI → handler`.
//!
//! ## Arquitectura
//!
//! ```text
//! Request → authorizer(path) → dispatch(method, path) → Handler → Response
//! ```
//!
//! - Un patrón sin `*` coincide solo con el path exacto
//! - Un `*` final coincide con cualquier sufijo (incluido el vacío)
//! - La comparación distingue mayúsculas y está anclada al inicio del path
//! - Gana el primer binding registrado: los patrones más específicos van primero
//!
//! Hay tres tipos de handler, cada uno con su trait:
//! [`RequestHandler`], [`WebSocketHandler`] y [`AuthorizationHandler`].
//! Los datos de usuario se capturan en el propio handler.
//!
//! El registro se arma antes de arrancar el servidor y después solo se lee.

use crate::error::{AuthError, HttpError};
use crate::http::{Method, Request, Response, StatusCode};
use crate::server::websocket::WebSocket;
use crate::server::Connection;
use std::sync::Arc;

/// Handler de requests normales: escribe la respuesta en la conexión
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: &Request, conn: &mut Connection) -> Result<(), HttpError>;
}

/// Cualquier closure con la firma adecuada es un handler
impl<F> RequestHandler for F
where
    F: Fn(&Request, &mut Connection) -> Result<(), HttpError> + Send + Sync,
{
    fn handle(&self, request: &Request, conn: &mut Connection) -> Result<(), HttpError> {
        self(request, conn)
    }
}

/// Callbacks de una sesión WebSocket
pub trait WebSocketHandler: Send + Sync {
    /// Antes de responder el handshake. `false` rechaza la conexión.
    fn connect(&self, _request: &Request, _conn: &Connection) -> bool {
        true
    }

    /// Handshake completado; se puede enviar con `ws.send`
    fn ready(&self, _ws: &mut WebSocket<'_>) {}

    /// Un frame recibido. `opcode` lleva el bit FIN (0x80) si el frame es
    /// final. `false` cierra la sesión.
    fn data(&self, ws: &mut WebSocket<'_>, opcode: u8, payload: &[u8]) -> bool;

    /// La sesión terminó
    fn close(&self, _conn: &Connection) {}
}

/// Control de acceso previo al handler
pub trait AuthorizationHandler: Send + Sync {
    /// `Ok(Some(user))` si el request queda autenticado con ese usuario,
    /// `Ok(None)` si se permite sin identidad
    fn authorize(&self, request: &Request, conn: &Connection) -> Result<Option<String>, AuthError>;

    /// Respuesta cuando `authorize` falla
    fn challenge(&self, _request: &Request, _conn: &Connection, _error: &AuthError) -> Response {
        Response::error(StatusCode::Unauthorized, "unauthorized")
    }
}

/// Tipo de handler de un binding
#[derive(Clone)]
pub enum HandlerKind {
    Request(Arc<dyn RequestHandler>),
    WebSocket(Arc<dyn WebSocketHandler>),
    Authorization(Arc<dyn AuthorizationHandler>),
}

impl HandlerKind {
    fn name(&self) -> &'static str {
        match self {
            HandlerKind::Request(_) => "request",
            HandlerKind::WebSocket(_) => "websocket",
            HandlerKind::Authorization(_) => "authorization",
        }
    }

    fn same_kind(&self, other: &HandlerKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl std::fmt::Debug for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Un patrón de URI asociado a un handler
#[derive(Debug, Clone)]
pub struct HandlerBinding {
    pattern: String,

    /// `None` acepta cualquier método
    method: Option<Method>,

    kind: HandlerKind,
}

impl HandlerBinding {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    pub fn kind(&self) -> &HandlerKind {
        &self.kind
    }

    fn matches(&self, method: Method, path: &str) -> bool {
        self.method.map_or(true, |m| m == method) && pattern_matches(&self.pattern, path)
    }
}

/// `true` si `path` coincide con `pattern` (exacto o prefijo con `*` final)
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => pattern == path,
    }
}

/// Lista ordenada de bindings
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    bindings: Vec<HandlerBinding>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un binding para cualquier método
    pub fn register(&mut self, pattern: &str, kind: HandlerKind) {
        self.push(pattern, None, kind);
    }

    /// Agrega un binding que solo aplica a `method`
    pub fn register_method(&mut self, method: Method, pattern: &str, kind: HandlerKind) {
        self.push(pattern, Some(method), kind);
    }

    fn push(&mut self, pattern: &str, method: Option<Method>, kind: HandlerKind) {
        tracing::debug!(pattern, kind = kind.name(), ?method, "handler registered");
        self.bindings.push(HandlerBinding {
            pattern: pattern.to_string(),
            method,
            kind,
        });
    }

    /// Atajo para un closure o struct que implementa [`RequestHandler`]
    pub fn on<H: RequestHandler + 'static>(&mut self, pattern: &str, handler: H) {
        self.register(pattern, HandlerKind::Request(Arc::new(handler)));
    }

    /// Atajo para un [`WebSocketHandler`]
    pub fn websocket<H: WebSocketHandler + 'static>(&mut self, pattern: &str, handler: H) {
        self.register(pattern, HandlerKind::WebSocket(Arc::new(handler)));
    }

    /// Atajo para un [`AuthorizationHandler`]
    pub fn protect<H: AuthorizationHandler + 'static>(&mut self, pattern: &str, handler: H) {
        self.register(pattern, HandlerKind::Authorization(Arc::new(handler)));
    }

    /// Quita los bindings con ese patrón y ese tipo. Retorna cuántos quitó.
    pub fn remove(&mut self, pattern: &str, kind: &HandlerKind) -> usize {
        let before = self.bindings.len();
        self.bindings
            .retain(|b| !(b.pattern == pattern && b.kind.same_kind(kind)));
        before - self.bindings.len()
    }

    /// Primer binding de request o WebSocket que coincide.
    /// `None` se traduce en un 404.
    pub fn dispatch(&self, method: Method, path: &str) -> Option<&HandlerBinding> {
        self.bindings.iter().find(|b| {
            !matches!(b.kind, HandlerKind::Authorization(_)) && b.matches(method, path)
        })
    }

    /// Primer binding de autorización que cubre el request
    pub fn authorizer(&self, method: Method, path: &str) -> Option<&Arc<dyn AuthorizationHandler>> {
        self.bindings.iter().find_map(|b| match &b.kind {
            HandlerKind::Authorization(auth) if b.matches(method, path) => Some(auth),
            _ => None,
        })
    }

    pub fn bindings(&self) -> &[HandlerBinding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_handler(_req: &Request, _conn: &mut Connection) -> Result<(), HttpError> {
        Ok(())
    }

    struct DenyAll;

    impl AuthorizationHandler for DenyAll {
        fn authorize(&self, _req: &Request, _conn: &Connection) -> Result<Option<String>, AuthError> {
            Err(AuthError::Failed)
        }
    }

    struct Echo;

    impl WebSocketHandler for Echo {
        fn data(&self, _ws: &mut WebSocket<'_>, _opcode: u8, _payload: &[u8]) -> bool {
            true
        }
    }

    #[test]
    fn test_pattern_matching() {
        assert!(pattern_matches("/status", "/status"));
        assert!(!pattern_matches("/status", "/status/x"));
        assert!(!pattern_matches("/status", "/Status"));
        assert!(pattern_matches("/api/*", "/api/"));
        assert!(pattern_matches("/api/*", "/api/users/1"));
        assert!(!pattern_matches("/api/*", "/api"));
        assert!(pattern_matches("/api*", "/api"));
        assert!(pattern_matches("*", "/anything"));
        assert!(!pattern_matches("/api/*", "/v1/api/x"));
    }

    #[test]
    fn test_first_registered_wins() {
        let mut registry = HandlerRegistry::new();
        registry.on("/files/special", ok_handler);
        registry.on("/files/*", ok_handler);
        registry.on("*", ok_handler);

        let hit = registry.dispatch(Method::GET, "/files/special").unwrap();
        assert_eq!(hit.pattern(), "/files/special");

        let hit = registry.dispatch(Method::GET, "/files/other").unwrap();
        assert_eq!(hit.pattern(), "/files/*");

        let hit = registry.dispatch(Method::POST, "/elsewhere").unwrap();
        assert_eq!(hit.pattern(), "*");
    }

    #[test]
    fn test_no_match_is_none() {
        let mut registry = HandlerRegistry::new();
        registry.on("/status", ok_handler);
        assert!(registry.dispatch(Method::GET, "/missing").is_none());
    }

    #[test]
    fn test_method_filter() {
        let mut registry = HandlerRegistry::new();
        registry.register_method(
            Method::PUT,
            "/upload",
            HandlerKind::Request(Arc::new(ok_handler)),
        );

        assert!(registry.dispatch(Method::PUT, "/upload").is_some());
        assert!(registry.dispatch(Method::GET, "/upload").is_none());
    }

    #[test]
    fn test_authorizer_is_separate_from_dispatch() {
        let mut registry = HandlerRegistry::new();
        registry.protect("/private/*", DenyAll);
        registry.on("/private/*", ok_handler);
        registry.websocket("/ws", Echo);

        assert!(registry.authorizer(Method::PUT, "/private/doc").is_some());
        assert!(registry.authorizer(Method::GET, "/public").is_none());

        let hit = registry.dispatch(Method::PUT, "/private/doc").unwrap();
        assert!(matches!(hit.kind(), HandlerKind::Request(_)));

        let hit = registry.dispatch(Method::GET, "/ws").unwrap();
        assert!(matches!(hit.kind(), HandlerKind::WebSocket(_)));
    }

    #[test]
    fn test_remove() {
        let mut registry = HandlerRegistry::new();
        registry.on("/a", ok_handler);
        registry.protect("/a", DenyAll);

        let removed = registry.remove("/a", &HandlerKind::Request(Arc::new(ok_handler)));
        assert_eq!(removed, 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.dispatch(Method::GET, "/a").is_none());
        assert!(registry.authorizer(Method::GET, "/a").is_some());
    }
}
