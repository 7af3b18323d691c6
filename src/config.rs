//! # Configuración del Servidor
//! src/config.rs
//!
//! Este módulo define la configuración del motor HTTP con soporte completo
//! para argumentos CLI y variables de entorno. Se lee una sola vez al arrancar
//! y queda inmutable dentro del [`Context`](crate::server::Context).
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./http_engine --listening-ports 8080,8443s \
//!   --num-threads 32 \
//!   --request-timeout-ms 10000 \
//!   --ssl-certificate server.pem
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! LISTENING_PORTS=127.0.0.1:8080 NUM_THREADS=8 ./http_engine
//! ```

use clap::{ArgAction, Parser};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Tamaño mínimo aceptable para el buffer de headers
const MIN_REQUEST_SIZE: usize = 256;

/// Configuración del motor HTTP
#[derive(Debug, Clone, Parser)]
#[command(name = "http_engine")]
#[command(about = "Motor HTTP/1.1 embebible con pool de workers")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Puertos de escucha: lista `[host:]puerto[s|r]` separada por comas.
    /// `s` = TLS, `r` = redirige a HTTPS
    #[arg(long, default_value = "8080", env = "LISTENING_PORTS")]
    pub listening_ports: String,

    // === Workers ===
    /// Número de workers (cada uno atiende una conexión completa)
    #[arg(long, default_value = "50", env = "NUM_THREADS")]
    pub num_threads: usize,

    /// Capacidad de la cola entre el acceptor y los workers
    #[arg(long, default_value = "20", env = "QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    // === Timeouts ===
    /// Deadline de cada operación de I/O en milisegundos (0 = sin límite)
    #[arg(long, default_value = "30000", env = "REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Reutilizar conexiones entre requests
    #[arg(long, default_value = "true", action = ArgAction::Set, env = "ENABLE_KEEP_ALIVE")]
    pub enable_keep_alive: bool,

    /// Tiempo máximo de espera del siguiente request en una conexión keep-alive
    #[arg(long, default_value = "500", env = "KEEP_ALIVE_TIMEOUT_MS")]
    pub keep_alive_timeout_ms: u64,

    /// Deadline de lectura de frames WebSocket (0 = sin límite)
    #[arg(long, default_value = "30000", env = "WEBSOCKET_TIMEOUT_MS")]
    pub websocket_timeout_ms: u64,

    // === Límites ===
    /// Tamaño máximo del bloque request line + headers
    #[arg(long, default_value = "16384", env = "MAX_REQUEST_SIZE")]
    pub max_request_size: usize,

    /// Límite de bytes/segundo por conexión para las respuestas
    /// (admite sufijos `k` y `m`; 0 = sin límite)
    #[arg(long, default_value = "0", value_parser = parse_rate, env = "THROTTLE")]
    pub throttle: u64,

    // === Autenticación ===
    /// Realm de la autenticación Digest
    #[arg(long, default_value = "mydomain.com", env = "AUTHENTICATION_DOMAIN")]
    pub authentication_domain: String,

    /// Ventana de validez de un nonce en segundos
    #[arg(long, default_value = "3600", env = "NONCE_LIFETIME_SECS")]
    pub nonce_lifetime_secs: u64,

    /// Archivo `usuario:realm:ha1` que protege todas las URIs
    #[arg(long, env = "GLOBAL_PASSWORDS_FILE")]
    pub global_passwords_file: Option<PathBuf>,

    // === TLS y socket ===
    /// PEM con la cadena de certificados y la clave privada
    #[arg(long, env = "SSL_CERTIFICATE")]
    pub ssl_certificate: Option<PathBuf>,

    /// Desactivar el algoritmo de Nagle en los sockets aceptados
    #[arg(long, default_value = "false", action = ArgAction::Set, env = "TCP_NODELAY")]
    pub tcp_nodelay: bool,

    /// Nivel de log por defecto (si `RUST_LOG` no está definido)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

/// Un puerto de escucha ya interpretado
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenSpec {
    pub addr: SocketAddr,
    /// El puerto habla TLS
    pub tls: bool,
    /// El puerto redirige todo al primer puerto TLS
    pub redirect: bool,
}

impl ListenSpec {
    /// Interpreta `8080`, `127.0.0.1:8080`, `[::1]:8443s`, `80r`...
    ///
    /// # Ejemplo
    /// ```
    /// use http_engine::config::ListenSpec;
    ///
    /// let spec = ListenSpec::parse("127.0.0.1:8443s").unwrap();
    /// assert!(spec.tls);
    /// assert_eq!(spec.addr.port(), 8443);
    /// ```
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        let (body, tls, redirect) = match s.chars().last() {
            Some('s') => (&s[..s.len() - 1], true, false),
            Some('r') => (&s[..s.len() - 1], false, true),
            _ => (s, false, false),
        };

        if body.is_empty() {
            return Err(format!("Invalid listening port: '{s}'"));
        }

        let addr = if body.bytes().all(|b| b.is_ascii_digit()) {
            let port: u16 = body
                .parse()
                .map_err(|_| format!("Invalid port number: '{body}'"))?;
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
        } else {
            body.parse::<SocketAddr>()
                .map_err(|_| format!("Invalid listening address: '{body}'"))?
        };

        Ok(Self {
            addr,
            tls,
            redirect,
        })
    }
}

/// Interpreta un ritmo en bytes/segundo con sufijo opcional `k` o `m`
fn parse_rate(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, multiplier) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 1024),
        Some('m') | Some('M') => (&s[..s.len() - 1], 1024 * 1024),
        _ => (s, 1),
    };

    digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| format!("Invalid rate: '{s}'"))
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Interpreta `listening_ports`
    pub fn listen_specs(&self) -> Result<Vec<ListenSpec>, String> {
        self.listening_ports
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(ListenSpec::parse)
            .collect()
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.num_threads == 0 {
            return Err("num_threads must be >= 1".to_string());
        }

        if self.queue_capacity == 0 {
            return Err("queue_capacity must be >= 1".to_string());
        }

        if self.max_request_size < MIN_REQUEST_SIZE {
            return Err(format!("max_request_size must be >= {MIN_REQUEST_SIZE}"));
        }

        if self.nonce_lifetime_secs == 0 {
            return Err("nonce_lifetime_secs must be > 0".to_string());
        }

        let specs = self.listen_specs()?;
        if specs.is_empty() {
            return Err("listening_ports must name at least one port".to_string());
        }

        if specs.iter().any(|s| s.tls) && self.ssl_certificate.is_none() {
            return Err("TLS port configured but ssl_certificate is missing".to_string());
        }

        if specs.iter().any(|s| s.redirect) && !specs.iter().any(|s| s.tls) {
            return Err("redirect port configured without any TLS port".to_string());
        }

        Ok(())
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            listening_ports: "8080".to_string(),
            num_threads: 50,
            queue_capacity: 20,
            request_timeout_ms: 30_000,
            enable_keep_alive: true,
            keep_alive_timeout_ms: 500,
            websocket_timeout_ms: 30_000,
            max_request_size: 16_384,
            throttle: 0,
            authentication_domain: "mydomain.com".to_string(),
            nonce_lifetime_secs: 3600,
            global_passwords_file: None,
            ssl_certificate: None,
            tcp_nodelay: false,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.num_threads, 50);
        assert_eq!(config.queue_capacity, 20);
        assert_eq!(config.max_request_size, 16_384);
        assert!(config.enable_keep_alive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_from_cli() {
        let config = Config::try_parse_from([
            "http_engine",
            "--listening-ports",
            "127.0.0.1:9000",
            "--num-threads",
            "4",
            "--throttle",
            "10k",
            "--enable-keep-alive",
            "false",
        ])
        .unwrap();

        assert_eq!(config.num_threads, 4);
        assert_eq!(config.throttle, 10 * 1024);
        assert!(!config.enable_keep_alive);
        assert_eq!(config.listen_specs().unwrap()[0].addr.port(), 9000);
    }

    // ==================== Listen specs ====================

    #[test]
    fn test_listen_spec_port_only() {
        let spec = ListenSpec::parse("8080").unwrap();
        assert_eq!(spec.addr, "0.0.0.0:8080".parse().unwrap());
        assert!(!spec.tls);
        assert!(!spec.redirect);
    }

    #[test]
    fn test_listen_spec_suffixes() {
        assert!(ListenSpec::parse("8443s").unwrap().tls);
        assert!(ListenSpec::parse("80r").unwrap().redirect);
        let v6 = ListenSpec::parse("[::1]:8443s").unwrap();
        assert!(v6.tls);
        assert!(v6.addr.is_ipv6());
    }

    #[test]
    fn test_listen_spec_invalid() {
        assert!(ListenSpec::parse("").is_err());
        assert!(ListenSpec::parse("s").is_err());
        assert!(ListenSpec::parse("99999").is_err());
        assert!(ListenSpec::parse("localhost:http").is_err());
    }

    #[test]
    fn test_listen_specs_list() {
        let mut config = Config::default();
        config.listening_ports = "8080r, 8443s".to_string();
        let specs = config.listen_specs().unwrap();
        assert_eq!(specs.len(), 2);
        assert!(specs[0].redirect);
        assert!(specs[1].tls);
    }

    // ==================== Validation ====================

    #[test]
    fn test_validate_invalid_threads() {
        let mut config = Config::default();
        config.num_threads = 0;
        assert!(config.validate().unwrap_err().contains("num_threads"));
    }

    #[test]
    fn test_validate_invalid_queue() {
        let mut config = Config::default();
        config.queue_capacity = 0;
        assert!(config.validate().unwrap_err().contains("queue_capacity"));
    }

    #[test]
    fn test_validate_tiny_request_size() {
        let mut config = Config::default();
        config.max_request_size = 100;
        assert!(config.validate().unwrap_err().contains("max_request_size"));
    }

    #[test]
    fn test_validate_tls_without_certificate() {
        let mut config = Config::default();
        config.listening_ports = "8443s".to_string();
        assert!(config.validate().unwrap_err().contains("ssl_certificate"));
    }

    #[test]
    fn test_validate_redirect_without_tls() {
        let mut config = Config::default();
        config.listening_ports = "8080r".to_string();
        assert!(config.validate().unwrap_err().contains("redirect"));
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("0").unwrap(), 0);
        assert_eq!(parse_rate("512").unwrap(), 512);
        assert_eq!(parse_rate("2k").unwrap(), 2048);
        assert_eq!(parse_rate("1m").unwrap(), 1024 * 1024);
        assert!(parse_rate("fast").is_err());
    }

    #[test]
    fn test_parse_rate_overflow() {
        assert!(parse_rate("18014398509481984m").is_err());
        assert!(parse_rate("18446744073709551615k").is_err());
        assert_eq!(parse_rate("18446744073709551615").unwrap(), u64::MAX);
    }
}
