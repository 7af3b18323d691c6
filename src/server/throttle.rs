//! # Limitación de ancho de banda
//! src/server/throttle.rs
//!
//! Ventanas de un segundo: dentro de una ventana nunca se envían más de
//! `rate` bytes. Lo que no entra espera a la ventana siguiente.

use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// Siguiente paso al escribir con límite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Se pueden enviar ya estos bytes
    Send(usize),

    /// La ventana actual está agotada
    Sleep(Duration),
}

/// Estado de la limitación de una conexión
#[derive(Debug, Clone)]
pub struct Throttle {
    /// Bytes por segundo (mayor que cero)
    rate: u64,
    window_start: Instant,
    sent_in_window: u64,
}

impl Throttle {
    /// `None` si `rate` es 0 (sin límite)
    pub fn new(rate: u64, now: Instant) -> Option<Self> {
        (rate > 0).then_some(Self {
            rate,
            window_start: now,
            sent_in_window: 0,
        })
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Decide cuánto de `wanted` bytes se puede enviar en `now`
    pub fn plan(&mut self, now: Instant, wanted: usize) -> Pace {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= WINDOW {
            self.window_start = now;
            self.sent_in_window = 0;
        }

        let left = self.rate - self.sent_in_window.min(self.rate);
        if left == 0 {
            let elapsed = now.saturating_duration_since(self.window_start);
            return Pace::Sleep(WINDOW.saturating_sub(elapsed));
        }

        Pace::Send((wanted as u64).min(left) as usize)
    }

    /// Registra bytes efectivamente enviados
    pub fn record(&mut self, sent: usize) {
        self.sent_in_window += sent as u64;
    }
}
