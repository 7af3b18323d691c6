//! # Cola de conexiones
//! src/server/queue.rs
//!
//! Cola FIFO acotada entre el acceptor (productor) y los workers
//! (consumidores). Cada elemento tiene un único dueño: sale del acceptor,
//! vive en la cola y pasa a exactamente un worker.
//!
//! - `produce` bloquea mientras la cola esté llena
//! - `consume` bloquea mientras esté vacía
//! - `close` libera a todos los que esperan, sin depender de que nadie
//!   los despierte a tiempo: las esperas usan `wait_timeout` y revisan
//!   el flag de cierre en cada vuelta

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Intervalo máximo entre revisiones del flag de cierre
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Cola acotada y thread-safe
#[derive(Debug)]
pub struct ConnectionQueue<T> {
    items: Mutex<VecDeque<T>>,

    /// Se notifica al encolar
    not_empty: Condvar,

    /// Se notifica al desencolar
    not_full: Condvar,

    capacity: usize,
    closed: AtomicBool,
}

impl<T> ConnectionQueue<T> {
    /// Crea una cola con capacidad fija (mínimo 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Encola `item`, esperando si la cola está llena.
    ///
    /// Si la cola se cierra, devuelve el elemento en `Err`.
    pub fn produce(&self, item: T) -> Result<(), T> {
        let mut items = self.lock();

        loop {
            if self.is_closed() {
                return Err(item);
            }
            if items.len() < self.capacity {
                items.push_back(item);
                self.not_empty.notify_one();
                return Ok(());
            }

            items = self
                .not_full
                .wait_timeout(items, WAIT_SLICE)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Encola sin esperar. `Err(item)` si está llena o cerrada.
    pub fn try_produce(&self, item: T) -> Result<(), T> {
        let mut items = self.lock();
        if self.is_closed() || items.len() >= self.capacity {
            return Err(item);
        }
        items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Desencola el elemento más antiguo, esperando si no hay ninguno.
    ///
    /// Retorna `None` cuando la cola se cierra.
    pub fn consume(&self) -> Option<T> {
        let mut items = self.lock();

        loop {
            if self.is_closed() {
                return None;
            }
            if let Some(item) = items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }

            items = self
                .not_empty
                .wait_timeout(items, WAIT_SLICE)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Cierra la cola y despierta a todos los que esperan
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _guard = self.lock();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Saca todo lo que quedó encolado (al apagar el servidor)
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_fifo_order() {
        let queue = ConnectionQueue::new(4);
        queue.produce(1).unwrap();
        queue.produce(2).unwrap();
        queue.produce(3).unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.consume(), Some(1));
        assert_eq!(queue.consume(), Some(2));
        assert_eq!(queue.consume(), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_try_produce_refuses_when_full() {
        let queue = ConnectionQueue::new(2);
        assert!(queue.try_produce("a").is_ok());
        assert!(queue.try_produce("b").is_ok());
        assert_eq!(queue.try_produce("c"), Err("c"));
    }

    #[test]
    fn test_producer_blocks_until_consumed() {
        const CAPACITY: usize = 3;
        let queue = Arc::new(ConnectionQueue::new(CAPACITY));
        for i in 0..CAPACITY {
            queue.produce(i).unwrap();
        }

        let done = Arc::new(AtomicBool::new(false));
        let producer = {
            let queue = Arc::clone(&queue);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                queue.produce(CAPACITY).unwrap();
                done.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(300));
        assert!(!done.load(Ordering::SeqCst), "producer C+1 must block");

        assert_eq!(queue.consume(), Some(0));
        producer.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(queue.len(), CAPACITY);
    }

    #[test]
    fn test_close_releases_blocked_consumer() {
        let queue: Arc<ConnectionQueue<u8>> = Arc::new(ConnectionQueue::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.consume())
        };

        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        queue.close();

        assert_eq!(consumer.join().unwrap(), None);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_close_releases_blocked_producer() {
        let queue = Arc::new(ConnectionQueue::new(1));
        queue.produce(1).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.produce(2))
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        assert_eq!(producer.join().unwrap(), Err(2));
        assert_eq!(queue.drain(), vec![1]);
    }
}
