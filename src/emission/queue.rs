//! Bounded hand-off from a background producer to the frame thread.
//!
//! Neither side ever blocks: the producer gets its batch back when the
//! queue is full and must back off; the frame thread takes what is there.

use super::{EmitContext, RecordGenerator};
use crate::backend::KernelParams;
use crate::record_layout::RecordLayout;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, PartialEq, Eq)]
pub enum TryPutError {
    /// The queue is at capacity. Back off and retry with the same batch.
    Full(Vec<u8>),
    /// The frame thread is gone.
    Disconnected(Vec<u8>),
    /// Not a whole number of records.
    Malformed(Vec<u8>),
}

#[derive(Clone)]
pub struct RecordProducer {
    tx: Sender<Vec<u8>>,
    stride: usize,
}

impl RecordProducer {
    pub fn try_put(&self, batch: Vec<u8>) -> Result<(), TryPutError> {
        if batch.len() % self.stride != 0 {
            return Err(TryPutError::Malformed(batch));
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.tx.try_send(batch).map_err(|e| match e {
            TrySendError::Full(batch) => TryPutError::Full(batch),
            TrySendError::Disconnected(batch) => TryPutError::Disconnected(batch),
        })
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }
}

/// Consumer side. Records taken out of the channel but not yet emitted are
/// held here until a later frame asks for them.
pub struct RecordQueue {
    rx: Receiver<Vec<u8>>,
    stride: usize,
    pending: Vec<u8>,
    // Stop pulling batches once this many records are pending, so a stalled
    // engine leaves the channel full and the producer backs off.
    low_water: usize,
}

/// Creates a queue holding at most `capacity_batches` batches in flight.
pub fn record_queue(
    layout: &RecordLayout,
    capacity_batches: usize,
    low_water_records: u32,
) -> (RecordProducer, RecordQueue) {
    let (tx, rx) = crossbeam_channel::bounded(capacity_batches.max(1));
    let stride = layout.stride() as usize;
    (
        RecordProducer { tx, stride },
        RecordQueue {
            rx,
            stride,
            pending: Vec::new(),
            low_water: low_water_records.max(1) as usize,
        },
    )
}

impl RecordQueue {
    fn pending_records(&self) -> usize {
        self.pending.len() / self.stride
    }

    fn refill(&mut self, target: usize) {
        while self.pending_records() < target {
            match self.rx.try_recv() {
                Ok(batch) => self.pending.extend_from_slice(&batch),
                Err(_) => break,
            }
        }
    }

    /// Non-blocking. Returns at most `max` records, possibly none.
    pub fn try_take(&mut self, max: u32) -> Vec<u8> {
        self.refill(max as usize);
        let n = (max as usize).min(self.pending_records());
        self.pending.drain(..n * self.stride).collect()
    }
}

impl RecordGenerator for RecordQueue {
    fn available(&mut self) -> u32 {
        self.refill(self.low_water);
        self.pending_records().min(u32::MAX as usize) as u32
    }

    fn generate(&mut self, count: u32, _ctx: &EmitContext, out: &mut Vec<u8>) -> u32 {
        let batch = self.try_take(count);
        out.extend_from_slice(&batch);
        (batch.len() / self.stride) as u32
    }
}

/// A producer thread filling a [`RecordQueue`] until stopped.
pub struct BackgroundProducer {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<u64>>,
}

impl BackgroundProducer {
    /// Stops the thread and returns how many records it handed over.
    pub fn stop(mut self) -> u64 {
        self.shutdown.store(true, Ordering::Relaxed);
        self.handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or(0)
    }
}

impl Drop for BackgroundProducer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Runs `generator` on its own thread, pushing `batch_size` record batches.
/// When the queue is full the thread sleeps for `backoff` instead of
/// blocking on the channel.
pub fn spawn_background_producer<G>(
    producer: RecordProducer,
    mut generator: G,
    params: KernelParams,
    batch_size: u32,
    backoff: Duration,
) -> BackgroundProducer
where
    G: RecordGenerator + Send + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let stop = shutdown.clone();
    let handle = std::thread::spawn(move || {
        let ctx = EmitContext { frame: 0, params };
        let mut produced = 0u64;
        let mut retry: Option<Vec<u8>> = None;
        while !stop.load(Ordering::Relaxed) {
            let batch = match retry.take() {
                Some(batch) => batch,
                None => {
                    let mut batch = Vec::new();
                    if generator.generate(batch_size, &ctx, &mut batch) == 0 {
                        std::thread::sleep(backoff);
                        continue;
                    }
                    batch
                }
            };
            let records = (batch.len() / producer.stride) as u64;
            match producer.try_put(batch) {
                Ok(()) => produced += records,
                Err(TryPutError::Full(batch)) => {
                    retry = Some(batch);
                    std::thread::sleep(backoff);
                }
                Err(TryPutError::Disconnected(_)) => break,
                Err(TryPutError::Malformed(batch)) => {
                    log::error!(
                        "Background producer built a {} byte batch, dropping it",
                        batch.len()
                    );
                }
            }
        }
        log::debug!("Background producer stopped after {} records", produced);
        produced
    });
    BackgroundProducer {
        shutdown,
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emission::Replay;
    use crate::record_layout::{Particle, Record};

    fn batch(n: usize, ttl: f32) -> Vec<u8> {
        bytemuck::cast_slice(&vec![
            Particle {
                ttl,
                ..Particle::default()
            };
            n
        ])
        .to_vec()
    }

    #[test]
    fn full_queue_hands_batch_back() {
        let (producer, _queue) = record_queue(&Particle::layout(), 2, 8);
        producer.try_put(batch(1, 1.0)).unwrap();
        producer.try_put(batch(1, 2.0)).unwrap();
        assert!(producer.is_full());
        assert_eq!(
            producer.try_put(batch(1, 3.0)),
            Err(TryPutError::Full(batch(1, 3.0)))
        );
    }

    #[test]
    fn malformed_batch_rejected() {
        let (producer, _queue) = record_queue(&Particle::layout(), 2, 8);
        assert!(matches!(
            producer.try_put(vec![0u8; 33]),
            Err(TryPutError::Malformed(_))
        ));
    }

    #[test]
    fn disconnected_consumer_reported() {
        let (producer, queue) = record_queue(&Particle::layout(), 2, 8);
        drop(queue);
        assert!(matches!(
            producer.try_put(batch(1, 1.0)),
            Err(TryPutError::Disconnected(_))
        ));
    }

    #[test]
    fn partial_take_keeps_remainder() {
        let (producer, mut queue) = record_queue(&Particle::layout(), 4, 8);
        producer.try_put(batch(3, 1.0)).unwrap();
        producer.try_put(batch(3, 2.0)).unwrap();
        assert_eq!(queue.try_take(4).len(), 4 * 32);
        assert_eq!(queue.available(), 2);
        let rest = queue.try_take(10);
        assert_eq!(rest, batch(2, 2.0));
        assert!(queue.try_take(10).is_empty());
    }

    #[test]
    fn available_stops_pulling_at_low_water() {
        let (producer, mut queue) = record_queue(&Particle::layout(), 4, 2);
        for _ in 0..4 {
            producer.try_put(batch(2, 1.0)).unwrap();
        }
        assert_eq!(queue.available(), 2);
        // Three batches are still queued, so the producer stays throttled.
        assert!(producer.try_put(batch(2, 1.0)).is_ok());
        assert!(producer.is_full());
    }

    #[test]
    fn background_producer_fills_queue() {
        let (producer, mut queue) = record_queue(&Particle::layout(), 2, 16);
        let records = Replay::new(vec![Particle::default(); 10]);
        let background = spawn_background_producer(
            producer,
            records,
            KernelParams::default(),
            4,
            Duration::from_millis(1),
        );
        let mut received = 0;
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while received < 10 && std::time::Instant::now() < deadline {
            received += queue.try_take(3).len() / 32;
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(background.stop(), 10);
        assert_eq!(received, 10);
    }
}
