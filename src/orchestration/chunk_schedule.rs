//! # Chunk Schedule
//!
//! Fixed-rate throttle for work inside one batch: items are split into chunks
//! of `chunk_size`, every item of a chunk runs concurrently, chunks run one at a
//! time in order, and a fixed pause separates consecutive chunks.

use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSchedule {
    chunk_size: usize,
    pause: Duration,
}

impl ChunkSchedule {
    pub fn new(chunk_size: usize, pause: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            pause,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_count(&self, items: usize) -> usize {
        items.div_ceil(self.chunk_size)
    }

    /// Run `work` over every item; outputs keep input order
    pub async fn run<T, O, F, Fut>(&self, items: Vec<T>, work: F) -> Vec<O>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = O>,
    {
        let total_chunks = self.chunk_count(items.len());
        let mut outputs = Vec::with_capacity(items.len());
        let mut items = items.into_iter().peekable();
        let mut chunk_index = 0usize;

        while items.peek().is_some() {
            if chunk_index > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            let chunk: Vec<Fut> = items.by_ref().take(self.chunk_size).map(&work).collect();
            debug!(
                chunk = chunk_index + 1,
                total_chunks = total_chunks,
                size = chunk.len(),
                "Running chunk"
            );
            outputs.extend(join_all(chunk).await);
            chunk_index += 1;
        }
        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_chunks_run_in_order_with_pause_between() {
        let schedule = ChunkSchedule::new(2, Duration::from_secs(3));
        let start = Instant::now();

        let outputs = schedule
            .run((0..5).collect(), |n: u32| async move {
                (n, start.elapsed().as_secs())
            })
            .await;

        assert_eq!(
            outputs,
            vec![(0, 0), (1, 0), (2, 3), (3, 3), (4, 6)]
        );
        // No pause after the final chunk
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded_by_chunk_size() {
        let schedule = ChunkSchedule::new(3, Duration::ZERO);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        schedule
            .run((0..10).collect::<Vec<u32>>(), |_| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let schedule = ChunkSchedule::new(20, Duration::from_secs(3));
        let outputs: Vec<u32> = schedule.run(Vec::<u32>::new(), |n| async move { n }).await;
        assert!(outputs.is_empty());
        assert_eq!(schedule.chunk_count(0), 0);
        assert_eq!(schedule.chunk_count(41), 3);
    }
}
