//! Concurrency guards shared by the domain stores.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

/// Collapses overlapping fetches of one store into a single request.
#[derive(Default)]
pub struct SingleFlight {
    gate: Mutex<()>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` unless a call is already in flight. An overlapping caller
    /// waits for the in-flight call to finish and gets `None` without
    /// running its own work.
    pub async fn join_or_run<F, T>(&self, work: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        match self.gate.try_lock() {
            Ok(_guard) => Some(work.await),
            Err(_) => {
                let _joined = self.gate.lock().await;
                None
            }
        }
    }

    /// Queues behind any in-flight call, then runs `work`. Used after a
    /// remote write, where a fetch that started before the write cannot be
    /// trusted to reflect it.
    pub async fn run_after<F, T>(&self, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.gate.lock().await;
        work.await
    }

    pub fn in_flight(&self) -> bool {
        self.gate.try_lock().is_err()
    }
}

/// Session generation counter. Work that suspends across a remote call
/// captures the epoch first and drops its result if a reset happened in
/// between.
#[derive(Default)]
pub struct Epoch(AtomicU64);

impl Epoch {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.current() == epoch
    }

    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_overlapping_calls_run_once() {
        let flight = Arc::new(SingleFlight::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let work = |runs: Arc<AtomicUsize>| async move {
            runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
        };

        let (a, b) = tokio::join!(
            flight.join_or_run(work(runs.clone())),
            flight.join_or_run(work(runs.clone())),
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(a.is_some() ^ b.is_some());
    }

    #[tokio::test]
    async fn test_sequential_calls_each_run() {
        let flight = SingleFlight::new();
        assert_eq!(flight.join_or_run(async { 1 }).await, Some(1));
        assert_eq!(flight.join_or_run(async { 2 }).await, Some(2));
        assert!(!flight.in_flight());
    }

    #[tokio::test]
    async fn test_run_after_waits_for_in_flight_call() {
        let flight = Arc::new(SingleFlight::new());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let first = {
            let order = order.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                order.lock().unwrap().push("fetch");
            }
        };
        let second = {
            let order = order.clone();
            async move {
                order.lock().unwrap().push("refetch");
            }
        };

        let flight2 = flight.clone();
        tokio::join!(flight.join_or_run(first), async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            flight2.run_after(second).await
        });
        assert_eq!(*order.lock().unwrap(), vec!["fetch", "refetch"]);
    }

    #[test]
    fn test_epoch_advance_invalidates_captured_value() {
        let epoch = Epoch::default();
        let captured = epoch.current();
        assert!(epoch.is_current(captured));
        epoch.advance();
        assert!(!epoch.is_current(captured));
    }
}
