//! Thread-pool provider over a synchronous tile source.
//!
//! Offloads blocking fetch/decode work to background threads, supports
//! per-request cancellation, and delivers completions via channels that the
//! cache drains once per frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use dashmap::DashMap;

use super::{Completion, ProviderMetadata, RequestHandle, TileProvider};
use crate::address::TileAddress;
use crate::error::{FetchError, ProviderError};

/// A blocking tile source (disk reader, HTTP client, procedural generator).
pub trait TileSource<const D: usize>: Send + Sync + 'static {
    /// Decoded tile data.
    type Payload: Send + 'static;

    /// Read the tile set's metadata.
    fn metadata(&self) -> Result<ProviderMetadata, ProviderError>;

    /// Fetch and decode one tile. Runs on a worker thread.
    fn fetch(&self, address: TileAddress<D>) -> Result<Self::Payload, FetchError>;
}

/// Internal job carrying the address and its cancellation flag.
struct FetchJob<const D: usize> {
    handle: RequestHandle,
    address: TileAddress<D>,
    cancelled: Arc<AtomicBool>,
}

/// Runs a [`TileSource`] on a pool of worker threads.
pub struct WorkerProvider<const D: usize, S: TileSource<D>> {
    source: Arc<S>,
    /// Sender for submitting jobs. `None` once shut down.
    job_sender: Option<Sender<FetchJob<D>>>,
    /// Receiver for completed fetches.
    result_receiver: Receiver<Completion<S::Payload>>,
    /// Cancellation flag per outstanding request.
    active: Arc<DashMap<RequestHandle, Arc<AtomicBool>>>,
    /// Jobs queued or executing.
    in_flight: Arc<AtomicU64>,
    /// Completions produced on this thread (rejected submissions).
    local: Vec<Completion<S::Payload>>,
    next_handle: u64,
    workers: Vec<JoinHandle<()>>,
}

impl<const D: usize, S: TileSource<D>> WorkerProvider<D, S> {
    /// Create a provider with `thread_count` workers and room for `queue_capacity` queued jobs.
    pub fn new(source: S, thread_count: usize, queue_capacity: usize) -> Self {
        let source = Arc::new(source);
        let (job_sender, job_receiver) = bounded::<FetchJob<D>>(queue_capacity.max(1));
        let (result_sender, result_receiver) = unbounded::<Completion<S::Payload>>();
        let active: Arc<DashMap<RequestHandle, Arc<AtomicBool>>> = Arc::new(DashMap::new());
        let in_flight = Arc::new(AtomicU64::new(0));

        let mut workers = Vec::with_capacity(thread_count.max(1));
        for i in 0..thread_count.max(1) {
            let receiver = job_receiver.clone();
            let sender = result_sender.clone();
            let source = Arc::clone(&source);
            let active = Arc::clone(&active);
            let in_flight = Arc::clone(&in_flight);

            let handle = std::thread::Builder::new()
                .name(format!("tile-fetch-{i}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        // Check cancellation before starting work.
                        if job.cancelled.load(Ordering::Relaxed) {
                            in_flight.fetch_sub(1, Ordering::Relaxed);
                            continue;
                        }

                        let result = source.fetch(job.address);

                        // Check cancellation after the fetch.
                        if !job.cancelled.load(Ordering::Relaxed) {
                            let _ = sender.send(Completion {
                                handle: job.handle,
                                result,
                            });
                        }
                        active.remove(&job.handle);
                        in_flight.fetch_sub(1, Ordering::Relaxed);
                    }
                })
                .expect("Failed to spawn tile fetch worker thread");
            workers.push(handle);
        }

        Self {
            source,
            job_sender: Some(job_sender),
            result_receiver,
            active,
            in_flight,
            local: Vec::new(),
            next_handle: 1,
            workers,
        }
    }

    /// Create a provider with a thread count based on CPU cores.
    pub fn with_defaults(source: S) -> Self {
        let cpus = num_cpus::get().max(2);
        let threads = (cpus - 1).max(1);
        Self::new(source, threads, 256)
    }

    /// The wrapped source.
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Number of jobs currently queued or executing.
    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Stop accepting work and join every worker.
    ///
    /// Every request still outstanding completes with [`FetchError::Cancelled`]
    /// on the next poll, so a cache tracking it gets its slot back.
    pub fn shutdown(&mut self) {
        let mut pending: Vec<RequestHandle> = self.active.iter().map(|e| *e.key()).collect();
        pending.sort();
        for handle in pending {
            if let Some((_, cancelled)) = self.active.remove(&handle) {
                cancelled.store(true, Ordering::Relaxed);
                self.local.push(Completion {
                    handle,
                    result: Err(FetchError::Cancelled),
                });
            }
        }
        self.job_sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl<const D: usize, S: TileSource<D>> TileProvider<D> for WorkerProvider<D, S> {
    type Payload = S::Payload;

    fn metadata(&self) -> Result<ProviderMetadata, ProviderError> {
        self.source.metadata()
    }

    fn request(&mut self, address: TileAddress<D>) -> RequestHandle {
        let handle = RequestHandle(self.next_handle);
        self.next_handle += 1;

        let Some(sender) = &self.job_sender else {
            self.local.push(Completion {
                handle,
                result: Err(FetchError::Transport("provider shut down".into())),
            });
            return handle;
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        self.active.insert(handle, Arc::clone(&cancelled));
        self.in_flight.fetch_add(1, Ordering::Relaxed);

        let job = FetchJob {
            handle,
            address,
            cancelled,
        };
        if let Err(err) = sender.try_send(job) {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            self.active.remove(&handle);
            let reason = match err {
                TrySendError::Full(_) => "fetch queue full",
                TrySendError::Disconnected(_) => "fetch workers gone",
            };
            self.local.push(Completion {
                handle,
                result: Err(FetchError::Transport(reason.into())),
            });
        }
        handle
    }

    fn cancel(&mut self, handle: RequestHandle) {
        if let Some((_, cancelled)) = self.active.remove(&handle) {
            cancelled.store(true, Ordering::Relaxed);
        }
    }

    fn poll_completions(&mut self, out: &mut Vec<Completion<S::Payload>>) {
        out.append(&mut self.local);
        while let Ok(completion) = self.result_receiver.try_recv() {
            out.push(completion);
        }
    }
}

impl<const D: usize, S: TileSource<D>> Drop for WorkerProvider<D, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::QuadAddress;
    use std::time::{Duration, Instant};

    struct LevelSource {
        delay: Duration,
    }

    impl TileSource<2> for LevelSource {
        type Payload = u8;

        fn metadata(&self) -> Result<ProviderMetadata, ProviderError> {
            Ok(ProviderMetadata {
                format_version: 1,
                min_level: 0,
                max_level: 8,
            })
        }

        fn fetch(&self, address: QuadAddress) -> Result<u8, FetchError> {
            std::thread::sleep(self.delay);
            if address.coords[0] == 99 {
                return Err(FetchError::NotFound);
            }
            Ok(address.level)
        }
    }

    fn drain_until(
        provider: &mut WorkerProvider<2, LevelSource>,
        count: usize,
    ) -> Vec<Completion<u8>> {
        let mut out = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while out.len() < count && Instant::now() < deadline {
            provider.poll_completions(&mut out);
            std::thread::sleep(Duration::from_millis(2));
        }
        out
    }

    #[test]
    fn test_concurrent_fetches_all_complete() {
        let mut provider = WorkerProvider::new(LevelSource { delay: Duration::ZERO }, 4, 64);
        let mut handles = Vec::new();
        for x in 0..16 {
            handles.push(provider.request(QuadAddress::new(5, [x, 1])));
        }
        let results = drain_until(&mut provider, handles.len());
        assert_eq!(results.len(), handles.len());
        assert!(results.iter().all(|c| c.result == Ok(5)));
    }

    #[test]
    fn test_failures_are_reported() {
        let mut provider = WorkerProvider::new(LevelSource { delay: Duration::ZERO }, 1, 8);
        let h = provider.request(QuadAddress::new(7, [99, 0]));
        let results = drain_until(&mut provider, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].handle, h);
        assert_eq!(results[0].result, Err(FetchError::NotFound));
    }

    /// A full queue rejects the request with a transport error instead of blocking.
    #[test]
    fn test_full_queue_rejects_locally() {
        let mut provider =
            WorkerProvider::new(LevelSource { delay: Duration::from_millis(200) }, 1, 1);
        for x in 0..4 {
            provider.request(QuadAddress::new(2, [x, 0]));
        }
        let mut out = Vec::new();
        provider.poll_completions(&mut out);
        assert!(
            out.iter()
                .any(|c| matches!(c.result, Err(FetchError::Transport(_)))),
            "at least one submission should overflow the queue"
        );
    }

    #[test]
    fn test_cancel_is_safe_after_completion() {
        let mut provider = WorkerProvider::new(LevelSource { delay: Duration::ZERO }, 1, 8);
        let h = provider.request(QuadAddress::root());
        let _ = drain_until(&mut provider, 1);
        provider.cancel(h);
        provider.cancel(RequestHandle(12345));
    }

    #[test]
    fn test_handles_unique() {
        let mut provider = WorkerProvider::new(LevelSource { delay: Duration::ZERO }, 1, 8);
        let a = provider.request(QuadAddress::root());
        let b = provider.request(QuadAddress::root());
        assert_ne!(a, b);
    }

    /// Requests outstanding at shutdown resolve as cancelled rather than vanishing.
    #[test]
    fn test_shutdown_cancels_outstanding_requests() {
        let mut provider =
            WorkerProvider::new(LevelSource { delay: Duration::from_millis(200) }, 1, 8);
        let handles: Vec<_> = (0..3)
            .map(|x| provider.request(QuadAddress::new(2, [x, 0])))
            .collect();
        provider.shutdown();

        let mut out = Vec::new();
        provider.poll_completions(&mut out);
        for handle in &handles {
            assert!(
                out.iter()
                    .any(|c| c.handle == *handle && c.result == Err(FetchError::Cancelled)),
                "{handle:?} was not cancelled"
            );
        }
        assert_eq!(provider.in_flight_count(), 0);
    }

    #[test]
    fn test_shutdown_rejects_new_requests() {
        let mut provider = WorkerProvider::new(LevelSource { delay: Duration::ZERO }, 2, 8);
        provider.shutdown();
        let h = provider.request(QuadAddress::root());
        let mut out = Vec::new();
        provider.poll_completions(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].handle, h);
        assert!(out[0].result.is_err());
    }
}
