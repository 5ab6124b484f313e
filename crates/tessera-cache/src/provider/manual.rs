//! A provider that resolves requests only when told to.
//!
//! Useful for tools that pre-load tiles from memory and for deterministic
//! tests of scheduling and completion ordering.

use std::collections::HashMap;

use super::{Completion, ProviderMetadata, RequestHandle, TileProvider};
use crate::address::TileAddress;
use crate::error::{FetchError, ProviderError};

/// Provider whose requests stay pending until [`ManualProvider::complete`] is called.
pub struct ManualProvider<const D: usize, P> {
    metadata: Result<ProviderMetadata, String>,
    next_handle: u64,
    pending: HashMap<RequestHandle, TileAddress<D>>,
    cancelled: Vec<RequestHandle>,
    ready: Vec<Completion<P>>,
    request_log: Vec<(RequestHandle, TileAddress<D>)>,
}

impl<const D: usize, P> ManualProvider<D, P> {
    /// Create a provider serving format version 1 over `min_level..=max_level`.
    #[must_use]
    pub fn new(min_level: u8, max_level: u8) -> Self {
        Self::with_metadata(ProviderMetadata {
            format_version: 1,
            min_level,
            max_level,
        })
    }

    /// Create a provider reporting the given metadata.
    #[must_use]
    pub fn with_metadata(metadata: ProviderMetadata) -> Self {
        Self {
            metadata: Ok(metadata),
            next_handle: 1,
            pending: HashMap::new(),
            cancelled: Vec::new(),
            ready: Vec::new(),
            request_log: Vec::new(),
        }
    }

    /// Create a provider whose metadata read fails.
    #[must_use]
    pub fn unavailable(reason: &str) -> Self {
        let mut provider = Self::new(0, 0);
        provider.metadata = Err(reason.to_string());
        provider
    }

    /// Requests issued and not yet completed or cancelled.
    pub fn pending(&self) -> impl Iterator<Item = (RequestHandle, TileAddress<D>)> + '_ {
        self.pending.iter().map(|(h, a)| (*h, *a))
    }

    /// Handle of the pending request for `address`, if any.
    #[must_use]
    pub fn pending_handle(&self, address: &TileAddress<D>) -> Option<RequestHandle> {
        self.pending
            .iter()
            .find_map(|(h, a)| (a == address).then_some(*h))
    }

    /// Every request ever issued, in order.
    #[must_use]
    pub fn request_log(&self) -> &[(RequestHandle, TileAddress<D>)] {
        &self.request_log
    }

    /// Handles passed to [`TileProvider::cancel`].
    #[must_use]
    pub fn cancelled(&self) -> &[RequestHandle] {
        &self.cancelled
    }

    /// Queue a completion for `handle`, pending or not.
    ///
    /// Completing a handle the cache has already cancelled is allowed and
    /// models a result that was in flight when the cancellation happened.
    pub fn complete(&mut self, handle: RequestHandle, result: Result<P, FetchError>) {
        self.pending.remove(&handle);
        self.ready.push(Completion { handle, result });
    }

    /// Complete every pending request with the payload `make` produces for its address.
    pub fn complete_all(&mut self, mut make: impl FnMut(TileAddress<D>) -> Result<P, FetchError>) {
        let mut pending: Vec<_> = self.pending.drain().collect();
        pending.sort_by_key(|(h, _)| *h);
        for (handle, address) in pending {
            self.ready.push(Completion {
                handle,
                result: make(address),
            });
        }
    }
}

impl<const D: usize, P> TileProvider<D> for ManualProvider<D, P> {
    type Payload = P;

    fn metadata(&self) -> Result<ProviderMetadata, ProviderError> {
        self.metadata.clone().map_err(ProviderError::Unavailable)
    }

    fn request(&mut self, address: TileAddress<D>) -> RequestHandle {
        let handle = RequestHandle(self.next_handle);
        self.next_handle += 1;
        self.pending.insert(handle, address);
        self.request_log.push((handle, address));
        handle
    }

    fn cancel(&mut self, handle: RequestHandle) {
        self.pending.remove(&handle);
        self.cancelled.push(handle);
    }

    fn poll_completions(&mut self, out: &mut Vec<Completion<P>>) {
        out.append(&mut self.ready);
    }
}
