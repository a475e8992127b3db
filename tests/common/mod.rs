//! Store doubles and fixtures shared by the integration tests.

#![allow(dead_code)]

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use time::{Duration, OffsetDateTime, macros::datetime};
// self
use keymux::{
	clock::ManualClock,
	store::{MemoryStore, SharedStore, StoreError, StoreFuture},
};

/// Window-aligned instant (a multiple of 60 s since the epoch).
pub const T0: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

/// Store whose every primitive fails, counting calls.
#[derive(Debug, Default)]
pub struct FailingStore {
	pub calls: AtomicUsize,
}
impl FailingStore {
	fn fail<T>(&self, command: &str) -> StoreFuture<'_, T>
	where
		T: 'static + Send,
	{
		self.calls.fetch_add(1, Ordering::SeqCst);

		let message = format!("{command}: connection refused");

		Box::pin(async move { Err::<T, StoreError>(StoreError::Backend { message }) })
	}
}
impl SharedStore for FailingStore {
	fn get<'a>(&'a self, _: &'a str) -> StoreFuture<'a, Option<String>> {
		self.fail("GET")
	}

	fn set_ex<'a>(&'a self, _: &'a str, _: String, _: Duration) -> StoreFuture<'a, ()> {
		self.fail("SET")
	}

	fn incr<'a>(&'a self, _: &'a str) -> StoreFuture<'a, i64> {
		self.fail("INCR")
	}

	fn expire<'a>(&'a self, _: &'a str, _: Duration) -> StoreFuture<'a, bool> {
		self.fail("EXPIRE")
	}
}

/// Store that never answers.
#[derive(Debug, Default)]
pub struct StalledStore;
impl SharedStore for StalledStore {
	fn get<'a>(&'a self, _: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(std::future::pending::<Result<Option<String>, StoreError>>())
	}

	fn set_ex<'a>(&'a self, _: &'a str, _: String, _: Duration) -> StoreFuture<'a, ()> {
		Box::pin(std::future::pending::<Result<(), StoreError>>())
	}

	fn incr<'a>(&'a self, _: &'a str) -> StoreFuture<'a, i64> {
		Box::pin(std::future::pending::<Result<i64, StoreError>>())
	}

	fn expire<'a>(&'a self, _: &'a str, _: Duration) -> StoreFuture<'a, bool> {
		Box::pin(std::future::pending::<Result<bool, StoreError>>())
	}
}

/// Manual clock at [`T0`] plus a memory store reading from it.
pub fn memory_store() -> (Arc<MemoryStore>, ManualClock) {
	let clock = ManualClock::new(T0);
	let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));

	(store, clock)
}
