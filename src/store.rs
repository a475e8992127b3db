//! Shared key-value store contract and built-in implementations.
//!
//! The limiter and the cache coordinate exclusively through a [`SharedStore`], so several
//! processes pointed at the same backend observe the same windows and cache entries. Each
//! primitive must be atomic on its own; no multi-key transactions are required.

pub mod memory;
#[cfg(feature = "redis")] pub mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")] pub use self::redis::RedisStore;

// self
use crate::_prelude::*;

/// Boxed future returned by every [`SharedStore`] primitive.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Atomic string-keyed primitives with TTL support (`GET`, `SET .. EX`, `INCR`, `EXPIRE`).
pub trait SharedStore
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`, if present and not expired.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Stores `value` under `key`, replacing any previous value, expiring after `ttl`.
	fn set_ex<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()>;

	/// Increments the integer under `key` (starting from zero) and returns the new value.
	fn incr<'a>(&'a self, key: &'a str) -> StoreFuture<'a, i64>;

	/// Sets a TTL on an existing key; returns `false` when the key does not exist.
	fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, bool>;
}

/// Error type produced by [`SharedStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// A stored value had an unexpected shape (e.g. `INCR` on a non-integer).
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure (connection refused, protocol error, ...).
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// The store did not answer before the caller's deadline.
	#[error("Store {operation} timed out after {timeout}.")]
	Timeout {
		/// Primitive that stalled.
		operation: &'static str,
		/// Deadline that elapsed.
		timeout: Duration,
	},
}
impl StoreError {
	/// Wraps any backend failure.
	pub fn backend(err: impl Display) -> Self {
		Self::Backend { message: err.to_string() }
	}
}

/// Awaits a store round trip, failing with [`StoreError::Timeout`] once `timeout` elapses.
pub async fn with_deadline<T>(
	operation: &'static str,
	timeout: Duration,
	call: StoreFuture<'_, T>,
) -> Result<T, StoreError> {
	match tokio::time::timeout(timeout.unsigned_abs(), call).await {
		Ok(result) => result,
		Err(_) => Err(StoreError::Timeout { operation, timeout }),
	}
}
