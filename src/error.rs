//! Crate-level error types shared across the allocator, limiter, cache, and stores.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical error exposed by public APIs.
///
/// Store outages and undecodable cache payloads are recovered inside the limiter and the
/// cache; this type only reaches callers from constructors and from the raw store helpers.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// A payload could not be encoded or decoded as JSON.
	#[error("Payload serialization failed.")]
	Serialization(#[from] serde_json::Error),
}

/// Configuration and validation failures raised while building components.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// A credential pool was created without credentials.
	#[error("Credential pool must contain at least one credential.")]
	EmptyPool,
	/// The same credential appears twice in one pool.
	#[error("Credential pool contains a duplicate entry at slot {slot}.")]
	DuplicateCredential {
		/// Pool slot of the second occurrence.
		slot: usize,
	},
	/// A per-window quota of zero would never admit a selection.
	#[error("Credential quota per window must be positive.")]
	ZeroQuota,
	/// A rate limit rule would reject every request.
	#[error("Rate limit must admit at least one request per window.")]
	ZeroMaxRequests,
	/// A duration setting is zero or negative.
	#[error("The {setting} duration must be positive.")]
	NonPositiveDuration {
		/// Name of the offending setting.
		setting: &'static str,
	},
	/// A rate limit window longer than the store can express as a TTL.
	#[error("Rate limit window must not exceed {max_seconds} seconds.")]
	WindowTooLong {
		/// Longest accepted window.
		max_seconds: u64,
	},
	/// The shared store connection string could not be used.
	#[error("Shared store connection is invalid: {reason}.")]
	InvalidStoreUrl {
		/// Backend-supplied reason string.
		reason: String,
	},
}
impl ConfigError {
	/// Ensures the provided duration is strictly positive.
	pub fn ensure_positive(setting: &'static str, value: Duration) -> Result<(), Self> {
		if value.is_positive() { Ok(()) } else { Err(Self::NonPositiveDuration { setting }) }
	}
}
