//! Shared response cache for deterministic, idempotent operations.
//!
//! Cache failures never reach callers: store errors, timeouts, and undecodable payloads all
//! degrade to misses, and failed writes only log.

pub mod key;

pub use key::*;

// self
use crate::{
	_prelude::*,
	obs::{self, Component, ComponentSpan, Outcome},
	store::{self, SharedStore},
};

/// Cache settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	/// Leading segment of every key.
	pub namespace: String,
	/// TTL applied by callers that do not pick one.
	pub default_ttl: Duration,
	/// Named arguments that never contribute to keys.
	pub excluded_params: Vec<String>,
	/// Deadline for each store round trip.
	pub store_timeout: Duration,
}
impl CacheConfig {
	/// Overrides the key namespace.
	pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
		self.namespace = namespace.into();

		self
	}

	/// Overrides the default TTL.
	pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
		self.default_ttl = ttl;

		self
	}

	/// Adds a named argument to ignore during key derivation.
	pub fn exclude_param(mut self, name: impl Into<String>) -> Self {
		self.excluded_params.push(name.into());

		self
	}

	/// Overrides the store deadline.
	pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
		self.store_timeout = timeout;

		self
	}
}
impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			namespace: "cache".into(),
			default_ttl: Duration::seconds(300),
			excluded_params: vec!["request".into()],
			store_timeout: Duration::milliseconds(250),
		}
	}
}

/// JSON cache over a [`SharedStore`].
#[derive(Clone)]
pub struct ResponseCache {
	store: Arc<dyn SharedStore>,
	config: CacheConfig,
}
impl ResponseCache {
	/// Creates a cache over `store`.
	pub fn new(store: Arc<dyn SharedStore>, config: CacheConfig) -> Self {
		Self { store, config }
	}

	/// Settings the cache was built with.
	pub fn config(&self) -> &CacheConfig {
		&self.config
	}

	/// Derives the key for `operation` called with `args`.
	pub fn compute_key(&self, operation: &str, args: &CallArgs) -> CacheKey {
		key::compute_key(&self.config.namespace, operation, args, &self.config.excluded_params)
	}

	/// Returns the decoded value stored under `key`, or `None` on a miss or any failure.
	pub async fn get<T>(&self, key: &CacheKey) -> Option<T>
	where
		T: DeserializeOwned,
	{
		let key = key.as_str();
		let raw = match store::with_deadline(
			"GET",
			self.config.store_timeout,
			self.store.get(key),
		)
		.await
		{
			Ok(Some(raw)) => raw,
			Ok(None) => {
				tracing::debug!(key, "cache miss");
				obs::record_outcome(Component::Cache, Outcome::Miss);

				return None;
			},
			Err(e) => {
				tracing::warn!(key, error = %e, "cache read failed, treating as miss");
				obs::record_outcome(Component::Cache, Outcome::Degraded);

				return None;
			},
		};
		let mut deserializer = serde_json::Deserializer::from_str(&raw);

		match serde_path_to_error::deserialize(&mut deserializer) {
			Ok(value) => {
				tracing::debug!(key, "cache hit");
				obs::record_outcome(Component::Cache, Outcome::Hit);

				Some(value)
			},
			Err(e) => {
				tracing::warn!(
					key,
					path = %e.path(),
					error = %e.inner(),
					"cached payload is undecodable, treating as miss"
				);
				obs::record_outcome(Component::Cache, Outcome::Degraded);

				None
			},
		}
	}

	/// Stores `value` under `key` for `ttl`; returns whether the write landed.
	pub async fn set<T>(&self, key: &CacheKey, value: &T, ttl: Duration) -> bool
	where
		T: ?Sized + Serialize,
	{
		let key = key.as_str();

		if !ttl.is_positive() {
			tracing::warn!(key, ttl = %ttl, "refusing to cache with a non-positive ttl");

			return false;
		}

		let payload = match serde_json::to_string(value) {
			Ok(payload) => payload,
			Err(e) => {
				tracing::warn!(key, error = %e, "cache payload is not serializable");
				obs::record_outcome(Component::Cache, Outcome::Degraded);

				return false;
			},
		};

		match store::with_deadline(
			"SET",
			self.config.store_timeout,
			self.store.set_ex(key, payload, ttl),
		)
		.await
		{
			Ok(()) => {
				tracing::debug!(key, ttl = %ttl, "cache entry stored");
				obs::record_outcome(Component::Cache, Outcome::Stored);

				true
			},
			Err(e) => {
				tracing::warn!(key, error = %e, "cache write failed");
				obs::record_outcome(Component::Cache, Outcome::Degraded);

				false
			},
		}
	}

	/// Serves `operation(args)` from the cache, computing and storing it on a miss.
	///
	/// `op` runs at most once and only on a miss. Errors from `op` are returned unchanged and
	/// never cached.
	pub async fn get_or_compute<T, E, F, Fut>(
		&self,
		operation: &str,
		args: &CallArgs,
		ttl: Duration,
		op: F,
	) -> Result<T, E>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		let key = self.compute_key(operation, args);
		let span = ComponentSpan::new(Component::Cache, "get_or_compute");

		if let Some(cached) = span.instrument(self.get::<T>(&key)).await {
			return Ok(cached);
		}

		let value = op().await?;

		span.instrument(self.set(&key, &value, ttl)).await;

		Ok(value)
	}
}
impl Debug for ResponseCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResponseCache").field("config", &self.config).finish()
	}
}
