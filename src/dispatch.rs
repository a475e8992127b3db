//! Admission pipeline composing the limiter, the cache, and the credential allocator.
//!
//! [`Dispatcher::dispatch`] runs the stages in a fixed, visible order:
//! `admit → lookup → acquire → invoke → record`. A limiter rejection short-circuits before
//! the cache or the pool are touched, and a cache hit short-circuits before a credential is
//! taken. Nothing is recorded for a failed operation.

mod metrics;

pub use self::metrics::DispatchMetrics;

// self
use crate::{
	_prelude::*,
	cache::{CacheKey, CallArgs, ResponseCache},
	credential::{Credential, CredentialAllocator},
	limit::{RateLimitDecision, RateLimitKey, RateLimitRule, RateLimiter},
	obs::{self, Component, ComponentSpan, Outcome},
};

/// Cache participation for one dispatched call.
#[derive(Clone, Debug)]
pub struct CachePolicy {
	/// Operation name used to namespace the key.
	pub operation: String,
	/// Arguments that identify the result.
	pub args: CallArgs,
	/// Entry lifetime; falls back to the cache's default TTL.
	pub ttl: Option<Duration>,
}
impl CachePolicy {
	/// Caches `operation(args)` with the default TTL.
	pub fn new(operation: impl Into<String>, args: CallArgs) -> Self {
		Self { operation: operation.into(), args, ttl: None }
	}

	/// Overrides the entry lifetime.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = Some(ttl);

		self
	}
}

/// Which stages a dispatched call participates in.
#[derive(Clone, Debug, Default)]
pub struct DispatchRequest {
	/// Quota to check before anything else.
	pub limit: Option<(RateLimitKey, RateLimitRule)>,
	/// Cache participation.
	pub cache: Option<CachePolicy>,
	/// Whether the operation needs a pooled credential.
	pub needs_credential: bool,
}
impl DispatchRequest {
	/// A request that skips every stage and simply invokes the operation.
	pub fn new() -> Self {
		Self::default()
	}

	/// Applies `rule` to `key` before invoking.
	pub fn limited(mut self, key: RateLimitKey, rule: RateLimitRule) -> Self {
		self.limit = Some((key, rule));

		self
	}

	/// Serves and stores the result through the cache.
	pub fn cached(mut self, policy: CachePolicy) -> Self {
		self.cache = Some(policy);

		self
	}

	/// Hands the operation a credential from the pool.
	pub fn with_credential(mut self) -> Self {
		self.needs_credential = true;

		self
	}
}

/// Caller-visible dispatch failures.
#[derive(Debug, ThisError)]
pub enum DispatchError<E> {
	/// The caller's window quota is spent.
	#[error("Rate limit exceeded, retry after {retry_after}.")]
	QuotaExceeded {
		/// Time left until the next window opens.
		retry_after: Duration,
	},
	/// The request asked for a credential but the dispatcher has no pool.
	#[error("Request needs a credential but no credential pool is configured.")]
	NoAllocator,
	/// The wrapped operation failed.
	#[error("Dispatched operation failed: {0}")]
	Operation(E),
}
impl<E> DispatchError<E> {
	/// Seconds to advertise in a retry-after response, for quota rejections.
	pub fn retry_after_secs(&self) -> Option<u64> {
		match self {
			Self::QuotaExceeded { retry_after } => u64::try_from(retry_after.whole_seconds()).ok(),
			_ => None,
		}
	}
}

/// Composes the admission stages around arbitrary operations.
#[derive(Clone)]
pub struct Dispatcher {
	limiter: RateLimiter,
	cache: ResponseCache,
	allocator: Option<Arc<CredentialAllocator>>,
	metrics: Arc<DispatchMetrics>,
}
impl Dispatcher {
	/// Creates a dispatcher without a credential pool.
	pub fn new(limiter: RateLimiter, cache: ResponseCache) -> Self {
		Self { limiter, cache, allocator: None, metrics: Default::default() }
	}

	/// Attaches the pool used by requests that need a credential.
	pub fn with_allocator(mut self, allocator: Arc<CredentialAllocator>) -> Self {
		self.allocator = Some(allocator);

		self
	}

	/// Shared in-process counters.
	pub fn metrics(&self) -> &DispatchMetrics {
		&self.metrics
	}

	/// Runs `op` through the stages selected by `request`.
	///
	/// `op` receives the pooled credential when one was requested. On success the
	/// credential's usage is recorded and the result cached; on failure neither happens.
	pub async fn dispatch<T, E, F, Fut>(
		&self,
		request: DispatchRequest,
		op: F,
	) -> Result<T, DispatchError<E>>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce(Option<Credential>) -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		let span = ComponentSpan::new(Component::Dispatcher, "dispatch");

		self.metrics.record_attempt();

		let result = span.instrument(self.run_stages(request, op)).await;

		match &result {
			Ok(_) => obs::record_outcome(Component::Dispatcher, Outcome::Success),
			Err(DispatchError::QuotaExceeded { .. }) =>
				obs::record_outcome(Component::Dispatcher, Outcome::Limited),
			Err(_) => obs::record_outcome(Component::Dispatcher, Outcome::Failure),
		}

		result
	}

	async fn run_stages<T, E, F, Fut>(
		&self,
		request: DispatchRequest,
		op: F,
	) -> Result<T, DispatchError<E>>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce(Option<Credential>) -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		if let Some((key, rule)) = &request.limit {
			if let RateLimitDecision::Limited { retry_after } = self.limiter.check(key, rule).await {
				self.metrics.record_rejection();

				return Err(DispatchError::QuotaExceeded { retry_after });
			}
		}

		let cache_slot = request.cache.as_ref().map(|policy| self.cache_slot(policy));

		if let Some((key, _)) = &cache_slot {
			if let Some(hit) = self.cache.get::<T>(key).await {
				self.metrics.record_cache_hit();

				return Ok(hit);
			}
		}

		let credential = if request.needs_credential {
			let allocator = self.allocator.as_ref().ok_or(DispatchError::NoAllocator)?;

			Some(allocator.next_available().await)
		} else {
			None
		};
		let value = match op(credential.clone()).await {
			Ok(value) => value,
			Err(e) => {
				self.metrics.record_failure();

				return Err(DispatchError::Operation(e));
			},
		};

		if let (Some(allocator), Some(credential)) = (&self.allocator, &credential) {
			allocator.mark_used(credential);
		}
		if let Some((key, ttl)) = &cache_slot {
			self.cache.set(key, &value, *ttl).await;
		}

		self.metrics.record_success();

		Ok(value)
	}

	fn cache_slot(&self, policy: &CachePolicy) -> (CacheKey, Duration) {
		let key = self.cache.compute_key(&policy.operation, &policy.args);

		(key, policy.ttl.unwrap_or(self.cache.config().default_ttl))
	}
}
impl Debug for Dispatcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Dispatcher")
			.field("limiter", &self.limiter)
			.field("cache", &self.cache)
			.field("allocator", &self.allocator)
			.finish()
	}
}
