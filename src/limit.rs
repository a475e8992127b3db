//! Fixed-window admission control keyed by caller identity and route.
//!
//! Time is cut into non-overlapping windows of `window_seconds`; each `(key, window)` pair
//! owns an independent counter in the [`SharedStore`]. Bursts straddling a window boundary
//! may therefore admit up to twice the quota. A store that errors or stalls never blocks
//! traffic: the limiter fails open and logs.

// self
use crate::{
	_prelude::*,
	clock::{self, Clock, SystemClock},
	error::ConfigError,
	obs::{self, Component, ComponentSpan, Outcome},
	store::{self, SharedStore},
};

/// Identity a quota is counted against.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateLimitKey(String);
impl RateLimitKey {
	/// Wraps a raw key.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Per-client quota shared by every route.
	pub fn for_client(client: impl AsRef<str>) -> Self {
		Self::new(client.as_ref())
	}

	/// Independent quota for each `(client, route)` pair.
	pub fn for_route(client: impl AsRef<str>, route: impl AsRef<str>) -> Self {
		Self(format!("{}:{}", client.as_ref(), route.as_ref()))
	}

	/// Returns the key as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for RateLimitKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Display for RateLimitKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Quota applied to a key: at most `max_requests` per `window_seconds` window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
	/// Requests admitted per window.
	pub max_requests: u64,
	/// Window length in seconds.
	pub window_seconds: u64,
}
impl RateLimitRule {
	/// Longest window whose TTL a store can hold (Redis keeps expiries in milliseconds).
	pub const MAX_WINDOW_SECONDS: u64 = i64::MAX as u64 / 1_000;

	/// Creates a validated rule.
	pub fn new(max_requests: u64, window_seconds: u64) -> Result<Self, ConfigError> {
		if max_requests == 0 {
			return Err(ConfigError::ZeroMaxRequests);
		}
		if window_seconds == 0 {
			return Err(ConfigError::NonPositiveDuration { setting: "window" });
		}
		if window_seconds > Self::MAX_WINDOW_SECONDS {
			return Err(ConfigError::WindowTooLong { max_seconds: Self::MAX_WINDOW_SECONDS });
		}

		Ok(Self { max_requests, window_seconds })
	}
}
impl Default for RateLimitRule {
	fn default() -> Self {
		Self { max_requests: 100, window_seconds: 60 }
	}
}

/// Result of an admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The request may proceed.
	Allow,
	/// The window quota is spent.
	Limited {
		/// Time left until the next window opens.
		retry_after: Duration,
	},
}
impl RateLimitDecision {
	/// Returns true for [`RateLimitDecision::Limited`].
	pub fn is_limited(&self) -> bool {
		matches!(self, Self::Limited { .. })
	}

	/// Whole seconds until the next window, for limited decisions.
	pub fn retry_after_secs(&self) -> Option<u64> {
		match self {
			Self::Allow => None,
			Self::Limited { retry_after } => u64::try_from(retry_after.whole_seconds()).ok(),
		}
	}
}

/// Limiter settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
	/// Deadline for each store round trip.
	pub store_timeout: Duration,
}
impl LimiterConfig {
	/// Overrides the store deadline.
	pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
		self.store_timeout = timeout;

		self
	}
}
impl Default for LimiterConfig {
	fn default() -> Self {
		Self { store_timeout: Duration::milliseconds(250) }
	}
}

/// Window keys whose `EXPIRE` failed, with the TTL still owed to each.
type PendingExpiry = Arc<Mutex<HashMap<String, Duration>>>;

/// Coordinator that counts requests in the shared store.
///
/// Counters live in the store. The only local state is the set of window keys whose
/// expiry could not be set; those are retried on the next successful count.
#[derive(Clone)]
pub struct RateLimiter {
	store: Arc<dyn SharedStore>,
	config: LimiterConfig,
	clock: Arc<dyn Clock>,
	pending_expiry: PendingExpiry,
}
impl RateLimiter {
	/// Creates a limiter over `store`, reading window boundaries from `clock`.
	pub fn new(store: Arc<dyn SharedStore>, config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
		Self { store, config, clock, pending_expiry: Default::default() }
	}

	/// Creates a limiter that reads wall-clock time.
	pub fn with_system_clock(store: Arc<dyn SharedStore>, config: LimiterConfig) -> Self {
		Self::new(store, config, Arc::new(SystemClock))
	}

	/// Applies `rule` to `key`.
	pub async fn check(&self, key: &RateLimitKey, rule: &RateLimitRule) -> RateLimitDecision {
		self.is_limited(key.as_str(), rule.max_requests, rule.window_seconds).await
	}

	/// Counts one request for `key` in the current window and decides admission.
	///
	/// The first `max_requests` requests of a window are admitted. Later ones are limited
	/// with `retry_after` set to the time left in the window (`1..=window_seconds` seconds).
	/// A zero quota or a zero window cannot be counted and fails open.
	pub async fn is_limited(
		&self,
		key: &str,
		max_requests: u64,
		window_seconds: u64,
	) -> RateLimitDecision {
		let span = ComponentSpan::new(Component::Limiter, "is_limited");

		span.instrument(self.count_and_decide(key, max_requests, window_seconds)).await
	}

	async fn count_and_decide(
		&self,
		key: &str,
		max_requests: u64,
		window_seconds: u64,
	) -> RateLimitDecision {
		if window_seconds == 0 || max_requests == 0 {
			tracing::warn!(
				key,
				max_requests,
				window_seconds,
				"degenerate rate limit, admitting request"
			);
			obs::record_outcome(Component::Limiter, Outcome::FailOpen);

			return RateLimitDecision::Allow;
		}

		let now = clock::unix_seconds(self.clock.now());
		let window_key = format!("{key}:{}", now / window_seconds);
		let timeout = self.config.store_timeout;
		let count = match store::with_deadline("INCR", timeout, self.store.incr(&window_key)).await
		{
			Ok(count) => count,
			Err(e) => {
				tracing::warn!(key, error = %e, "rate limit store unavailable, failing open");
				obs::record_outcome(Component::Limiter, Outcome::FailOpen);

				return RateLimitDecision::Allow;
			},
		};

		self.retry_pending_expiry().await;

		if count == 1 {
			let window = Duration::seconds(i64::try_from(window_seconds).unwrap_or(i64::MAX));

			self.expire_window(&window_key, window).await;
		}
		if u64::try_from(count).is_ok_and(|count| count > max_requests) {
			let remaining = window_seconds - now % window_seconds;
			let retry_after = Duration::seconds(i64::try_from(remaining).unwrap_or(i64::MAX));

			tracing::debug!(key, count, retry_after = %retry_after, "request limited");
			obs::record_outcome(Component::Limiter, Outcome::Limited);

			return RateLimitDecision::Limited { retry_after };
		}

		obs::record_outcome(Component::Limiter, Outcome::Allowed);

		RateLimitDecision::Allow
	}

	async fn expire_window(&self, window_key: &str, window: Duration) {
		let expire = self.store.expire(window_key, window);

		if let Err(e) = store::with_deadline("EXPIRE", self.config.store_timeout, expire).await {
			tracing::error!(
				window_key,
				error = %e,
				"rate limit window has no expiry, retrying on the next request"
			);

			self.pending_expiry.lock().insert(window_key.to_owned(), window);
		}
	}

	async fn retry_pending_expiry(&self) {
		let pending = self.pending_expiry.lock().drain().collect::<Vec<_>>();

		for (window_key, window) in pending {
			self.expire_window(&window_key, window).await;
		}
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter").field("config", &self.config).finish()
	}
}
