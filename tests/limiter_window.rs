mod common;

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use time::Duration;
// self
use common::{FailingStore, StalledStore};
use keymux::{
	clock::{ManualClock, SystemClock},
	limit::{LimiterConfig, RateLimitDecision, RateLimitKey, RateLimitRule, RateLimiter},
	store::{MemoryStore, SharedStore, StoreError, StoreFuture},
};

/// Memory store whose first `EXPIRE` calls fail.
struct FlakyExpireStore {
	inner: Arc<MemoryStore>,
	expire_failures: AtomicUsize,
}
impl SharedStore for FlakyExpireStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		self.inner.get(key)
	}

	fn set_ex<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()> {
		self.inner.set_ex(key, value, ttl)
	}

	fn incr<'a>(&'a self, key: &'a str) -> StoreFuture<'a, i64> {
		self.inner.incr(key)
	}

	fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, bool> {
		let failing = self
			.expire_failures
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok();

		if failing {
			Box::pin(async { Err::<bool, StoreError>(StoreError::backend("EXPIRE: timeout")) })
		} else {
			self.inner.expire(key, ttl)
		}
	}
}

fn limiter() -> (RateLimiter, ManualClock) {
	let (store, clock) = common::memory_store();
	let limiter = RateLimiter::new(store, LimiterConfig::default(), Arc::new(clock.clone()));

	(limiter, clock)
}

#[tokio::test]
async fn sixth_request_in_window_is_limited() {
	let (limiter, clock) = limiter();

	clock.advance(Duration::seconds(15));

	for attempt in 1..=5 {
		assert_eq!(
			limiter.is_limited("client-a", 5, 60).await,
			RateLimitDecision::Allow,
			"Request {attempt} should be admitted."
		);
	}

	let decision = limiter.is_limited("client-a", 5, 60).await;

	assert_eq!(decision, RateLimitDecision::Limited { retry_after: Duration::seconds(45) });

	let retry_after = decision.retry_after_secs().expect("Limited decisions carry a retry hint.");

	assert!(retry_after > 0 && retry_after <= 60);
}

#[tokio::test]
async fn adjacent_windows_are_independent() {
	let (limiter, clock) = limiter();

	for _ in 0..3 {
		assert!(!limiter.is_limited("burst", 3, 60).await.is_limited());
	}

	clock.advance(Duration::seconds(61));

	// Six admitted within ~61 s although the quota is three per window.
	for _ in 0..3 {
		assert!(!limiter.is_limited("burst", 3, 60).await.is_limited());
	}

	assert!(limiter.is_limited("burst", 3, 60).await.is_limited());
}

#[tokio::test]
async fn window_counters_expire_with_the_window() {
	let (store, clock) = common::memory_store();
	let limiter = RateLimiter::new(store.clone(), LimiterConfig::default(), Arc::new(clock.clone()));

	limiter.is_limited("ttl", 10, 60).await;

	assert_eq!(store.len(), 1);

	clock.advance(Duration::seconds(60));

	assert!(store.is_empty());
}

#[tokio::test]
async fn routes_have_independent_quotas() {
	let (limiter, _) = limiter();
	let rule = RateLimitRule::new(1, 60).expect("Rule fixture should be valid.");
	let search = RateLimitKey::for_route("10.0.0.1", "/api/prompts/search");
	let categories = RateLimitKey::for_route("10.0.0.1", "/api/categories");

	assert_eq!(limiter.check(&search, &rule).await, RateLimitDecision::Allow);
	assert!(limiter.check(&search, &rule).await.is_limited());
	assert_eq!(limiter.check(&categories, &rule).await, RateLimitDecision::Allow);
}

#[tokio::test]
async fn failing_store_fails_open() {
	let store = Arc::new(FailingStore::default());
	let limiter = RateLimiter::with_system_clock(store.clone(), LimiterConfig::default());

	for _ in 0..10 {
		assert_eq!(limiter.is_limited("client", 1, 60).await, RateLimitDecision::Allow);
	}

	assert_eq!(store.calls.load(Ordering::SeqCst), 10);

	let direct = store.incr("anything").await.expect_err("The failing store always errors.");

	assert!(matches!(direct, StoreError::Backend { .. }));
}

#[tokio::test(start_paused = true)]
async fn stalled_store_fails_open_after_deadline() {
	let limiter = RateLimiter::new(
		Arc::new(StalledStore),
		LimiterConfig::default().with_store_timeout(Duration::milliseconds(100)),
		Arc::new(SystemClock),
	);

	assert_eq!(limiter.is_limited("client", 1, 60).await, RateLimitDecision::Allow);
}

#[tokio::test]
async fn zero_window_fails_open() {
	let (limiter, _) = limiter();

	for _ in 0..3 {
		assert_eq!(limiter.is_limited("client", 1, 0).await, RateLimitDecision::Allow);
	}
}

#[tokio::test]
async fn zero_quota_fails_open() {
	let (store, clock) = common::memory_store();
	let limiter = RateLimiter::new(store.clone(), LimiterConfig::default(), Arc::new(clock));

	for _ in 0..3 {
		assert_eq!(limiter.is_limited("client", 0, 60).await, RateLimitDecision::Allow);
	}

	assert!(store.is_empty(), "Degenerate limits must not touch the store.");
}

#[tokio::test]
async fn oversized_windows_are_rejected_or_admitted_without_panicking() {
	let (limiter, clock) = limiter();

	assert!(RateLimitRule::new(5, u64::MAX).is_err());

	let longest = RateLimitRule::new(2, RateLimitRule::MAX_WINDOW_SECONDS)
		.expect("The longest representable window should be accepted.");
	let key = RateLimitKey::for_client("10.0.0.9");

	assert_eq!(limiter.check(&key, &longest).await, RateLimitDecision::Allow);
	assert_eq!(limiter.is_limited("raw", 5, u64::MAX).await, RateLimitDecision::Allow);

	clock.advance(Duration::days(365));

	assert_eq!(limiter.check(&key, &longest).await, RateLimitDecision::Allow);
	assert!(limiter.check(&key, &longest).await.is_limited());
}

#[tokio::test]
async fn failed_window_expiry_is_retried() {
	let (inner, clock) = common::memory_store();
	let store = Arc::new(FlakyExpireStore { inner: inner.clone(), expire_failures: AtomicUsize::new(1) });
	let limiter = RateLimiter::new(store, LimiterConfig::default(), Arc::new(clock.clone()));

	assert_eq!(limiter.is_limited("client", 5, 60).await, RateLimitDecision::Allow);
	assert_eq!(limiter.is_limited("client", 5, 60).await, RateLimitDecision::Allow);

	clock.advance(Duration::seconds(60));

	assert!(inner.is_empty(), "The window counter must expire once EXPIRE succeeds.");
}
