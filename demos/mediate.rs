//! Demonstrates routing calls to a rate-limited upstream through one [`Dispatcher`].
//!
//! The in-memory store stands in for a shared key-value service; with the `redis` feature,
//! swap it for `RedisStore::open("redis://127.0.0.1/")`.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use time::Duration;
// self
use keymux::{
	cache::{CacheConfig, CallArgs, ResponseCache},
	credential::{AllocatorConfig, Credential, CredentialAllocator},
	dispatch::{CachePolicy, DispatchError, DispatchRequest, Dispatcher},
	limit::{LimiterConfig, RateLimitKey, RateLimitRule, RateLimiter},
	store::{MemoryStore, SharedStore},
};

#[derive(Debug, Serialize, Deserialize)]
struct Completion {
	model: String,
	text: String,
}

async fn complete(credential: Option<Credential>, prompt: &str) -> Result<Completion, String> {
	let credential = credential.ok_or("missing API key")?;

	Ok(Completion {
		model: "upstream-mini".into(),
		text: format!("[{}] {prompt}", credential.expose()),
	})
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::default());
	let allocator = Arc::new(CredentialAllocator::with_system_clock(
		["sk-demo-1", "sk-demo-2", "sk-demo-3"],
		AllocatorConfig::default().with_quota_per_window(2),
	)?);
	let dispatcher = Dispatcher::new(
		RateLimiter::with_system_clock(store.clone(), LimiterConfig::default()),
		ResponseCache::new(store, CacheConfig::default().with_default_ttl(Duration::minutes(5))),
	)
	.with_allocator(allocator.clone());
	let rule = RateLimitRule::new(4, 60)?;

	for prompt in ["summarize", "translate", "summarize", "classify", "rewrite"] {
		let request = DispatchRequest::new()
			.limited(RateLimitKey::for_route("203.0.113.7", "/v1/complete"), rule)
			.cached(CachePolicy::new("complete", CallArgs::new().named("prompt", prompt)))
			.with_credential();
		let outcome = dispatcher
			.dispatch(request, |credential| async move { complete(credential, prompt).await })
			.await;

		match outcome {
			Ok(completion) => println!("{prompt}: {} ({})", completion.text, completion.model),
			Err(e @ DispatchError::QuotaExceeded { .. }) => println!(
				"{prompt}: rate limited, retry after {}s",
				e.retry_after_secs().unwrap_or_default()
			),
			Err(e) => println!("{prompt}: {e}"),
		}
	}

	let metrics = dispatcher.metrics();

	println!(
		"attempts={} rejected={} cache_hits={} ok={} failed={}",
		metrics.attempts(),
		metrics.rejections(),
		metrics.cache_hits(),
		metrics.successes(),
		metrics.failures(),
	);

	for usage in allocator.snapshot() {
		println!("slot {} used {} time(s)", usage.slot, usage.usage_count);
	}

	Ok(())
}
