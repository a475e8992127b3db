//! Round-robin credential selection under a per-credential quota and cooldown.
//!
//! Each credential carries a usage counter and the instant it was last used. A counter is
//! reset lazily: only when the cursor reaches that credential and its cooldown has elapsed
//! since the last use. When a full scan finds no capacity, [`CredentialAllocator::next_available`]
//! waits (at most one backoff interval, less when a cooldown is about to elapse) and scans
//! again; exhaustion therefore surfaces as latency, never as an error.

// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	credential::Credential,
	error::ConfigError,
	obs::{self, Component, ComponentSpan, Outcome},
};

/// Pool-wide quota settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
	/// Selections each credential may serve before its cooldown must elapse.
	pub quota_per_window: u32,
	/// Idle time after the last use that resets a credential's counter.
	pub cooldown: Duration,
	/// Upper bound on a single wait when the whole pool is exhausted.
	pub backoff: Duration,
}
impl AllocatorConfig {
	const DEFAULT_BACKOFF: Duration = Duration::seconds(30);
	const DEFAULT_COOLDOWN: Duration = Duration::seconds(60);
	const DEFAULT_QUOTA: u32 = 10;

	/// Overrides the per-window quota.
	pub fn with_quota_per_window(mut self, quota: u32) -> Self {
		self.quota_per_window = quota;

		self
	}

	/// Overrides the cooldown window.
	pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
		self.cooldown = cooldown;

		self
	}

	/// Overrides the exhaustion backoff.
	pub fn with_backoff(mut self, backoff: Duration) -> Self {
		self.backoff = backoff;

		self
	}

	/// Rejects settings that would stall the pool forever.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.quota_per_window == 0 {
			return Err(ConfigError::ZeroQuota);
		}

		ConfigError::ensure_positive("cooldown", self.cooldown)?;
		ConfigError::ensure_positive("backoff", self.backoff)
	}
}
impl Default for AllocatorConfig {
	fn default() -> Self {
		Self {
			quota_per_window: Self::DEFAULT_QUOTA,
			cooldown: Self::DEFAULT_COOLDOWN,
			backoff: Self::DEFAULT_BACKOFF,
		}
	}
}

/// Result of a single non-blocking scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Availability {
	/// A credential with remaining capacity.
	Ready(Credential),
	/// Every credential is at quota; scan again after `retry_in`.
	Exhausted {
		/// Suggested wait before the next scan.
		retry_in: Duration,
	},
}

/// Read-only view of one pool slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CredentialUsage {
	/// Position of the credential in the pool.
	pub slot: usize,
	/// Recorded uses since the last reset.
	pub usage_count: u32,
	/// Instant of the last recorded use (pool construction time before the first use).
	pub last_used_at: OffsetDateTime,
	/// Whether a scan reaching this slot now would select it.
	pub available: bool,
}

#[derive(Clone, Copy, Debug)]
struct UsageCounter {
	usage_count: u32,
	last_used_at: OffsetDateTime,
}

#[derive(Debug)]
struct PoolState {
	cursor: usize,
	counters: Vec<UsageCounter>,
}

/// Hands out credentials round-robin while enforcing the pool quota.
///
/// Counters live behind one mutex that is never held across an `.await`, so the allocator
/// can be shared through an [`Arc`] by any number of tasks.
pub struct CredentialAllocator {
	credentials: Vec<Credential>,
	slots: HashMap<Credential, usize>,
	state: Mutex<PoolState>,
	config: AllocatorConfig,
	clock: Arc<dyn Clock>,
}
impl CredentialAllocator {
	/// Builds an allocator over a fixed pool, reading time from `clock`.
	pub fn new<I, S>(credentials: I, config: AllocatorConfig, clock: Arc<dyn Clock>) -> Result<Self>
	where
		I: IntoIterator<Item = S>,
		S: Into<Credential>,
	{
		config.validate()?;

		let credentials = credentials.into_iter().map(Into::into).collect::<Vec<Credential>>();

		if credentials.is_empty() {
			return Err(ConfigError::EmptyPool.into());
		}

		let mut slots = HashMap::with_capacity(credentials.len());

		for (slot, credential) in credentials.iter().enumerate() {
			if slots.insert(credential.clone(), slot).is_some() {
				return Err(ConfigError::DuplicateCredential { slot }.into());
			}
		}

		let now = clock.now();
		let counters =
			vec![UsageCounter { usage_count: 0, last_used_at: now }; credentials.len()];

		tracing::info!(
			credentials = credentials.len(),
			quota = config.quota_per_window,
			cooldown = %config.cooldown,
			"credential pool initialized"
		);

		Ok(Self {
			credentials,
			slots,
			state: Mutex::new(PoolState { cursor: 0, counters }),
			config,
			clock,
		})
	}

	/// Builds an allocator that reads wall-clock time.
	pub fn with_system_clock<I, S>(credentials: I, config: AllocatorConfig) -> Result<Self>
	where
		I: IntoIterator<Item = S>,
		S: Into<Credential>,
	{
		Self::new(credentials, config, Arc::new(SystemClock))
	}

	/// Pool size.
	pub fn len(&self) -> usize {
		self.credentials.len()
	}

	/// Always false; empty pools are rejected at construction.
	pub fn is_empty(&self) -> bool {
		self.credentials.is_empty()
	}

	/// Settings the pool was built with.
	pub fn config(&self) -> &AllocatorConfig {
		&self.config
	}

	/// Scans the pool once from the cursor without waiting.
	///
	/// The cursor stays on a returned credential, so repeated calls without
	/// [`mark_used`](Self::mark_used) keep returning it.
	pub fn poll_available(&self) -> Availability {
		let _span = ComponentSpan::new(Component::Allocator, "poll_available").entered();
		let now = self.clock.now();
		let pool_len = self.credentials.len();
		let mut state = self.state.lock();

		for _ in 0..pool_len {
			let slot = state.cursor;
			let counter = &mut state.counters[slot];

			if now - counter.last_used_at >= self.config.cooldown {
				counter.usage_count = 0;
			}
			if counter.usage_count < self.config.quota_per_window {
				tracing::debug!(slot, usage = counter.usage_count, "credential selected");
				obs::record_outcome(Component::Allocator, Outcome::Selected);

				return Availability::Ready(self.credentials[slot].clone());
			}

			state.cursor = (slot + 1) % pool_len;
		}

		let retry_in = state
			.counters
			.iter()
			.filter_map(|counter| counter.last_used_at.checked_add(self.config.cooldown))
			.map(|reset_at| reset_at - now)
			.filter(|remaining| remaining.is_positive())
			.min()
			.map_or(self.config.backoff, |remaining| remaining.min(self.config.backoff));

		obs::record_outcome(Component::Allocator, Outcome::Exhausted);

		Availability::Exhausted { retry_in }
	}

	/// Returns the next credential with capacity, waiting for capacity when the pool is
	/// exhausted.
	pub async fn next_available(&self) -> Credential {
		let span = ComponentSpan::new(Component::Allocator, "next_available");

		span.instrument(async {
			loop {
				match self.poll_available() {
					Availability::Ready(credential) => return credential,
					Availability::Exhausted { retry_in } => {
						tracing::warn!(
							credentials = self.len(),
							retry_in = %retry_in,
							"credential pool exhausted, waiting for capacity"
						);

						self.clock.sleep(retry_in).await;
					},
				}
			}
		})
		.await
	}

	/// Records one successful use of `credential`.
	///
	/// Call this only after the upstream call actually consumed quota. Returns `false` and
	/// leaves every counter untouched for a credential outside the pool.
	pub fn mark_used(&self, credential: &Credential) -> bool {
		let Some(&slot) = self.slots.get(credential) else {
			tracing::warn!("ignoring usage report for a credential outside the pool");

			return false;
		};
		let now = self.clock.now();
		let pool_len = self.credentials.len();
		let mut state = self.state.lock();
		let counter = &mut state.counters[slot];

		counter.usage_count = counter.usage_count.saturating_add(1);
		counter.last_used_at = now;

		let usage = counter.usage_count;

		// Move past the used credential so consecutive select/use pairs rotate.
		if state.cursor == slot {
			state.cursor = (slot + 1) % pool_len;
		}

		tracing::debug!(slot, usage, "credential usage recorded");

		true
	}

	/// Returns per-slot usage without applying lazy resets.
	pub fn snapshot(&self) -> Vec<CredentialUsage> {
		let now = self.clock.now();
		let state = self.state.lock();

		state
			.counters
			.iter()
			.enumerate()
			.map(|(slot, counter)| CredentialUsage {
				slot,
				usage_count: counter.usage_count,
				last_used_at: counter.last_used_at,
				available: counter.usage_count < self.config.quota_per_window
					|| now - counter.last_used_at >= self.config.cooldown,
			})
			.collect()
	}
}
impl Debug for CredentialAllocator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialAllocator")
			.field("credentials", &self.credentials.len())
			.field("config", &self.config)
			.finish()
	}
}
