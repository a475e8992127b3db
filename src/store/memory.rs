//! Thread-safe in-memory [`SharedStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	store::{SharedStore, StoreError, StoreFuture},
};

#[derive(Clone, Debug)]
struct StoreEntry {
	value: String,
	expires_at: Option<OffsetDateTime>,
}
impl StoreEntry {
	fn is_live_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_none_or(|at| now < at)
	}
}

type StoreMap = Arc<Mutex<HashMap<String, StoreEntry>>>;

/// Process-local store that honours TTLs against an injectable [`Clock`].
///
/// Every primitive runs under a single lock, which makes each one atomic exactly like the
/// corresponding command on a remote key-value service.
#[derive(Clone)]
pub struct MemoryStore {
	map: StoreMap,
	clock: Arc<dyn Clock>,
}
impl MemoryStore {
	/// Creates an empty store that reads time from `clock`.
	pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
		Self { map: Default::default(), clock }
	}

	/// Number of live (non-expired) keys.
	pub fn len(&self) -> usize {
		let now = self.clock.now();

		self.map.lock().values().filter(|entry| entry.is_live_at(now)).count()
	}

	/// Returns true if no live keys remain.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn get_now(&self, key: &str) -> Option<String> {
		let now = self.clock.now();
		let mut guard = self.map.lock();

		match guard.get(key) {
			Some(entry) if entry.is_live_at(now) => Some(entry.value.clone()),
			Some(_) => {
				guard.remove(key);

				None
			},
			None => None,
		}
	}

	// A TTL past the representable calendar never expires.
	fn set_now(&self, key: &str, value: String, ttl: Duration) {
		let expires_at = self.clock.now().checked_add(ttl);

		self.map.lock().insert(key.to_owned(), StoreEntry { value, expires_at });
	}

	fn incr_now(&self, key: &str) -> Result<i64, StoreError> {
		let now = self.clock.now();
		let mut guard = self.map.lock();
		let entry = guard
			.entry(key.to_owned())
			.and_modify(|entry| {
				if !entry.is_live_at(now) {
					*entry = StoreEntry { value: "0".into(), expires_at: None };
				}
			})
			.or_insert_with(|| StoreEntry { value: "0".into(), expires_at: None });
		let current = entry.value.parse::<i64>().map_err(|_| StoreError::Serialization {
			message: format!("value under `{key}` is not an integer"),
		})?;
		let next = current.checked_add(1).ok_or_else(|| StoreError::Serialization {
			message: format!("increment under `{key}` would overflow"),
		})?;

		entry.value = next.to_string();

		Ok(next)
	}

	fn expire_now(&self, key: &str, ttl: Duration) -> bool {
		let now = self.clock.now();
		let mut guard = self.map.lock();

		match guard.get_mut(key) {
			Some(entry) if entry.is_live_at(now) => {
				entry.expires_at = now.checked_add(ttl);

				true
			},
			Some(_) => {
				guard.remove(key);

				false
			},
			None => false,
		}
	}
}
impl Default for MemoryStore {
	fn default() -> Self {
		Self::with_clock(Arc::new(SystemClock))
	}
}
impl Debug for MemoryStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryStore").field("keys", &self.map.lock().len()).finish()
	}
}
impl SharedStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Ok(self.get_now(key)) })
	}

	fn set_ex<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.set_now(key, value, ttl);

			Ok(())
		})
	}

	fn incr<'a>(&'a self, key: &'a str) -> StoreFuture<'a, i64> {
		Box::pin(async move { self.incr_now(key) })
	}

	fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(self.expire_now(key, ttl)) })
	}
}
