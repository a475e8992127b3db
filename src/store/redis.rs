//! Redis-backed [`SharedStore`] for deployments where several processes share quotas and
//! cache entries.

// crates.io
use redis::{Client, aio::MultiplexedConnection};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	store::{SharedStore, StoreError, StoreFuture},
};

/// Store that issues one Redis command per primitive over a multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
	connection: MultiplexedConnection,
}
impl RedisStore {
	/// Connects to the Redis server at `url` (e.g. `redis://127.0.0.1/`).
	pub async fn open(url: &str) -> Result<Self> {
		let client = Client::open(url)
			.map_err(|e| ConfigError::InvalidStoreUrl { reason: e.to_string() })?;
		let connection =
			client.get_multiplexed_async_connection().await.map_err(StoreError::backend)?;

		tracing::info!("connected to redis shared store");

		Ok(Self::from_connection(connection))
	}

	/// Wraps an already established connection.
	pub fn from_connection(connection: MultiplexedConnection) -> Self {
		Self { connection }
	}
}
impl Debug for RedisStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("RedisStore(..)")
	}
}
impl SharedStore for RedisStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let mut connection = self.connection.clone();

		Box::pin(async move {
			let value: Option<String> = redis::cmd("GET")
				.arg(key)
				.query_async(&mut connection)
				.await
				.map_err(StoreError::backend)?;

			Ok(value)
		})
	}

	fn set_ex<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()> {
		let mut connection = self.connection.clone();

		Box::pin(async move {
			let _: () = redis::cmd("SET")
				.arg(key)
				.arg(value)
				.arg("EX")
				.arg(ttl_seconds(ttl))
				.query_async(&mut connection)
				.await
				.map_err(StoreError::backend)?;

			Ok(())
		})
	}

	fn incr<'a>(&'a self, key: &'a str) -> StoreFuture<'a, i64> {
		let mut connection = self.connection.clone();

		Box::pin(async move {
			let value: i64 = redis::cmd("INCR")
				.arg(key)
				.query_async(&mut connection)
				.await
				.map_err(StoreError::backend)?;

			Ok(value)
		})
	}

	fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, bool> {
		let mut connection = self.connection.clone();

		Box::pin(async move {
			let applied: bool = redis::cmd("EXPIRE")
				.arg(key)
				.arg(ttl_seconds(ttl))
				.query_async(&mut connection)
				.await
				.map_err(StoreError::backend)?;

			Ok(applied)
		})
	}
}

// Redis takes whole seconds and rejects `EX 0`; fractional TTLs round up.
fn ttl_seconds(ttl: Duration) -> i64 {
	let whole = ttl.whole_seconds();
	let rounded = if ttl.subsec_nanoseconds() > 0 { whole.saturating_add(1) } else { whole };

	rounded.max(1)
}
