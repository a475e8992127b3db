//! Request mediation for rate-limited upstreams: rotate API keys under per-key quotas, gate
//! calls behind distributed fixed-window limits, and memoize idempotent results in a shared
//! key-value store.
//!
//! Every collaborator is injected. A typical process builds one [`store::SharedStore`], one
//! [`credential::CredentialAllocator`] per key pool, a [`limit::RateLimiter`], and a
//! [`cache::ResponseCache`], then composes them through a [`dispatch::Dispatcher`].

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod clock;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod limit;
pub mod obs;
pub mod store;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::Mutex;
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "redis")] pub use redis;
#[cfg(test)] use color_eyre as _;
