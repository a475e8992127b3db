//! Observability helpers shared by every component.
//!
//! # Feature Flags
//!
//! - Spans named `keymux.stage` carry `component` and `stage` fields and are always emitted
//!   through `tracing`.
//! - Enable `metrics` to increment the `keymux_outcome_total` counter for every recorded
//!   outcome, labeled by `component` + `outcome`.

mod counter;
mod span;

pub use self::{counter::*, span::*};

// self
use crate::_prelude::*;

/// Components that report outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Component {
	/// Credential rotation.
	Allocator,
	/// Fixed-window admission control.
	Limiter,
	/// Response memoization.
	Cache,
	/// Admission pipeline composition.
	Dispatcher,
}
impl Component {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Component::Allocator => "allocator",
			Component::Limiter => "limiter",
			Component::Cache => "cache",
			Component::Dispatcher => "dispatcher",
		}
	}
}
impl Display for Component {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded by the components.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// A credential was handed out.
	Selected,
	/// A full scan found no credential with capacity.
	Exhausted,
	/// A request was admitted.
	Allowed,
	/// A request was rejected by its window quota.
	Limited,
	/// A store failure was absorbed by admitting the request.
	FailOpen,
	/// A cached payload was served.
	Hit,
	/// No usable cached payload existed.
	Miss,
	/// A payload was written to the store.
	Stored,
	/// A store or codec failure was absorbed.
	Degraded,
	/// A dispatched operation succeeded.
	Success,
	/// A dispatched operation failed.
	Failure,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Selected => "selected",
			Outcome::Exhausted => "exhausted",
			Outcome::Allowed => "allowed",
			Outcome::Limited => "limited",
			Outcome::FailOpen => "fail_open",
			Outcome::Hit => "hit",
			Outcome::Miss => "miss",
			Outcome::Stored => "stored",
			Outcome::Degraded => "degraded",
			Outcome::Success => "success",
			Outcome::Failure => "failure",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
