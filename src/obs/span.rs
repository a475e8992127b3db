// crates.io
use tracing::instrument::Instrumented;
// self
use crate::{_prelude::*, obs::Component};

/// A span builder used around component stages.
#[derive(Clone, Debug)]
pub struct ComponentSpan {
	span: tracing::Span,
}
impl ComponentSpan {
	/// Creates a new span tagged with the provided component + stage.
	pub fn new(component: Component, stage: &'static str) -> Self {
		Self { span: tracing::debug_span!("keymux.stage", component = component.as_str(), stage) }
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> ComponentSpanGuard {
		ComponentSpanGuard { _guard: self.span.entered() }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		use tracing::Instrument;

		fut.instrument(self.span.clone())
	}
}

/// RAII guard returned by [`ComponentSpan::entered`].
pub struct ComponentSpanGuard {
	_guard: tracing::span::EnteredSpan,
}
impl Debug for ComponentSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("ComponentSpanGuard(..)")
	}
}
