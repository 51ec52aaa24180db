//! Observability helpers for broker flows.
//!
//! Spans are always emitted (the binary installs a `tracing` subscriber at
//! startup); enable the `metrics` feature to additionally increment the
//! `bff_broker_flow_total` counter for every attempt/success/failure,
//! labeled by `flow` + `outcome`.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::_prelude::*;

/// Credential flows observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authorization code exchange after the provider callback.
	AuthorizationCode,
	/// Refresh token flow.
	Refresh,
	/// On-behalf-of exchange of an inbound bearer token.
	OnBehalfOf,
	/// Client credentials (app-only) flow.
	ClientCredentials,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::AuthorizationCode => "authorization_code",
			FlowKind::Refresh => "refresh",
			FlowKind::OnBehalfOf => "on_behalf_of",
			FlowKind::ClientCredentials => "client_credentials",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a broker helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// A span builder used by broker flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		Self { span: tracing::info_span!("bff_broker.flow", flow = kind.as_str(), stage) }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> tracing::instrument::Instrumented<Fut>
	where
		Fut: Future,
	{
		// crates.io
		use tracing::Instrument;

		fut.instrument(self.span.clone())
	}
}

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"bff_broker_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Process-local counters for refresh contention diagnostics.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	reuses: AtomicU64,
}
impl RefreshMetrics {
	/// Counts a refresh actually sent to the provider.
	pub fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	/// Counts a caller that waited on the singleflight guard and reused the
	/// winner's tokens instead of refreshing again.
	pub fn record_reuse(&self) {
		self.reuses.fetch_add(1, Ordering::Relaxed);
	}

	/// Number of provider refresh calls made.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Number of refreshes avoided via the singleflight guard.
	pub fn reuses(&self) -> u64 {
		self.reuses.load(Ordering::Relaxed)
	}
}
