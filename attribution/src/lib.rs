//! Marketing attribution for app installs and events.
//!
//! An [`Orchestrator`] resolves the install referrer, asks the match service which campaign
//! brought the user in, and forwards the event, enriched with `utm_*` parameters, to an
//! [`AnalyticsSink`]. Calls never fail once the orchestrator is built; a run that cannot be
//! attributed emits nothing.
pub mod api;
pub mod config;
pub mod match_client;
pub mod orchestrator;
pub mod platform;
pub mod referrer;
pub mod request;
pub mod response;
pub mod shared;
pub mod sink;
pub mod test_utils;
pub mod token;

pub use api::{AttributionError, MatchError, MatchOutcome, ReferrerFailure};
pub use orchestrator::{Orchestrator, RunHandle, RunKind, RunReport, Stage};
pub use platform::{AssumeOnline, Connectivity, PlatformContext};
pub use referrer::{ReferrerOutcome, ReferrerPlatform};
pub use request::AttributionRequest;
pub use response::AttributionResult;
pub use sink::{AnalyticsSink, EventParams, PrintSink};
