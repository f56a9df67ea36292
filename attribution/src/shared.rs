//! A process-wide orchestrator for hosts that cannot thread one through their code.
//!
//! Prefer constructing an `Orchestrator` and passing it around. When a single global instance
//! is needed, `init` installs one: the first successful call wins and later calls return that
//! same instance, ignoring their arguments.
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::api::AttributionError;
use crate::orchestrator::Orchestrator;
use crate::platform::PlatformContext;
use crate::sink::AnalyticsSink;

static SHARED: OnceCell<Orchestrator> = OnceCell::new();

pub fn init(
    context: PlatformContext,
    sink: Arc<dyn AnalyticsSink>,
    tenant_id: &str,
    tenant_key: &str,
    dry_run: bool,
) -> Result<&'static Orchestrator, AttributionError> {
    SHARED.get_or_try_init(|| Orchestrator::new(context, sink, tenant_id, tenant_key, dry_run))
}

pub fn get() -> Option<&'static Orchestrator> {
    SHARED.get()
}
