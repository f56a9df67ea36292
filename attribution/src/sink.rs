use std::collections::BTreeMap;

use metrics::counter;
use tracing::info;

/// Parameters attached to an analytics event.
pub type EventParams = BTreeMap<String, String>;

/// The analytics backend events are forwarded to, e.g. Firebase Analytics.
///
/// Calls must return promptly. Errors and panics are logged by the caller and never abort
/// the other calls of a run.
pub trait AnalyticsSink: Send + Sync {
    fn log_event(&self, name: &str, params: &EventParams) -> anyhow::Result<()>;
    fn set_user_property(&self, name: &str, value: &str) -> anyhow::Result<()>;
}

pub struct PrintSink {}

impl AnalyticsSink for PrintSink {
    fn log_event(&self, name: &str, params: &EventParams) -> anyhow::Result<()> {
        info!("event {}: {:?}", name, params);
        counter!("attribution_print_sink_calls_total", "call" => "log_event").increment(1);

        Ok(())
    }

    fn set_user_property(&self, name: &str, value: &str) -> anyhow::Result<()> {
        info!("user property {} = {}", name, value);
        counter!("attribution_print_sink_calls_total", "call" => "set_user_property").increment(1);

        Ok(())
    }
}
