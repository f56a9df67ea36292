use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use metrics::counter;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::api::{AttributionError, MatchOutcome, SinkError};
use crate::config::{Config, MatchClientConfig};
use crate::match_client::MatchClient;
use crate::platform::PlatformContext;
use crate::referrer::{ReferrerOutcome, ReferrerResolver};
use crate::request::{AttributionRequest, BFPID, EVENT_NAME, INSTALL_REFERRER};
use crate::response::AttributionResult;
use crate::sink::{AnalyticsSink, EventParams};
use crate::token::TenantCredentials;

pub const FIRST_OPEN: &str = "first_open";
pub const CAMPAIGN_DETAILS: &str = "campaign_details";

/// Stages a pipeline run moves through. Every run ends at `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    ResolvingReferrer,
    ReferrerOk,
    ReferrerFailed,
    Matching,
    MatchOk,
    MatchFailed,
    Dispatching,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Event,
    FirstOpen,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Event => "event",
            RunKind::FirstOpen => "first_open",
        }
    }
}

/// What happened during one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub kind: RunKind,
    pub event_name: String,
    pub stages: Vec<Stage>,
    /// The request as sent to the match service, after merging in the referrer.
    pub request: AttributionRequest,
    pub referrer: Option<ReferrerOutcome>,
    pub matched: Option<MatchOutcome>,
    pub dry_run: bool,
    pub sink_calls: usize,
    pub sink_failures: usize,
}

impl RunReport {
    fn new(kind: RunKind, event_name: &str, request: AttributionRequest, dry_run: bool) -> Self {
        Self {
            kind,
            event_name: event_name.to_owned(),
            stages: vec![Stage::Init],
            request,
            referrer: None,
            matched: None,
            dry_run,
            sink_calls: 0,
            sink_failures: 0,
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug!(from = ?self.stages.last(), to = ?stage, "attribution run stage");
        self.stages.push(stage);
    }

    pub fn stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Init)
    }

    pub fn result(&self) -> Option<&AttributionResult> {
        match &self.matched {
            Some(Ok(result)) => Some(result),
            _ => None,
        }
    }

    fn record_sink_call(&mut self, result: Result<(), SinkError>) {
        self.sink_calls += 1;
        if let Err(e) = result {
            self.sink_failures += 1;
            error!("{}", e);
        }
    }
}

/// A pipeline run in flight. Dropping it does not cancel the run.
pub struct RunHandle {
    handle: Option<JoinHandle<RunReport>>,
}

impl RunHandle {
    fn skipped() -> Self {
        Self { handle: None }
    }

    /// True when the call was rejected before any work started.
    pub fn is_skipped(&self) -> bool {
        self.handle.is_none()
    }

    /// Wait for the run to reach `Done`. `None` if it was skipped or its task died.
    pub async fn wait(self) -> Option<RunReport> {
        match self.handle?.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("attribution run aborted: {}", e);
                None
            }
        }
    }
}

struct Inner {
    credentials: Arc<TenantCredentials>,
    sink: Arc<dyn AnalyticsSink>,
    resolver: ReferrerResolver,
    match_client: MatchClient,
    runtime: Handle,
    dry_run: bool,
}

/// Entry point for embedding applications: resolves attribution for an event and forwards
/// the enriched event to the analytics sink.
///
/// `log_event` and `first_open` return immediately; the run happens on the runtime captured
/// in the `PlatformContext`. Neither ever fails: problems are logged, and a run whose match
/// fails simply emits nothing.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        context: PlatformContext,
        sink: Arc<dyn AnalyticsSink>,
        tenant_id: &str,
        tenant_key: &str,
        dry_run: bool,
    ) -> Result<Self, AttributionError> {
        Self::with_match_config(
            context,
            sink,
            tenant_id,
            tenant_key,
            dry_run,
            &MatchClientConfig::default(),
        )
    }

    pub fn from_config(
        context: PlatformContext,
        sink: Arc<dyn AnalyticsSink>,
        config: &Config,
    ) -> Result<Self, AttributionError> {
        Self::with_match_config(
            context,
            sink,
            config.tenant_id.as_str(),
            config.tenant_key.as_str(),
            config.dry_run,
            &config.match_client(),
        )
    }

    pub fn with_match_config(
        context: PlatformContext,
        sink: Arc<dyn AnalyticsSink>,
        tenant_id: &str,
        tenant_key: &str,
        dry_run: bool,
        match_config: &MatchClientConfig,
    ) -> Result<Self, AttributionError> {
        let credentials = Arc::new(TenantCredentials::new(tenant_id, tenant_key)?);
        let match_client = MatchClient::new(
            match_config,
            credentials.clone(),
            context.connectivity.clone(),
        )?;

        info!(
            tenant_id = credentials.tenant_id(),
            endpoint = %match_client.endpoint(),
            dry_run,
            "attribution orchestrator ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                credentials,
                sink,
                resolver: ReferrerResolver::new(context.referrer.clone()),
                match_client,
                runtime: context.runtime().clone(),
                dry_run,
            }),
        })
    }

    pub fn tenant_id(&self) -> &str {
        self.inner.credentials.tenant_id()
    }

    pub fn is_dry_run(&self) -> bool {
        self.inner.dry_run
    }

    /// Log `event_name` with `extra_params`, enriched with attribution parameters.
    ///
    /// `extra_params` and `request` are copied before this returns; later changes by the
    /// caller do not reach the run. A blank event name is logged and ignored.
    pub fn log_event(
        &self,
        event_name: &str,
        extra_params: &EventParams,
        request: &AttributionRequest,
    ) -> RunHandle {
        if event_name.trim().is_empty() {
            warn!("event name cannot be empty, dropping event");
            return RunHandle::skipped();
        }

        self.spawn(
            RunKind::Event,
            event_name,
            extra_params.clone(),
            request.clone(),
        )
    }

    /// Report the first open of the app: sets the attribution user properties and logs
    /// `<tenant>_first_open`, `<tenant>_campaign_details`, `first_open` and `campaign_details`.
    ///
    /// A user property is only set for a field the match service returned, so a partial
    /// match makes fewer than three `set_user_property` calls. The four events are always
    /// logged.
    pub fn first_open(&self, request: &AttributionRequest) -> RunHandle {
        self.spawn(
            RunKind::FirstOpen,
            FIRST_OPEN,
            EventParams::new(),
            request.clone(),
        )
    }

    fn spawn(
        &self,
        kind: RunKind,
        event_name: &str,
        params: EventParams,
        request: AttributionRequest,
    ) -> RunHandle {
        counter!("attribution_runs_total", "kind" => kind.as_str()).increment(1);

        let span = info_span!("attribution_run", kind = kind.as_str(), event = event_name);
        let inner = self.inner.clone();
        let event_name = event_name.to_owned();

        let handle = self
            .inner
            .runtime
            .spawn(run_pipeline(inner, kind, event_name, params, request).instrument(span));

        RunHandle {
            handle: Some(handle),
        }
    }
}

async fn run_pipeline(
    inner: Arc<Inner>,
    kind: RunKind,
    event_name: String,
    params: EventParams,
    mut request: AttributionRequest,
) -> RunReport {
    request.set(EVENT_NAME, event_name.as_str());
    let mut report = RunReport::new(kind, &event_name, AttributionRequest::new(), inner.dry_run);

    report.enter(Stage::ResolvingReferrer);
    let referrer = inner.resolver.resolve().await;
    request.set(INSTALL_REFERRER, referrer.marker());
    if let Some(bfpid) = referrer.bfpid() {
        debug!(bfpid = %bfpid, "click id found in install referrer");
        request.set(BFPID, bfpid);
    }
    report.enter(if referrer.is_resolved() {
        Stage::ReferrerOk
    } else {
        Stage::ReferrerFailed
    });
    report.referrer = Some(referrer);

    report.enter(Stage::Matching);
    let outcome = inner.match_client.match_request(&request).await;
    report.request = request;

    match &outcome {
        Ok(result) => {
            report.enter(Stage::MatchOk);
            report.enter(Stage::Dispatching);
            if inner.dry_run {
                info!(event = %event_name, ?result, "dry run, not forwarding to analytics sink");
            } else {
                match kind {
                    RunKind::Event => dispatch_event(&inner, &mut report, &event_name, params, result),
                    RunKind::FirstOpen => dispatch_first_open(&inner, &mut report, params, result),
                }
            }
        }
        Err(e) => {
            report.enter(Stage::MatchFailed);
            error!(event = %event_name, "match failed, event not forwarded: {}", e);
        }
    }

    report.matched = Some(outcome);
    report.enter(Stage::Done);
    report
}

fn dispatch_event(
    inner: &Inner,
    report: &mut RunReport,
    event_name: &str,
    mut params: EventParams,
    result: &AttributionResult,
) {
    params.extend(result.to_params());

    let sink = inner.sink.as_ref();
    report.record_sink_call(guard_sink_call(LOG_EVENT_CALL, event_name, || {
        sink.log_event(event_name, &params)
    }));
}

fn dispatch_first_open(
    inner: &Inner,
    report: &mut RunReport,
    mut params: EventParams,
    result: &AttributionResult,
) {
    params.extend(result.to_params());

    let sink = inner.sink.as_ref();
    let tenant_id = inner.credentials.tenant_id();

    for (field, value) in result.fields() {
        let Some(value) = value else {
            debug!(field, "no attribution value, skipping user property");
            continue;
        };
        let property = user_property_name(tenant_id, field);
        report.record_sink_call(guard_sink_call(SET_USER_PROPERTY_CALL, &property, || {
            sink.set_user_property(&property, value)
        }));
    }

    let events = [
        format!("{tenant_id}_{FIRST_OPEN}"),
        format!("{tenant_id}_{CAMPAIGN_DETAILS}"),
        FIRST_OPEN.to_owned(),
        CAMPAIGN_DETAILS.to_owned(),
    ];
    for name in &events {
        report.record_sink_call(guard_sink_call(LOG_EVENT_CALL, name, || {
            sink.log_event(name, &params)
        }));
    }
}

/// `<tenant>_utm_<field>`, with `-` replaced by `_` as analytics property names require.
pub fn user_property_name(tenant_id: &str, field: &str) -> String {
    format!("{tenant_id}_utm_{field}").replace('-', "_")
}

const LOG_EVENT_CALL: &str = "log_event";
const SET_USER_PROPERTY_CALL: &str = "set_user_property";

/// Run one sink call, turning an error or a panic into a `SinkError`. `kind` is the sink
/// method being called and `call` the event or property name.
fn guard_sink_call<F>(kind: &'static str, call: &str, f: F) -> Result<(), SinkError>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    let outcome = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SinkError {
            kind,
            call: call.to_owned(),
            message: e.to_string(),
        }),
        Err(panic) => Err(SinkError {
            kind,
            call: call.to_owned(),
            message: panic_message(panic.as_ref()),
        }),
    };

    let label = if outcome.is_ok() { "ok" } else { "error" };
    counter!("attribution_sink_calls_total", "call" => kind, "outcome" => label).increment(1);

    outcome
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_owned()
    }
}
