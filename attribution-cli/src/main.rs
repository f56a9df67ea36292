//! Run one attribution pipeline against a printing sink.
//!
//! Usage:
//!   attribution-cli event <name> [key=value ...]
//!   attribution-cli first-open [key=value ...]
//!
//! Configuration is read from the environment (`TENANT_ID`, `TENANT_KEY`, `MATCH_BASE_URL`,
//! `DRY_RUN`, ...). `INSTALL_REFERRER` stands in for the platform referrer; without it the
//! referrer is reported as not supported.
use std::sync::Arc;

use anyhow::{bail, Context};
use envconfig::Envconfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use attribution::config::Config;
use attribution::referrer::{StaticReferrer, StaticReferrerPlatform};
use attribution::{
    AssumeOnline, AttributionRequest, EventParams, Orchestrator, PlatformContext, PrintSink,
};

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Event {
        name: String,
        request: AttributionRequest,
    },
    FirstOpen {
        request: AttributionRequest,
    },
}

fn parse_request<I: Iterator<Item = String>>(args: I) -> anyhow::Result<AttributionRequest> {
    let mut request = AttributionRequest::new();
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            bail!("expected key=value, got {arg}");
        };
        request.set(key, value);
    }
    Ok(request)
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> anyhow::Result<Command> {
    match args.next().as_deref() {
        Some("event") => {
            let name = args.next().context("missing event name")?;
            Ok(Command::Event {
                name,
                request: parse_request(args)?,
            })
        }
        Some("first-open") => Ok(Command::FirstOpen {
            request: parse_request(args)?,
        }),
        Some(other) => bail!("unknown command {other}, expected event or first-open"),
        None => bail!("usage: attribution-cli (event <name> | first-open) [key=value ...]"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::init_from_env().context("invalid configuration")?;
    let command = parse_args(std::env::args().skip(1))?;

    let referrer = match std::env::var("INSTALL_REFERRER") {
        Ok(referrer) => StaticReferrerPlatform::new(StaticReferrer::Referrer(referrer)),
        Err(_) => StaticReferrerPlatform::unsupported(),
    };
    let context = PlatformContext::current(Arc::new(referrer), Arc::new(AssumeOnline))?;
    let orchestrator = Orchestrator::from_config(context, Arc::new(PrintSink {}), &config)?;

    let handle = match &command {
        Command::Event { name, request } => {
            orchestrator.log_event(name, &EventParams::new(), request)
        }
        Command::FirstOpen { request } => orchestrator.first_open(request),
    };

    match handle.wait().await {
        Some(report) => info!(
            stages = ?report.stages,
            referrer = ?report.referrer,
            matched = ?report.matched,
            sink_calls = report.sink_calls,
            sink_failures = report.sink_failures,
            "attribution run finished"
        ),
        None => warn!("attribution run did not complete"),
    }

    Ok(())
}
