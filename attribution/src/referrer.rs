use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::ReferrerFailure;
use crate::request::BFPID;

/// Setup codes reported by the platform install referrer service.
pub const RESPONSE_OK: i32 = 0;
pub const RESPONSE_SERVICE_UNAVAILABLE: i32 = 1;
pub const RESPONSE_FEATURE_NOT_SUPPORTED: i32 = 2;

/// How a connection attempt to the referrer service ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupEvent {
    Finished(i32),
    Disconnected,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// A single-use session with the platform referrer service.
#[async_trait]
pub trait ReferrerConnection: Send {
    async fn start_connection(&mut self) -> Result<SetupEvent, TransportError>;
    async fn install_referrer(&mut self) -> Result<String, TransportError>;
    fn end_connection(&mut self);
}

/// Opens referrer sessions. Sessions are never reused: each lookup gets a fresh one.
pub trait ReferrerPlatform: Send + Sync {
    fn connect(&self) -> Result<Box<dyn ReferrerConnection>, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferrerOutcome {
    Resolved(String),
    Failed(ReferrerFailure),
}

impl ReferrerOutcome {
    /// Value recorded on the match request: `success:<raw>` or `error:<reason>`.
    pub fn marker(&self) -> String {
        match self {
            ReferrerOutcome::Resolved(referrer) => format!("success:{referrer}"),
            ReferrerOutcome::Failed(failure) => failure.marker(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ReferrerOutcome::Resolved(_))
    }

    /// The `bfpid` click id carried in the referrer query string, if any.
    pub fn bfpid(&self) -> Option<String> {
        match self {
            ReferrerOutcome::Resolved(referrer) => extract_query_param(referrer, BFPID),
            ReferrerOutcome::Failed(_) => None,
        }
    }
}

fn extract_query_param(referrer: &str, name: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = if referrer.contains("://") {
        match url::Url::parse(referrer) {
            Ok(url) => url.query_pairs().into_owned().collect(),
            Err(e) => {
                debug!("referrer is not a valid url: {}", e);
                return None;
            }
        }
    } else {
        match serde_urlencoded::from_str(referrer.trim_start_matches('?')) {
            Ok(pairs) => pairs,
            Err(e) => {
                debug!("referrer is not a query string: {}", e);
                return None;
            }
        }
    };

    pairs
        .into_iter()
        .find(|(key, value)| key == name && !value.trim().is_empty())
        .map(|(_, value)| value)
}

/// Ends the wrapped connection exactly once, on release or on drop.
struct ConnectionGuard {
    connection: Box<dyn ReferrerConnection>,
    released: bool,
}

impl ConnectionGuard {
    fn new(connection: Box<dyn ReferrerConnection>) -> Self {
        Self {
            connection,
            released: false,
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.connection.end_connection();
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Clone)]
pub struct ReferrerResolver {
    platform: Arc<dyn ReferrerPlatform>,
}

impl ReferrerResolver {
    pub fn new(platform: Arc<dyn ReferrerPlatform>) -> Self {
        Self { platform }
    }

    /// Look up the install referrer once. Every platform response maps to one outcome.
    pub async fn resolve(&self) -> ReferrerOutcome {
        let outcome = match self.platform.connect() {
            Ok(connection) => {
                let mut guard = ConnectionGuard::new(connection);
                let outcome = read_referrer(&mut guard).await;
                guard.release();
                outcome
            }
            Err(e) => ReferrerOutcome::Failed(ReferrerFailure::TransportError(e.0)),
        };

        match &outcome {
            ReferrerOutcome::Resolved(referrer) => {
                debug!(referrer = %referrer, "install referrer resolved");
                counter!("attribution_referrer_total", "outcome" => "resolved").increment(1);
            }
            ReferrerOutcome::Failed(failure) => {
                warn!(reason = failure.reason(), "install referrer not resolved: {}", failure);
                counter!("attribution_referrer_total", "outcome" => failure.reason().to_owned())
                    .increment(1);
            }
        }

        outcome
    }
}

async fn read_referrer(guard: &mut ConnectionGuard) -> ReferrerOutcome {
    let failure = match guard.connection.start_connection().await {
        Ok(SetupEvent::Finished(RESPONSE_OK)) => {
            return match guard.connection.install_referrer().await {
                Ok(referrer) if referrer.trim().is_empty() => {
                    ReferrerOutcome::Failed(ReferrerFailure::Empty)
                }
                Ok(referrer) => ReferrerOutcome::Resolved(referrer),
                Err(e) => ReferrerOutcome::Failed(ReferrerFailure::TransportError(e.0)),
            };
        }
        Ok(SetupEvent::Finished(RESPONSE_FEATURE_NOT_SUPPORTED)) => ReferrerFailure::NotSupported,
        Ok(SetupEvent::Finished(RESPONSE_SERVICE_UNAVAILABLE)) => {
            ReferrerFailure::ServiceUnavailable
        }
        Ok(SetupEvent::Finished(code)) => ReferrerFailure::SetupFailed(code),
        Ok(SetupEvent::Disconnected) => ReferrerFailure::Disconnected,
        Err(e) => ReferrerFailure::TransportError(e.0),
    };

    ReferrerOutcome::Failed(failure)
}

/// What a `StaticReferrerPlatform` answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticReferrer {
    Referrer(String),
    SetupCode(i32),
    Disconnected,
}

/// A platform with a fixed answer, for hosts without an install referrer service.
pub struct StaticReferrerPlatform {
    answer: StaticReferrer,
}

impl StaticReferrerPlatform {
    pub fn new(answer: StaticReferrer) -> Self {
        Self { answer }
    }

    pub fn unsupported() -> Self {
        Self::new(StaticReferrer::SetupCode(RESPONSE_FEATURE_NOT_SUPPORTED))
    }
}

impl ReferrerPlatform for StaticReferrerPlatform {
    fn connect(&self) -> Result<Box<dyn ReferrerConnection>, TransportError> {
        Ok(Box::new(StaticConnection {
            answer: self.answer.clone(),
        }))
    }
}

struct StaticConnection {
    answer: StaticReferrer,
}

#[async_trait]
impl ReferrerConnection for StaticConnection {
    async fn start_connection(&mut self) -> Result<SetupEvent, TransportError> {
        Ok(match self.answer {
            StaticReferrer::Referrer(_) => SetupEvent::Finished(RESPONSE_OK),
            StaticReferrer::SetupCode(code) => SetupEvent::Finished(code),
            StaticReferrer::Disconnected => SetupEvent::Disconnected,
        })
    }

    async fn install_referrer(&mut self) -> Result<String, TransportError> {
        match &self.answer {
            StaticReferrer::Referrer(referrer) => Ok(referrer.clone()),
            _ => Err(TransportError("referrer requested before setup".to_owned())),
        }
    }

    fn end_connection(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{StubReferrer, StubReferrerPlatform};

    async fn resolve_with(stub: StubReferrer) -> (ReferrerOutcome, Arc<StubReferrerPlatform>) {
        let platform = Arc::new(StubReferrerPlatform::new(stub));
        let resolver = ReferrerResolver::new(platform.clone());
        (resolver.resolve().await, platform)
    }

    #[tokio::test]
    async fn resolves_referrer() {
        let (outcome, platform) =
            resolve_with(StubReferrer::Referrer("utm_source=google".to_owned())).await;

        assert_eq!(
            outcome,
            ReferrerOutcome::Resolved("utm_source=google".to_owned())
        );
        assert_eq!(outcome.marker(), "success:utm_source=google");
        assert_eq!(platform.opened(), 1);
        assert_eq!(platform.released(), 1);
    }

    #[tokio::test]
    async fn maps_every_failure_and_releases_once() {
        let cases = [
            (StubReferrer::Referrer("   ".to_owned()), ReferrerFailure::Empty),
            (
                StubReferrer::SetupCode(RESPONSE_FEATURE_NOT_SUPPORTED),
                ReferrerFailure::NotSupported,
            ),
            (
                StubReferrer::SetupCode(RESPONSE_SERVICE_UNAVAILABLE),
                ReferrerFailure::ServiceUnavailable,
            ),
            (StubReferrer::SetupCode(3), ReferrerFailure::SetupFailed(3)),
            (StubReferrer::Disconnected, ReferrerFailure::Disconnected),
            (
                StubReferrer::StartError("binder died".to_owned()),
                ReferrerFailure::TransportError("binder died".to_owned()),
            ),
            (
                StubReferrer::FetchError("remote exception".to_owned()),
                ReferrerFailure::TransportError("remote exception".to_owned()),
            ),
        ];

        for (stub, expected) in cases {
            let (outcome, platform) = resolve_with(stub).await;

            assert_eq!(outcome, ReferrerOutcome::Failed(expected));
            assert_eq!(platform.opened(), 1);
            assert_eq!(platform.released(), 1);
        }
    }

    #[tokio::test]
    async fn connect_failure_is_a_transport_error() {
        let (outcome, platform) =
            resolve_with(StubReferrer::ConnectError("no binder".to_owned())).await;

        assert_eq!(
            outcome,
            ReferrerOutcome::Failed(ReferrerFailure::TransportError("no binder".to_owned()))
        );
        assert_eq!(platform.opened(), 0);
        assert_eq!(platform.released(), 0);
    }

    #[tokio::test]
    async fn each_resolve_opens_a_fresh_connection() {
        let platform = Arc::new(StubReferrerPlatform::new(StubReferrer::Referrer(
            "r".to_owned(),
        )));
        let resolver = ReferrerResolver::new(platform.clone());

        resolver.resolve().await;
        resolver.resolve().await;

        assert_eq!(platform.opened(), 2);
        assert_eq!(platform.released(), 2);
    }

    #[tokio::test]
    async fn static_platform_answers() {
        let resolver = ReferrerResolver::new(Arc::new(StaticReferrerPlatform::unsupported()));
        assert_eq!(
            resolver.resolve().await.marker(),
            "error:not_supported"
        );

        let resolver = ReferrerResolver::new(Arc::new(StaticReferrerPlatform::new(
            StaticReferrer::Referrer("utm_medium=organic".to_owned()),
        )));
        assert!(resolver.resolve().await.is_resolved());
    }

    #[test]
    fn extracts_bfpid() {
        let query = ReferrerOutcome::Resolved("utm_source=google&bfpid=abc123".to_owned());
        assert_eq!(query.bfpid().as_deref(), Some("abc123"));

        let url = ReferrerOutcome::Resolved("https://example.com/app?bfpid=xyz&x=1".to_owned());
        assert_eq!(url.bfpid().as_deref(), Some("xyz"));

        let encoded = ReferrerOutcome::Resolved("bfpid=a%20b".to_owned());
        assert_eq!(encoded.bfpid().as_deref(), Some("a b"));

        let blank = ReferrerOutcome::Resolved("bfpid=&utm_source=x".to_owned());
        assert_eq!(blank.bfpid(), None);

        let failed = ReferrerOutcome::Failed(ReferrerFailure::Empty);
        assert_eq!(failed.bfpid(), None);
    }
}
