use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::platform::Connectivity;
use crate::referrer::{ReferrerConnection, ReferrerPlatform, SetupEvent, TransportError, RESPONSE_OK};
use crate::sink::{AnalyticsSink, EventParams};

// mockall is awkward with async traits and boxed connections, so these stubs are hand-rolled.

/// What a `StubReferrerPlatform` connection does.
#[derive(Debug, Clone)]
pub enum StubReferrer {
    Referrer(String),
    SetupCode(i32),
    Disconnected,
    StartError(String),
    FetchError(String),
    ConnectError(String),
    /// Answer with a referrer after a delay.
    Slow(Duration, String),
}

/// A referrer platform counting how many connections it opened and how many were ended.
pub struct StubReferrerPlatform {
    behaviour: StubReferrer,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl StubReferrerPlatform {
    pub fn new(behaviour: StubReferrer) -> Self {
        Self {
            behaviour,
            opened: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl ReferrerPlatform for StubReferrerPlatform {
    fn connect(&self) -> Result<Box<dyn ReferrerConnection>, TransportError> {
        if let StubReferrer::ConnectError(message) = &self.behaviour {
            return Err(TransportError(message.clone()));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(StubConnection {
            behaviour: self.behaviour.clone(),
            released: self.released.clone(),
            ended: false,
        }))
    }
}

struct StubConnection {
    behaviour: StubReferrer,
    released: Arc<AtomicUsize>,
    ended: bool,
}

#[async_trait]
impl ReferrerConnection for StubConnection {
    async fn start_connection(&mut self) -> Result<SetupEvent, TransportError> {
        match &self.behaviour {
            StubReferrer::SetupCode(code) => Ok(SetupEvent::Finished(*code)),
            StubReferrer::Disconnected => Ok(SetupEvent::Disconnected),
            StubReferrer::StartError(message) => Err(TransportError(message.clone())),
            StubReferrer::Slow(delay, _) => {
                tokio::time::sleep(*delay).await;
                Ok(SetupEvent::Finished(RESPONSE_OK))
            }
            _ => Ok(SetupEvent::Finished(RESPONSE_OK)),
        }
    }

    async fn install_referrer(&mut self) -> Result<String, TransportError> {
        match &self.behaviour {
            StubReferrer::Referrer(referrer) | StubReferrer::Slow(_, referrer) => Ok(referrer.clone()),
            StubReferrer::FetchError(message) => Err(TransportError(message.clone())),
            other => Err(TransportError(format!("unexpected fetch for {other:?}"))),
        }
    }

    fn end_connection(&mut self) {
        assert!(!self.ended, "referrer connection ended twice");
        self.ended = true;
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct StubConnectivity {
    online: AtomicBool,
}

impl StubConnectivity {
    pub fn online() -> Self {
        Self {
            online: AtomicBool::new(true),
        }
    }

    pub fn offline() -> Self {
        Self {
            online: AtomicBool::new(false),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Connectivity for StubConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Event(String, EventParams),
    UserProperty(String, String),
}

/// A sink recording every call it receives. Selected names can be made to fail or panic;
/// failing calls are still recorded.
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_owned());
        self
    }

    pub fn panicking_on(mut self, name: &str) -> Self {
        self.panicking.insert(name.to_owned());
        self
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn events(&self) -> Vec<(String, EventParams)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Event(name, params) => Some((name, params)),
                SinkCall::UserProperty(..) => None,
            })
            .collect()
    }

    pub fn user_properties(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::UserProperty(name, value) => Some((name, value)),
                SinkCall::Event(..) => None,
            })
            .collect()
    }

    fn record(&self, name: &str, call: SinkCall) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);

        if self.panicking.contains(name) {
            panic!("sink panicked on {name}");
        }

        if self.failing.contains(name) {
            return Err(anyhow!("sink rejected {name}"));
        }

        Ok(())
    }
}

impl AnalyticsSink for RecordingSink {
    fn log_event(&self, name: &str, params: &EventParams) -> anyhow::Result<()> {
        self.record(name, SinkCall::Event(name.to_owned(), params.clone()))
    }

    fn set_user_property(&self, name: &str, value: &str) -> anyhow::Result<()> {
        self.record(
            name,
            SinkCall::UserProperty(name.to_owned(), value.to_owned()),
        )
    }
}
