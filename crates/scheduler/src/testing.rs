//! Test doubles shared by the pipeline and runner tests

use crate::Pipeline;
use alerting::OutageStateMachine;
use analysis::{AnalysisConfig, Analyzer, ReasoningError, ReasoningService};
use async_trait::async_trait;
use evidence::{EvidenceError, EvidenceProvider, RawText};
use investigation::{InvestigationConfig, Investigator};
use notifier::{DispatchError, Dispatcher, DispatcherConfig, MessageSink, PresenceBoard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use storage::{InMemoryTargetStore, NotificationTarget, StorageError, TargetStore};

/// Reply that makes the scripted reasoner panic
pub(crate) const PANIC_REPLY: &str = "<panic>";

pub(crate) fn reply(severity: &str, confidence: f64) -> String {
    format!(
        r#"{{"severity":"{}","confidence":{},"notify":true,"summary":"{} reading"}}"#,
        severity, confidence, severity
    )
}

/// Provider reporting a healthy service, counting every call
#[derive(Default)]
pub(crate) struct CountingProvider {
    calls: AtomicUsize,
}

impl CountingProvider {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvidenceProvider for CountingProvider {
    async fn fetch_official_status(&self) -> Result<Option<RawText>, EvidenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(RawText::new("Official status: none - All Systems Operational")))
    }

    async fn search_social(&self, _query: &str) -> Result<Vec<RawText>, EvidenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![RawText::new("@someone (1m ago): playing tonight")])
    }

    async fn search_web(&self, _query: &str) -> Result<Vec<RawText>, EvidenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn fetch_page(&self, _url: &str) -> Result<Option<RawText>, EvidenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

/// Reasoner that replays a fixed list of replies
#[derive(Default)]
pub(crate) struct ScriptedReasoner {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedReasoner {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    async fn classify(&self, _payload: &str) -> Result<String, ReasoningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) if reply == PANIC_REPLY => panic!("reasoner exploded"),
            Some(reply) => Ok(reply),
            None => Err(ReasoningError::Unavailable("script exhausted".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Sent {
    pub channel_id: u64,
    pub body: String,
    pub roles: Vec<u64>,
    pub users: Vec<u64>,
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingSink {
    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, channel_id: u64, body: &str, roles: &[u64], users: &[u64]) -> Result<(), DispatchError> {
        self.sent.lock().unwrap().push(Sent {
            channel_id,
            body: body.to_string(),
            roles: roles.to_vec(),
            users: users.to_vec(),
        });
        Ok(())
    }
}

/// In-memory store that can be told to fail once
#[derive(Default)]
pub(crate) struct FlakyStore {
    inner: InMemoryTargetStore,
    fail_next: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub(crate) fn remove(&self, channel_id: u64) {
        self.inner.remove(channel_id).unwrap();
    }
}

#[async_trait]
impl TargetStore for FlakyStore {
    async fn list_targets(&self) -> Result<Vec<NotificationTarget>, StorageError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Io("disk unplugged".to_string()));
        }
        self.inner.list_targets().await
    }
}

pub(crate) struct Fixture {
    pub pipeline: Arc<Pipeline>,
    pub provider: Arc<CountingProvider>,
    pub reasoner: Arc<ScriptedReasoner>,
    pub sink: Arc<RecordingSink>,
    pub presence: Arc<PresenceBoard>,
    pub store: Arc<FlakyStore>,
}

pub(crate) fn default_targets() -> Vec<NotificationTarget> {
    vec![
        NotificationTarget::channel(1).with_guild(100).with_role(10).with_user(20),
        NotificationTarget::channel(2),
    ]
}

pub(crate) fn fixture(replies: Vec<String>) -> Fixture {
    fixture_with_targets(replies, default_targets())
}

pub(crate) fn fixture_with_targets(replies: Vec<String>, targets: Vec<NotificationTarget>) -> Fixture {
    let provider = Arc::new(CountingProvider::default());
    let reasoner = Arc::new(ScriptedReasoner {
        replies: Mutex::new(replies.into()),
        ..Default::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let presence = Arc::new(PresenceBoard::new());
    let store = Arc::new(FlakyStore {
        inner: InMemoryTargetStore::new(targets),
        ..Default::default()
    });

    let pipeline = Pipeline::new(
        Investigator::new(provider.clone(), InvestigationConfig::default()),
        Analyzer::new(reasoner.clone(), AnalysisConfig::default()),
        OutageStateMachine::default(),
        Dispatcher::new(sink.clone(), presence.clone(), DispatcherConfig::default()),
        store.clone(),
        "VRChat",
    );

    Fixture {
        pipeline: Arc::new(pipeline),
        provider,
        reasoner,
        sink,
        presence,
        store,
    }
}
