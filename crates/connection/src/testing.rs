//! Scripted connector for deterministic tests without a sidecar.
//!
//! Every `open` creates a new session whose event channel the test drives
//! through [`ScriptedConnector::emit`]. Calls made on each link (`logout`,
//! `end`) are recorded per session.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::link::{Connector, Link, LinkError, LinkEvent, LinkFuture, OpenedLink};

type CallLog = Arc<Mutex<Vec<String>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Session {
    events: Option<mpsc::Sender<LinkEvent>>,
    calls: CallLog,
}

#[derive(Default)]
struct Script {
    sessions: Vec<Session>,
    open_failures: VecDeque<String>,
    logout_failure: Option<String>,
    attempts: usize,
    last_creds: Option<Value>,
}

/// A [`Connector`] whose links are driven by the test.
#[derive(Default)]
pub struct ScriptedConnector {
    script: Mutex<Script>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `open` fail with [`LinkError::Refused`].
    pub fn fail_next_open(&self, message: impl Into<String>) {
        lock(&self.script).open_failures.push_back(message.into());
    }

    /// Makes `logout` fail on links opened from now on.
    pub fn fail_logout(&self, message: impl Into<String>) {
        lock(&self.script).logout_failure = Some(message.into());
    }

    /// Number of links successfully opened.
    pub fn open_count(&self) -> usize {
        lock(&self.script).sessions.len()
    }

    /// Number of `open` calls, failed ones included.
    pub fn attempts(&self) -> usize {
        lock(&self.script).attempts
    }

    /// Credentials passed to the most recent `open`.
    pub fn last_creds(&self) -> Option<Value> {
        lock(&self.script).last_creds.clone()
    }

    /// Calls recorded on the link opened at `index`.
    pub fn calls(&self, index: usize) -> Vec<String> {
        lock(&self.script)
            .sessions
            .get(index)
            .map(|s| lock(&s.calls).clone())
            .unwrap_or_default()
    }

    /// Sends an event on the most recently opened link.
    pub async fn emit(&self, event: LinkEvent) -> bool {
        let index = self.open_count().saturating_sub(1);
        self.emit_to(index, event).await
    }

    /// Sends an event on the link opened at `index`.
    pub async fn emit_to(&self, index: usize, event: LinkEvent) -> bool {
        let tx = lock(&self.script)
            .sessions
            .get(index)
            .and_then(|s| s.events.clone());
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Drops the event sender of the link at `index`, ending its stream.
    pub fn close_stream(&self, index: usize) {
        if let Some(session) = lock(&self.script).sessions.get_mut(index) {
            session.events = None;
        }
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, creds: Option<Value>) -> LinkFuture<'_, Result<OpenedLink, LinkError>> {
        Box::pin(async move {
            let mut script = lock(&self.script);
            script.attempts += 1;
            script.last_creds = creds;
            if let Some(message) = script.open_failures.pop_front() {
                return Err(LinkError::Refused(message));
            }

            let (tx, rx) = mpsc::channel(32);
            let calls = CallLog::default();
            script.sessions.push(Session {
                events: Some(tx),
                calls: Arc::clone(&calls),
            });
            let link = ScriptedLink {
                calls,
                logout_failure: script.logout_failure.clone(),
            };
            Ok(OpenedLink {
                link: Box::new(link),
                events: rx,
            })
        })
    }
}

/// Link handed out by [`ScriptedConnector`].
pub struct ScriptedLink {
    calls: CallLog,
    logout_failure: Option<String>,
}

impl Link for ScriptedLink {
    fn logout(&self) -> LinkFuture<'_, Result<(), LinkError>> {
        Box::pin(async move {
            lock(&self.calls).push("logout".into());
            match &self.logout_failure {
                Some(message) => Err(LinkError::LogoutRejected(message.clone())),
                None => Ok(()),
            }
        })
    }

    fn end(&self, reason: &str) {
        lock(&self.calls).push(format!("end:{reason}"));
    }
}
