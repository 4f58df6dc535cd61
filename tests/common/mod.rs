//! Common test utilities shared across all integration test files.
//!
//! Usage in test files:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

use marketplace_client::{ApiClient, MemoryStore, Navigator, Notifier, SessionState};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use wiremock::MockServer;

/// Records every user-visible message.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn error(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}

/// Records every navigation request.
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    paths: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    #[allow(dead_code)]
    pub fn paths(&self) -> Vec<String> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());
    }
}

/// A client wired to a mock server with recording hooks.
#[allow(dead_code)]
pub struct Harness {
    pub server: MockServer,
    pub client: ApiClient,
    pub session: SessionState,
    pub notifier: RecordingNotifier,
    pub navigator: RecordingNavigator,
}

impl Harness {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let session = SessionState::new(MemoryStore::default());
        let notifier = RecordingNotifier::default();
        let navigator = RecordingNavigator::default();
        let client = ApiClient::builder()
            .base_url(server.uri())
            .session(session.clone())
            .notifier(notifier.clone())
            .navigator(navigator.clone())
            .build()
            .expect("client builds");

        Self {
            server,
            client,
            session,
            notifier,
            navigator,
        }
    }

    /// Same as [`start`](Self::start) with an existing session token.
    #[allow(dead_code)]
    pub async fn logged_in(token: &str) -> Self {
        let harness = Self::start().await;
        harness.session.set_token(token);
        harness
    }
}

/// Builds an NDJSON body from JSON values, one per line.
#[allow(dead_code)]
pub fn ndjson(lines: &[serde_json::Value]) -> String {
    lines
        .iter()
        .map(|line| format!("{line}\n"))
        .collect::<String>()
}

/// Default timeout for tests that wait on the mock server.
#[allow(dead_code)]
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Wraps a future with a timeout, panicking if the timeout is exceeded.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .unwrap_or_else(|_| panic!("Test timed out after {:?}", duration))
}
