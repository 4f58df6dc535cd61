//! User-facing side effects of failed requests.
//!
//! The client never talks to a UI directly. Failures that should be shown to
//! the user go through a [`Notifier`]; the forced re-authentication after a
//! session expiry goes through a [`Navigator`]. Both default to
//! implementations that only emit `tracing` events.

use std::fmt;
use tracing::{info, warn};

/// Receives user-visible error messages.
pub trait Notifier: Send + Sync + fmt::Debug {
    fn error(&self, message: &str);
}

/// Performs client-side navigation.
pub trait Navigator: Send + Sync + fmt::Debug {
    fn navigate(&self, path: &str);
}

/// Logs notifications at `warn` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn error(&self, message: &str) {
        warn!(target: "marketplace_client::notify", "{}", message);
    }
}

/// Logs navigation requests at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, path: &str) {
        info!(target: "marketplace_client::notify", "Navigating to {}", path);
    }
}
