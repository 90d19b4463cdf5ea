//! # Actor Options
//!
//! Per-actor knobs that are independent of the wrapped resource's own configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for a single [`AffinityActor`](crate::AffinityActor).
///
/// ```rust
/// use affinity_actor::ActorOptions;
/// use std::time::Duration;
///
/// let options = ActorOptions::default()
///     .invoke_timeout(Duration::from_secs(5))
///     .thread_name("db-main");
/// assert_eq!(options.invoke_timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorOptions {
    /// How long a blocking `invoke` waits before giving up with `TimedOut`.
    /// `None` waits indefinitely.
    pub invoke_timeout: Option<Duration>,
    /// Name of the worker thread. Defaults to `affinity-<identity>`.
    pub thread_name: Option<String>,
}

impl ActorOptions {
    pub fn invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = Some(timeout);
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    pub(crate) fn worker_name(&self, identity: &dyn std::fmt::Display) -> String {
        match &self.thread_name {
            Some(name) => name.clone(),
            None => format!("affinity-{identity}"),
        }
    }
}
