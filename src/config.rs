use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default lease on the run lock.
pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(5 * 60);

/// Settings for an [`Engine`](crate::engine::Engine) run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long the run lock stays valid if the run never releases it.
    pub lock_lease: Duration,
    /// Per-statement limit; `None` lets statements run indefinitely.
    pub operation_timeout: Option<Duration>,
    /// Skip operations whose change is already present in the live schema.
    pub guard_operations: bool,
    /// Identity written to the lock table.
    pub owner: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_lease: DEFAULT_LOCK_LEASE,
            operation_timeout: None,
            guard_operations: true,
            owner: default_owner(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    pub fn operation_timeout(mut self, limit: Duration) -> Self {
        self.operation_timeout = Some(limit);
        self
    }

    pub fn guard_operations(mut self, enabled: bool) -> Self {
        self.guard_operations = enabled;
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }
}

fn default_owner() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("tidemark-{}-{}", std::process::id(), nanos)
}
