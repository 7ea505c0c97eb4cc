//! Warning-window escalation: decides whether a fresh violation earns
//! a Warning or an immediate Timeout, based on when the user was last
//! warned in that channel.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Injectable wall clock so window-expiry behavior is deterministic
/// under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Per (channel, user) record of the last warning-tier verdict.
///
/// Entries are created lazily on the first fired violation and never
/// deleted; stale entries simply fall outside the window check. The
/// timestamp only ever advances. The check/record pair is split in two
/// calls by design: two near-simultaneous violations may both read
/// "no recent warning" and both warn, which is an accepted race. A
/// race losing a timeout is not possible because `record_warning`
/// takes the write lock and keeps the newest timestamp.
#[derive(Debug, Default)]
pub struct EscalationTracker {
    warnings: RwLock<HashMap<(String, String), DateTime<Utc>>>,
}

impl EscalationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the user was already warned within `window_seconds`,
    /// i.e. the current violation should be promoted to the Timeout
    /// tier.
    pub async fn should_escalate(
        &self,
        channel_id: &str,
        user_id: &str,
        window_seconds: u64,
        now: DateTime<Utc>,
    ) -> bool {
        let warnings = self.warnings.read().await;
        match warnings.get(&(channel_id.to_string(), user_id.to_string())) {
            Some(last) => now <= *last + Duration::seconds(window_seconds as i64),
            None => false,
        }
    }

    /// Record that a warning-tier verdict was just issued. Called only
    /// when a detector actually fires the warning tier, never on every
    /// message.
    pub async fn record_warning(&self, channel_id: &str, user_id: &str, now: DateTime<Utc>) {
        let mut warnings = self.warnings.write().await;
        let entry = warnings
            .entry((channel_id.to_string(), user_id.to_string()))
            .or_insert(now);
        if now > *entry {
            *entry = now;
        }
        debug!("recorded warning for {}:{} at {}", channel_id, user_id, now);
    }

    /// Number of (channel, user) pairs with a recorded warning.
    pub async fn tracked_users(&self) -> usize {
        self.warnings.read().await.len()
    }
}
