// src/services/mod.rs - External collaborators the engine consumes
//
// The engine only ever talks to these traits. Lookup failures are
// handled at the engine's call sites (fail open), so implementations
// are free to return errors.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::{ChannelModerationConfig, CompiledModerationConfig};
use crate::types::PermissionLevelSet;

/// Source of per-channel moderation configuration.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// `Ok(None)` means the channel was never configured; the engine
    /// treats that as "all categories disabled", not an error.
    async fn moderation_config(
        &self,
        channel_id: &str,
    ) -> Result<Option<Arc<CompiledModerationConfig>>>;
}

/// Source of a user's capability snapshot within a channel.
#[async_trait]
pub trait PermissionService: Send + Sync {
    async fn permissions(&self, channel_id: &str, user_id: &str) -> Result<PermissionLevelSet>;
}

/// Rolling count of recent messages, consumed by the one-man-spam
/// detector.
#[async_trait]
pub trait MessageRateLookup: Send + Sync {
    async fn count_messages_since(
        &self,
        channel_id: &str,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64>;
}

/// Config store holding compiled channel configs in memory. Writes go
/// through [`ChannelModerationConfig::compile`], so malformed patterns
/// are rejected here and never reach message evaluation.
#[derive(Default)]
pub struct InMemoryConfigStore {
    configs: RwLock<HashMap<String, Arc<CompiledModerationConfig>>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, compile and store a channel's config.
    pub async fn set(&self, channel_id: &str, config: ChannelModerationConfig) -> Result<()> {
        let compiled = Arc::new(config.compile()?);
        self.configs
            .write()
            .await
            .insert(channel_id.to_string(), compiled);
        Ok(())
    }

    pub async fn remove(&self, channel_id: &str) -> bool {
        self.configs.write().await.remove(channel_id).is_some()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn moderation_config(
        &self,
        channel_id: &str,
    ) -> Result<Option<Arc<CompiledModerationConfig>>> {
        Ok(self.configs.read().await.get(channel_id).cloned())
    }
}

/// Permission service over an in-memory grant table. Users without a
/// grant fall back to the empty (viewer-only) set.
#[derive(Default)]
pub struct StaticPermissions {
    grants: RwLock<HashMap<(String, String), PermissionLevelSet>>,
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, channel_id: &str, user_id: &str, levels: PermissionLevelSet) {
        self.grants
            .write()
            .await
            .insert((channel_id.to_string(), user_id.to_string()), levels);
    }
}

#[async_trait]
impl PermissionService for StaticPermissions {
    async fn permissions(&self, channel_id: &str, user_id: &str) -> Result<PermissionLevelSet> {
        Ok(self
            .grants
            .read()
            .await
            .get(&(channel_id.to_string(), user_id.to_string()))
            .copied()
            .unwrap_or(PermissionLevelSet::EMPTY))
    }
}

/// Short-lived rolling cache of recent messages per channel, pruned on
/// every write so it never grows past the retention horizon.
pub struct RollingMessageLog {
    retention: Duration,
    messages: RwLock<HashMap<String, Vec<(String, DateTime<Utc>)>>>,
}

impl RollingMessageLog {
    pub fn new() -> Self {
        Self::with_retention_seconds(3600)
    }

    /// Retention must cover the largest `reset_time_seconds` any
    /// channel configures.
    pub fn with_retention_seconds(seconds: u64) -> Self {
        Self {
            retention: Duration::seconds(seconds as i64),
            messages: RwLock::new(HashMap::new()),
        }
    }

    pub async fn record(&self, channel_id: &str, user_id: &str, at: DateTime<Utc>) {
        let mut messages = self.messages.write().await;
        let channel = messages.entry(channel_id.to_string()).or_default();
        channel.push((user_id.to_string(), at));

        let horizon = at - self.retention;
        channel.retain(|(_, ts)| *ts > horizon);
    }
}

impl Default for RollingMessageLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageRateLookup for RollingMessageLog {
    async fn count_messages_since(
        &self,
        channel_id: &str,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let messages = self.messages.read().await;
        let count = messages
            .get(channel_id)
            .map(|channel| {
                channel
                    .iter()
                    .filter(|(user, ts)| user == user_id && *ts >= since)
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn config_store_returns_none_for_unknown_channel() {
        let store = InMemoryConfigStore::new();
        assert!(store.moderation_config("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn config_store_compiles_on_write() {
        use crate::types::{MatchScope, PunishmentTier};

        let store = InMemoryConfigStore::new();
        let mut config = ChannelModerationConfig::default();
        config.blocklist.entries.push(crate::config::BlocklistEntry {
            pattern: "broken(".to_string(),
            is_regex: true,
            scope: MatchScope::Message,
            tier: PunishmentTier::default_timeout(),
        });
        assert!(store.set("chan", config).await.is_err());
        assert!(store.moderation_config("chan").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ungranted_user_has_empty_permissions() {
        let perms = StaticPermissions::new();
        let set = perms.permissions("chan", "user").await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn message_log_counts_only_matching_user_and_window() {
        let log = RollingMessageLog::new();
        log.record("chan", "alice", at(10)).await;
        log.record("chan", "alice", at(20)).await;
        log.record("chan", "bob", at(20)).await;
        log.record("other", "alice", at(20)).await;

        assert_eq!(
            log.count_messages_since("chan", "alice", at(15)).await.unwrap(),
            1
        );
        assert_eq!(
            log.count_messages_since("chan", "alice", at(0)).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn message_log_prunes_past_retention() {
        let log = RollingMessageLog::with_retention_seconds(60);
        log.record("chan", "alice", at(0)).await;
        log.record("chan", "alice", at(1000)).await;

        // The t=0 entry fell out of the retention horizon on the
        // second write.
        assert_eq!(
            log.count_messages_since("chan", "alice", at(0)).await.unwrap(),
            1
        );
    }
}
