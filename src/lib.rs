//! # Chat Moderation Rule Engine
//!
//! A per-message moderation engine for streaming chat, designed to be
//! embedded in a host pipeline: the host delivers messages and applies
//! punishments, this crate decides what the punishment should be.
//!
//! ## Features
//!
//! - **Eleven Content Detectors**: blocklist, excessive capitals,
//!   action messages, emote flooding, fake purge notices, links with
//!   an allowlist, long messages, single-user flooding, repetition,
//!   symbol flooding, and disruptive/zalgo glyphs
//! - **Windowed Escalation**: first violation warns, a repeat inside
//!   the configured window times out
//! - **Per-Channel Configuration**: every category independently
//!   enabled, thresholded and permission-gated, loadable from YAML
//! - **Fail-Open Lookups**: a broken config store, permission service
//!   or rate lookup never stalls message processing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatwarden::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Configure a channel: flag shouting, allow one link domain.
//!     let mut config = ChannelModerationConfig::default();
//!     config.caps.enabled = true;
//!     config.links.enabled = true;
//!     config.link_allowlist = vec!["clips.twitch.tv".to_string()];
//!
//!     let store = Arc::new(InMemoryConfigStore::new());
//!     store.set("my_channel", config).await?;
//!
//!     let engine = ModerationEngine::new(
//!         store,
//!         Arc::new(StaticPermissions::new()),
//!         Arc::new(RollingMessageLog::new()),
//!     );
//!
//!     let message = ChatMessage {
//!         channel_id: "my_channel".to_string(),
//!         user_id: "12345".to_string(),
//!         username: "chatter".to_string(),
//!         content: "HELLO EVERYONE HOW ARE YOU".to_string(),
//!         timestamp: chrono::Utc::now(),
//!         emote_spans: vec![],
//!     };
//!
//!     let verdict = engine.evaluate(&message).await;
//!     println!("{:?} for {}s", verdict.kind, verdict.duration_seconds);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod services;
pub mod types;

// Re-export commonly used items
pub mod prelude {
    pub use crate::config::{
        BlocklistEntry, BlocklistRule, ChannelModerationConfig, CompiledModerationConfig,
        FilterRule,
    };
    pub use crate::engine::escalation::{Clock, EscalationTracker, SystemClock};
    pub use crate::engine::normalizer::strip_emotes;
    pub use crate::engine::ModerationEngine;
    pub use crate::services::{
        ConfigStore, InMemoryConfigStore, MessageRateLookup, PermissionService,
        RollingMessageLog, StaticPermissions,
    };
    pub use crate::types::{
        ChatMessage, EmoteSpan, MatchScope, ModerationVerdict, PermissionLevel,
        PermissionLevelSet, PunishmentKind, PunishmentTier,
    };
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
