// src/types/mod.rs - Core message, permission and verdict types

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A chat message as delivered by the host pipeline.
///
/// Permission data is deliberately absent: the engine fetches a
/// per-message permission snapshot from the [`PermissionService`]
/// rather than trusting flags baked into the message.
///
/// [`PermissionService`]: crate::services::PermissionService
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub channel_id: String,
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Emote occurrences reported by the platform, as char offsets
    /// into `content`. Spans never overlap.
    #[serde(default)]
    pub emote_spans: Vec<EmoteSpan>,
}

/// One emote occurrence in the raw message text: the half-open char
/// range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmoteSpan {
    pub start: usize,
    pub end: usize,
}

impl EmoteSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn width(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// Capability levels a user can hold within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Viewer,
    Subscriber,
    Vip,
    Moderator,
    Broadcaster,
    TwitchStaff,
    TwitchAdmin,
}

impl PermissionLevel {
    pub const ALL: [PermissionLevel; 7] = [
        PermissionLevel::Viewer,
        PermissionLevel::Subscriber,
        PermissionLevel::Vip,
        PermissionLevel::Moderator,
        PermissionLevel::Broadcaster,
        PermissionLevel::TwitchStaff,
        PermissionLevel::TwitchAdmin,
    ];

    const fn bit(self) -> u8 {
        match self {
            PermissionLevel::Viewer => 1 << 0,
            PermissionLevel::Subscriber => 1 << 1,
            PermissionLevel::Vip => 1 << 2,
            PermissionLevel::Moderator => 1 << 3,
            PermissionLevel::Broadcaster => 1 << 4,
            PermissionLevel::TwitchStaff => 1 << 5,
            PermissionLevel::TwitchAdmin => 1 << 6,
        }
    }
}

/// Bitmask set of [`PermissionLevel`] capabilities.
///
/// Serializes as a list of level names so channel configuration files
/// stay readable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionLevelSet(u8);

impl PermissionLevelSet {
    pub const EMPTY: PermissionLevelSet = PermissionLevelSet(0);

    /// Levels that are always exempt from moderation, regardless of
    /// per-category configuration.
    pub const ALWAYS_EXEMPT: PermissionLevelSet = PermissionLevelSet(
        PermissionLevel::Broadcaster.bit() | PermissionLevel::Moderator.bit(),
    );

    pub fn of(levels: &[PermissionLevel]) -> Self {
        levels.iter().copied().collect()
    }

    pub fn insert(&mut self, level: PermissionLevel) {
        self.0 |= level.bit();
    }

    pub fn contains(self, level: PermissionLevel) -> bool {
        self.0 & level.bit() != 0
    }

    pub fn intersects(self, other: PermissionLevelSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(self, other: PermissionLevelSet) -> PermissionLevelSet {
        PermissionLevelSet(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = PermissionLevel> {
        PermissionLevel::ALL
            .iter()
            .copied()
            .filter(move |level| self.contains(*level))
    }
}

impl FromIterator<PermissionLevel> for PermissionLevelSet {
    fn from_iter<I: IntoIterator<Item = PermissionLevel>>(iter: I) -> Self {
        let mut set = PermissionLevelSet::EMPTY;
        for level in iter {
            set.insert(level);
        }
        set
    }
}

impl Serialize for PermissionLevelSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for PermissionLevelSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let levels = Vec::<PermissionLevel>::deserialize(deserializer)?;
        Ok(levels.into_iter().collect())
    }
}

/// The kind of punishment a verdict carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunishmentKind {
    None,
    Warning,
    Timeout,
}

impl PunishmentKind {
    /// Ordering used when aggregating verdicts from several detectors.
    pub fn severity(self) -> u8 {
        match self {
            PunishmentKind::None => 0,
            PunishmentKind::Warning => 1,
            PunishmentKind::Timeout => 2,
        }
    }
}

/// One configured punishment outcome: what to do, for how long, and
/// what to tell the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishmentTier {
    pub kind: PunishmentKind,
    #[serde(default)]
    pub duration_seconds: u64,
    #[serde(default)]
    pub reason_code: String,
    #[serde(default)]
    pub message_template: String,
}

impl PunishmentTier {
    pub fn default_warning() -> Self {
        Self {
            kind: PunishmentKind::Warning,
            duration_seconds: 0,
            reason_code: "warning".to_string(),
            message_template: "Please follow the chat rules (warning)".to_string(),
        }
    }

    pub fn default_timeout() -> Self {
        Self {
            kind: PunishmentKind::Timeout,
            duration_seconds: 600,
            reason_code: "timeout".to_string(),
            message_template: "Repeated rule violation".to_string(),
        }
    }
}

/// What a single detector (or the whole engine, after aggregation)
/// decided about one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationVerdict {
    pub kind: PunishmentKind,
    pub duration_seconds: u64,
    pub reason_code: String,
    pub message_template: String,
}

impl ModerationVerdict {
    /// The "no action" verdict.
    pub fn none() -> Self {
        Self {
            kind: PunishmentKind::None,
            duration_seconds: 0,
            reason_code: String::new(),
            message_template: String::new(),
        }
    }

    pub fn from_tier(tier: &PunishmentTier) -> Self {
        Self {
            kind: tier.kind,
            duration_seconds: tier.duration_seconds,
            reason_code: tier.reason_code.clone(),
            message_template: tier.message_template.clone(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == PunishmentKind::None
    }
}

/// Which text a blocklist entry is tested against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchScope {
    #[default]
    Message,
    Username,
    Both,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_set_membership() {
        let set = PermissionLevelSet::of(&[PermissionLevel::Vip, PermissionLevel::Subscriber]);
        assert!(set.contains(PermissionLevel::Vip));
        assert!(set.contains(PermissionLevel::Subscriber));
        assert!(!set.contains(PermissionLevel::Moderator));
    }

    #[test]
    fn permission_set_intersection() {
        let mods = PermissionLevelSet::of(&[PermissionLevel::Moderator]);
        assert!(mods.intersects(PermissionLevelSet::ALWAYS_EXEMPT));

        let viewers = PermissionLevelSet::of(&[PermissionLevel::Viewer]);
        assert!(!viewers.intersects(PermissionLevelSet::ALWAYS_EXEMPT));
    }

    #[test]
    fn permission_set_serializes_as_level_names() {
        let set = PermissionLevelSet::of(&[PermissionLevel::Vip, PermissionLevel::Broadcaster]);
        let yaml = serde_yaml::to_string(&set).unwrap();
        let back: PermissionLevelSet = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(set, back);
        assert!(yaml.contains("vip"));
        assert!(yaml.contains("broadcaster"));
    }

    #[test]
    fn verdict_severity_ordering() {
        assert!(PunishmentKind::Timeout.severity() > PunishmentKind::Warning.severity());
        assert!(PunishmentKind::Warning.severity() > PunishmentKind::None.severity());
    }

    #[test]
    fn emote_span_width() {
        assert_eq!(EmoteSpan::new(3, 8).width(), 5);
        assert_eq!(EmoteSpan::new(8, 3).width(), 0);
    }
}
