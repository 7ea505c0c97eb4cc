// src/config/mod.rs - Per-channel moderation configuration

use anyhow::{Context, Result};
use log::info;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::types::{MatchScope, PermissionLevelSet, PunishmentTier};

/// One threshold-based filter category: whether it runs, who it skips,
/// its thresholds, and the two punishment tiers the escalation step
/// chooses between.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de> + Default"))]
pub struct FilterRule<T = NoLimits> {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub excluded_levels: PermissionLevelSet,
    #[serde(default)]
    pub limits: T,
    #[serde(default = "PunishmentTier::default_warning")]
    pub warning: PunishmentTier,
    #[serde(default = "PunishmentTier::default_timeout")]
    pub timeout: PunishmentTier,
}

impl<T: Default> Default for FilterRule<T> {
    fn default() -> Self {
        Self {
            enabled: false,
            excluded_levels: PermissionLevelSet::EMPTY,
            limits: T::default(),
            warning: PunishmentTier::default_warning(),
            timeout: PunishmentTier::default_timeout(),
        }
    }
}

/// Marker for categories whose content test needs no thresholds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NoLimits {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapsLimits {
    /// Messages shorter than this (after emote stripping) are ignored.
    pub min_length: usize,
    /// Fire at this percentage of uppercase characters or above.
    pub max_percent: u8,
}

impl Default for CapsLimits {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_percent: 70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmoteLimits {
    pub max_count: usize,
    /// Also fire when the message is nothing but emotes.
    pub flag_emote_only: bool,
}

impl Default for EmoteLimits {
    fn default() -> Self {
        Self {
            max_count: 10,
            flag_emote_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LengthLimits {
    pub max_length: usize,
}

impl Default for LengthLimits {
    fn default() -> Self {
        Self { max_length: 300 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub max_messages: u64,
    /// Trailing window the message-rate lookup is asked about.
    pub reset_time_seconds: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            max_messages: 5,
            reset_time_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepetitionLimits {
    /// Messages shorter than this are ignored.
    pub min_length: usize,
    pub max_repeated_chars: usize,
    pub max_repeated_words: usize,
}

impl Default for RepetitionLimits {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_repeated_chars: 9,
            max_repeated_words: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolLimits {
    /// Fire at this percentage of symbol characters (over the RAW
    /// message length) or above.
    pub max_percent: u8,
    /// Fire when one symbol group repeats this many times or more.
    pub max_grouped: usize,
}

impl Default for SymbolLimits {
    fn default() -> Self {
        Self {
            max_percent: 50,
            max_grouped: 3,
        }
    }
}

/// The ordered blocklist. Unlike the threshold categories, each entry
/// carries its own punishment tier and the first matching entry wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlocklistRule {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub excluded_levels: PermissionLevelSet,
    #[serde(default)]
    pub entries: Vec<BlocklistEntry>,
}

/// A phrase or pattern the blocklist rejects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocklistEntry {
    pub pattern: String,
    /// When false the pattern is a literal phrase and is escaped to
    /// exact-substring matching; when true it is used as a regex as-is.
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default)]
    pub scope: MatchScope,
    pub tier: PunishmentTier,
}

/// Everything one channel configured about moderation. Absence of a
/// config for a channel means "all categories disabled", which is why
/// every category here defaults to disabled too.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelModerationConfig {
    /// Escalation window: a repeat violation within this many seconds
    /// of the last warning is promoted to the Timeout tier.
    pub warning_window_seconds: u64,
    pub blocklist: BlocklistRule,
    /// Case-insensitive literal link values exempt from the Links
    /// detector.
    pub link_allowlist: Vec<String>,
    pub caps: FilterRule<CapsLimits>,
    pub action: FilterRule,
    pub emotes: FilterRule<EmoteLimits>,
    pub fake_purge: FilterRule,
    pub links: FilterRule,
    pub long_message: FilterRule<LengthLimits>,
    pub one_man_spam: FilterRule<RateLimits>,
    pub repetition: FilterRule<RepetitionLimits>,
    pub symbols: FilterRule<SymbolLimits>,
    pub zalgo: FilterRule,
}

impl Default for ChannelModerationConfig {
    fn default() -> Self {
        Self {
            warning_window_seconds: 3600,
            blocklist: BlocklistRule::default(),
            link_allowlist: Vec::new(),
            caps: FilterRule::default(),
            action: FilterRule::default(),
            emotes: FilterRule::default(),
            fake_purge: FilterRule::default(),
            links: FilterRule::default(),
            long_message: FilterRule::default(),
            one_man_spam: FilterRule::default(),
            repetition: FilterRule::default(),
            symbols: FilterRule::default(),
            zalgo: FilterRule::default(),
        }
    }
}

impl ChannelModerationConfig {
    /// Validate and compile the config for message evaluation.
    ///
    /// Pattern compilation happens here, at configuration-write time;
    /// a malformed blocklist pattern is a config error and is never
    /// surfaced during message evaluation.
    pub fn compile(self) -> Result<CompiledModerationConfig> {
        let mut blocklist = Vec::with_capacity(self.blocklist.entries.len());
        for (index, entry) in self.blocklist.entries.iter().enumerate() {
            let source = if entry.is_regex {
                entry.pattern.clone()
            } else {
                regex::escape(&entry.pattern)
            };
            let matcher = RegexBuilder::new(&source)
                .case_insensitive(true)
                .build()
                .with_context(|| {
                    format!("blocklist entry {index}: invalid pattern '{}'", entry.pattern)
                })?;
            blocklist.push(CompiledBlocklistEntry {
                matcher,
                scope: entry.scope,
                tier: entry.tier.clone(),
            });
        }

        let link_allowlist = self
            .link_allowlist
            .iter()
            .map(|value| value.to_lowercase())
            .collect();

        Ok(CompiledModerationConfig {
            blocklist,
            link_allowlist,
            rules: self,
        })
    }
}

/// A channel config with its pattern matchers compiled, ready for the
/// per-message hot path.
#[derive(Debug)]
pub struct CompiledModerationConfig {
    pub rules: ChannelModerationConfig,
    blocklist: Vec<CompiledBlocklistEntry>,
    link_allowlist: HashSet<String>,
}

impl CompiledModerationConfig {
    /// Compiled blocklist entries, in configured order.
    pub fn blocklist(&self) -> &[CompiledBlocklistEntry] {
        &self.blocklist
    }

    /// Lowercased link allowlist.
    pub fn link_allowlist(&self) -> &HashSet<String> {
        &self.link_allowlist
    }
}

#[derive(Debug)]
pub struct CompiledBlocklistEntry {
    matcher: Regex,
    pub scope: MatchScope,
    pub tier: PunishmentTier,
}

impl CompiledBlocklistEntry {
    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }
}

/// Load and compile per-channel configs from a YAML file mapping
/// channel id to [`ChannelModerationConfig`].
pub async fn load_channel_configs(
    path: impl AsRef<Path>,
) -> Result<HashMap<String, Arc<CompiledModerationConfig>>> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading moderation config {}", path.display()))?;
    let parsed: HashMap<String, ChannelModerationConfig> = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing moderation config {}", path.display()))?;

    let mut configs = HashMap::with_capacity(parsed.len());
    for (channel_id, config) in parsed {
        let compiled = config
            .compile()
            .with_context(|| format!("channel '{channel_id}'"))?;
        configs.insert(channel_id, Arc::new(compiled));
    }

    info!(
        "loaded moderation config for {} channel(s) from {}",
        configs.len(),
        path.display()
    );
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PunishmentKind;

    fn entry(pattern: &str, is_regex: bool) -> BlocklistEntry {
        BlocklistEntry {
            pattern: pattern.to_string(),
            is_regex,
            scope: MatchScope::Message,
            tier: PunishmentTier::default_timeout(),
        }
    }

    #[test]
    fn default_config_has_everything_disabled() {
        let config = ChannelModerationConfig::default();
        assert!(!config.caps.enabled);
        assert!(!config.blocklist.enabled);
        assert!(!config.zalgo.enabled);
        assert_eq!(config.warning_window_seconds, 3600);
    }

    #[test]
    fn literal_entries_match_as_substrings() {
        let mut config = ChannelModerationConfig::default();
        config.blocklist.entries.push(entry("bad phrase", false));
        let compiled = config.compile().unwrap();
        assert!(compiled.blocklist()[0].is_match("what a BAD PHRASE that was"));
        assert!(!compiled.blocklist()[0].is_match("bad words only"));
    }

    #[test]
    fn literal_entries_do_not_gain_regex_meaning() {
        let mut config = ChannelModerationConfig::default();
        config.blocklist.entries.push(entry("1+1", false));
        let compiled = config.compile().unwrap();
        assert!(compiled.blocklist()[0].is_match("answer 1+1 please"));
        assert!(!compiled.blocklist()[0].is_match("answer 11 please"));
    }

    #[test]
    fn regex_entries_are_used_as_is() {
        let mut config = ChannelModerationConfig::default();
        config.blocklist.entries.push(entry(r"fr[e3]{2}\s+gems", true));
        let compiled = config.compile().unwrap();
        assert!(compiled.blocklist()[0].is_match("FR33  GEMS here"));
    }

    #[test]
    fn malformed_regex_is_rejected_at_compile_with_entry_index() {
        let mut config = ChannelModerationConfig::default();
        config.blocklist.entries.push(entry("fine", false));
        config.blocklist.entries.push(entry("broken(", true));
        let err = config.compile().unwrap_err();
        assert!(format!("{err:#}").contains("blocklist entry 1"));
    }

    #[test]
    fn allowlist_is_lowercased_at_compile() {
        let config = ChannelModerationConfig {
            link_allowlist: vec!["Google.COM".to_string()],
            ..Default::default()
        };
        let compiled = config.compile().unwrap();
        assert!(compiled.link_allowlist().contains("google.com"));
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let yaml = r#"
caps:
  enabled: true
  limits:
    max_percent: 80
"#;
        let config: ChannelModerationConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.caps.enabled);
        assert_eq!(config.caps.limits.max_percent, 80);
        assert_eq!(config.caps.limits.min_length, 10);
        assert!(!config.links.enabled);
        assert_eq!(config.caps.warning.kind, PunishmentKind::Warning);
        assert_eq!(config.caps.timeout.kind, PunishmentKind::Timeout);
    }

    #[test]
    fn config_round_trips_through_json() {
        let mut config = ChannelModerationConfig::default();
        config.symbols.enabled = true;
        config.blocklist.entries.push(entry("spam", false));
        let json = serde_json::to_string(&config).unwrap();
        let back: ChannelModerationConfig = serde_json::from_str(&json).unwrap();
        assert!(back.symbols.enabled);
        assert_eq!(back.blocklist.entries.len(), 1);
    }

    #[tokio::test]
    async fn loads_and_compiles_channel_file() {
        use std::io::Write;

        let yaml = r#"
some_channel:
  warning_window_seconds: 60
  links:
    enabled: true
  link_allowlist:
    - google.com
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let configs = load_channel_configs(file.path()).await.unwrap();
        let channel = configs.get("some_channel").unwrap();
        assert!(channel.rules.links.enabled);
        assert_eq!(channel.rules.warning_window_seconds, 60);
        assert!(channel.link_allowlist().contains("google.com"));
    }

    #[tokio::test]
    async fn load_rejects_file_with_bad_pattern() {
        use std::io::Write;

        let yaml = r#"
chan:
  blocklist:
    enabled: true
    entries:
      - pattern: "broken("
        is_regex: true
        tier:
          kind: timeout
          duration_seconds: 60
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let err = load_channel_configs(file.path()).await.unwrap_err();
        assert!(format!("{err:#}").contains("chan"));
    }
}
