//! The eleven content detectors. Each one implements [`Detector`] and
//! is evaluated independently by the dispatcher in `engine::mod`; the
//! shared gate (enabled flag, permission exclusions, escalation) lives
//! there, so a detector only answers "does this message violate my
//! category".

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use log::debug;
use unicode_normalization::UnicodeNormalization;

use crate::config::{CompiledModerationConfig, FilterRule};
use crate::engine::links;
use crate::engine::normalizer::strip_emotes;
use crate::engine::DetectorServices;
use crate::types::{ChatMessage, MatchScope, ModerationVerdict, PermissionLevelSet, PunishmentTier};

/// Per-category gate data the dispatcher checks before running the
/// content test.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    pub enabled: bool,
    pub excluded_levels: PermissionLevelSet,
}

/// Outcome of a detector's content test.
#[derive(Debug)]
pub enum Detection {
    Clean,
    /// The category fired; the escalation tracker picks between the
    /// two tiers.
    Violation {
        warning: PunishmentTier,
        timeout: PunishmentTier,
    },
    /// The match supplies its own verdict, bypassing escalation
    /// (blocklist entries carry an explicit tier).
    Direct(ModerationVerdict),
}

#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn gate(&self, config: &CompiledModerationConfig) -> Gate;

    async fn scan(
        &self,
        message: &ChatMessage,
        config: &CompiledModerationConfig,
        services: &DetectorServices,
    ) -> Result<Detection>;
}

/// The full detector set in dispatch order. Blocklist runs first so an
/// explicit ban phrase is never shadowed by a milder category.
pub fn default_detectors() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(BlocklistDetector),
        Box::new(CapsDetector),
        Box::new(ActionDetector),
        Box::new(EmoteFloodDetector),
        Box::new(FakePurgeDetector),
        Box::new(LinkDetector),
        Box::new(LongMessageDetector),
        Box::new(OneManSpamDetector),
        Box::new(RepetitionDetector),
        Box::new(SymbolFloodDetector),
        Box::new(ZalgoDetector),
    ]
}

fn gate_of<T>(rule: &FilterRule<T>) -> Gate {
    Gate {
        enabled: rule.enabled,
        excluded_levels: rule.excluded_levels,
    }
}

fn violation<T>(rule: &FilterRule<T>) -> Detection {
    Detection::Violation {
        warning: rule.warning.clone(),
        timeout: rule.timeout.clone(),
    }
}

/// Ordered phrase/pattern scan; the first matching entry wins and the
/// rest are never consulted.
pub struct BlocklistDetector;

#[async_trait]
impl Detector for BlocklistDetector {
    fn name(&self) -> &'static str {
        "blocklist"
    }

    fn gate(&self, config: &CompiledModerationConfig) -> Gate {
        Gate {
            enabled: config.rules.blocklist.enabled,
            excluded_levels: config.rules.blocklist.excluded_levels,
        }
    }

    async fn scan(
        &self,
        message: &ChatMessage,
        config: &CompiledModerationConfig,
        _services: &DetectorServices,
    ) -> Result<Detection> {
        for entry in config.blocklist() {
            let matched = match entry.scope {
                MatchScope::Message => entry.is_match(&message.content),
                MatchScope::Username => entry.is_match(&message.username),
                MatchScope::Both => {
                    entry.is_match(&format!("{} {}", message.username, message.content))
                }
            };
            if matched {
                debug!(
                    "blocklist entry matched message from {} in {}",
                    message.username, message.channel_id
                );
                return Ok(Detection::Direct(ModerationVerdict::from_tier(&entry.tier)));
            }
        }
        Ok(Detection::Clean)
    }
}

/// Uppercase ratio over the emote-stripped text.
pub struct CapsDetector;

#[async_trait]
impl Detector for CapsDetector {
    fn name(&self) -> &'static str {
        "caps"
    }

    fn gate(&self, config: &CompiledModerationConfig) -> Gate {
        gate_of(&config.rules.caps)
    }

    async fn scan(
        &self,
        message: &ChatMessage,
        config: &CompiledModerationConfig,
        _services: &DetectorServices,
    ) -> Result<Detection> {
        let rule = &config.rules.caps;
        let plain = strip_emotes(&message.content, &message.emote_spans);
        let len = plain.chars().count();
        if len < rule.limits.min_length {
            return Ok(Detection::Clean);
        }

        let upper = plain.chars().filter(|c| c.is_uppercase()).count();
        // ratio >= max_percent, compared without integer-division loss
        if upper * 100 >= rule.limits.max_percent as usize * len {
            return Ok(violation(rule));
        }
        Ok(Detection::Clean)
    }
}

/// Messages sent with the platform's "action" command (`/me`).
pub struct ActionDetector;

const ACTION_PREFIX: &[u8] = b"/me";

#[async_trait]
impl Detector for ActionDetector {
    fn name(&self) -> &'static str {
        "action"
    }

    fn gate(&self, config: &CompiledModerationConfig) -> Gate {
        gate_of(&config.rules.action)
    }

    async fn scan(
        &self,
        message: &ChatMessage,
        config: &CompiledModerationConfig,
        _services: &DetectorServices,
    ) -> Result<Detection> {
        let bytes = message.content.as_bytes();
        let is_action = bytes.len() >= ACTION_PREFIX.len()
            && bytes[..ACTION_PREFIX.len()].eq_ignore_ascii_case(ACTION_PREFIX)
            && bytes.get(ACTION_PREFIX.len()).map_or(true, |b| *b == b' ');
        if is_action {
            return Ok(violation(&config.rules.action));
        }
        Ok(Detection::Clean)
    }
}

/// Too many emotes, or (optionally) nothing but emotes.
pub struct EmoteFloodDetector;

#[async_trait]
impl Detector for EmoteFloodDetector {
    fn name(&self) -> &'static str {
        "emote_flood"
    }

    fn gate(&self, config: &CompiledModerationConfig) -> Gate {
        gate_of(&config.rules.emotes)
    }

    async fn scan(
        &self,
        message: &ChatMessage,
        config: &CompiledModerationConfig,
        _services: &DetectorServices,
    ) -> Result<Detection> {
        let rule = &config.rules.emotes;
        if message.emote_spans.len() >= rule.limits.max_count {
            return Ok(violation(rule));
        }

        if rule.limits.flag_emote_only && !message.emote_spans.is_empty() {
            let plain = strip_emotes(&message.content, &message.emote_spans);
            if plain.trim().is_empty() {
                return Ok(violation(rule));
            }
        }
        Ok(Detection::Clean)
    }
}

/// Messages impersonating the client's "message deleted" notice.
pub struct FakePurgeDetector;

const FAKE_PURGE_PHRASES: &[&str] = &[
    "<message deleted>",
    "<deleted message>",
    "message deleted by a moderator",
    "message deleted by moderator",
];

#[async_trait]
impl Detector for FakePurgeDetector {
    fn name(&self) -> &'static str {
        "fake_purge"
    }

    fn gate(&self, config: &CompiledModerationConfig) -> Gate {
        gate_of(&config.rules.fake_purge)
    }

    async fn scan(
        &self,
        message: &ChatMessage,
        config: &CompiledModerationConfig,
        _services: &DetectorServices,
    ) -> Result<Detection> {
        let content = message.content.trim();
        if FAKE_PURGE_PHRASES
            .iter()
            .any(|phrase| content.eq_ignore_ascii_case(phrase))
        {
            return Ok(violation(&config.rules.fake_purge));
        }
        Ok(Detection::Clean)
    }
}

/// URL-like substrings not covered by the channel allowlist.
pub struct LinkDetector;

#[async_trait]
impl Detector for LinkDetector {
    fn name(&self) -> &'static str {
        "links"
    }

    fn gate(&self, config: &CompiledModerationConfig) -> Gate {
        gate_of(&config.rules.links)
    }

    async fn scan(
        &self,
        message: &ChatMessage,
        config: &CompiledModerationConfig,
        _services: &DetectorServices,
    ) -> Result<Detection> {
        let candidates = links::find_link_candidates(&message.content);
        if candidates.is_empty() {
            return Ok(Detection::Clean);
        }

        let uncovered = links::uncovered_candidates(&candidates, config.link_allowlist());
        if uncovered.is_empty() {
            return Ok(Detection::Clean);
        }
        debug!(
            "uncovered link(s) {:?} from {} in {}",
            uncovered, message.username, message.channel_id
        );
        Ok(violation(&config.rules.links))
    }
}

/// Raw message length cap.
pub struct LongMessageDetector;

#[async_trait]
impl Detector for LongMessageDetector {
    fn name(&self) -> &'static str {
        "long_message"
    }

    fn gate(&self, config: &CompiledModerationConfig) -> Gate {
        gate_of(&config.rules.long_message)
    }

    async fn scan(
        &self,
        message: &ChatMessage,
        config: &CompiledModerationConfig,
        _services: &DetectorServices,
    ) -> Result<Detection> {
        let rule = &config.rules.long_message;
        if message.content.chars().count() > rule.limits.max_length {
            return Ok(violation(rule));
        }
        Ok(Detection::Clean)
    }
}

/// Single user flooding the channel: message count over the trailing
/// window, via the external rate lookup.
pub struct OneManSpamDetector;

#[async_trait]
impl Detector for OneManSpamDetector {
    fn name(&self) -> &'static str {
        "one_man_spam"
    }

    fn gate(&self, config: &CompiledModerationConfig) -> Gate {
        gate_of(&config.rules.one_man_spam)
    }

    async fn scan(
        &self,
        message: &ChatMessage,
        config: &CompiledModerationConfig,
        services: &DetectorServices,
    ) -> Result<Detection> {
        let rule = &config.rules.one_man_spam;
        let since =
            services.clock.now() - Duration::seconds(rule.limits.reset_time_seconds as i64);
        let count = services
            .rate_lookup
            .count_messages_since(&message.channel_id, &message.user_id, since)
            .await?;
        if count >= rule.limits.max_messages {
            return Ok(violation(rule));
        }
        Ok(Detection::Clean)
    }
}

/// Repeated characters ("aaaaaaaaaa") and repeated words
/// ("hi hi hi hi").
pub struct RepetitionDetector;

fn longest_char_run(text: &str) -> usize {
    let mut longest = 0;
    let mut run = 0;
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if c.is_whitespace() {
            prev = None;
            run = 0;
            continue;
        }
        if prev == Some(c) {
            run += 1;
        } else {
            run = 1;
            prev = Some(c);
        }
        longest = longest.max(run);
    }
    longest
}

fn longest_word_run(text: &str) -> usize {
    let mut longest = 0;
    let mut run = 0;
    let mut prev: Option<&str> = None;
    for word in text.split_whitespace() {
        if prev == Some(word) {
            run += 1;
        } else {
            run = 1;
            prev = Some(word);
        }
        longest = longest.max(run);
    }
    longest
}

#[async_trait]
impl Detector for RepetitionDetector {
    fn name(&self) -> &'static str {
        "repetition"
    }

    fn gate(&self, config: &CompiledModerationConfig) -> Gate {
        gate_of(&config.rules.repetition)
    }

    async fn scan(
        &self,
        message: &ChatMessage,
        config: &CompiledModerationConfig,
        _services: &DetectorServices,
    ) -> Result<Detection> {
        let rule = &config.rules.repetition;
        if message.content.chars().count() < rule.limits.min_length {
            return Ok(Detection::Clean);
        }

        if longest_char_run(&message.content) > rule.limits.max_repeated_chars
            || longest_word_run(&message.content) > rule.limits.max_repeated_words
        {
            return Ok(violation(rule));
        }
        Ok(Detection::Clean)
    }
}

/// Symbol ratio over the RAW message (emotes included) plus repeated
/// symbol groups like "?! ?! ?! ?!".
pub struct SymbolFloodDetector;

fn is_symbol(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace()
}

fn longest_symbol_group_run(text: &str) -> usize {
    let mut longest = 0;
    let mut run = 0;
    let mut prev: Option<&str> = None;
    for token in text.split_whitespace() {
        if token.chars().all(is_symbol) {
            if prev == Some(token) {
                run += 1;
            } else {
                run = 1;
                prev = Some(token);
            }
            longest = longest.max(run);
        } else {
            prev = None;
            run = 0;
        }
    }
    longest
}

#[async_trait]
impl Detector for SymbolFloodDetector {
    fn name(&self) -> &'static str {
        "symbol_flood"
    }

    fn gate(&self, config: &CompiledModerationConfig) -> Gate {
        gate_of(&config.rules.symbols)
    }

    async fn scan(
        &self,
        message: &ChatMessage,
        config: &CompiledModerationConfig,
        _services: &DetectorServices,
    ) -> Result<Detection> {
        let rule = &config.rules.symbols;
        let len = message.content.chars().count();
        if len == 0 {
            return Ok(Detection::Clean);
        }

        let symbols = message.content.chars().filter(|c| is_symbol(*c)).count();
        if symbols * 100 >= rule.limits.max_percent as usize * len
            || longest_symbol_group_run(&message.content) >= rule.limits.max_grouped
        {
            return Ok(violation(rule));
        }
        Ok(Detection::Clean)
    }
}

/// Characters outside the permitted Unicode blocks: combining marks
/// and other glyphs used to visually corrupt chat.
pub struct ZalgoDetector;

fn is_permitted_glyph(c: char) -> bool {
    if c.is_alphanumeric() || c.is_whitespace() || c.is_ascii_punctuation() {
        return true;
    }
    matches!(u32::from(c),
        0x00A1..=0x00BF         // latin-1 punctuation and signs
        | 0x2010..=0x205E       // general punctuation
        | 0x20A0..=0x20BF       // currency signs
        | 0x2190..=0x21FF       // arrows
        | 0x2600..=0x27BF       // misc symbols, dingbats
        | 0x1F000..=0x1FAFF     // emoji planes
        | 0xFE0E..=0xFE0F       // variation selectors used by emoji
        | 0x200D                // zero-width joiner (emoji sequences)
    )
}

#[async_trait]
impl Detector for ZalgoDetector {
    fn name(&self) -> &'static str {
        "zalgo"
    }

    fn gate(&self, config: &CompiledModerationConfig) -> Gate {
        gate_of(&config.rules.zalgo)
    }

    async fn scan(
        &self,
        message: &ChatMessage,
        config: &CompiledModerationConfig,
        _services: &DetectorServices,
    ) -> Result<Detection> {
        // NFC first so decomposed but legitimate accents ("e" plus
        // combining acute) recompose instead of tripping the filter.
        let normalized: String = message.content.nfc().collect();
        if normalized.chars().any(|c| !is_permitted_glyph(c)) {
            return Ok(violation(&config.rules.zalgo));
        }
        Ok(Detection::Clean)
    }
}
