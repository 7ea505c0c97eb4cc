// src/engine/mod.rs - Moderation dispatcher
//
// Owns the ordered detector list and the aggregation policy. Detectors
// are pure apart from the escalation tracker, so they all run
// concurrently for each message; their verdicts are then reduced to a
// single enforcement decision.

use futures_util::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;

use crate::config::CompiledModerationConfig;
use crate::services::{ConfigStore, MessageRateLookup, PermissionService};
use crate::types::{ChatMessage, ModerationVerdict, PermissionLevelSet};

pub mod detectors;
pub mod escalation;
pub mod links;
pub mod normalizer;

use detectors::{default_detectors, Detection, Detector};
use escalation::{Clock, EscalationTracker, SystemClock};

/// Handles a detector may need during its content test.
pub struct DetectorServices {
    pub rate_lookup: Arc<dyn MessageRateLookup>,
    pub clock: Arc<dyn Clock>,
}

/// The moderation engine: evaluates one message against every enabled
/// detector for its channel and returns the single most severe verdict.
///
/// All external lookups fail open: a broken config store, permission
/// service or rate lookup downgrades to "no action" with a logged
/// diagnostic instead of stalling message processing.
pub struct ModerationEngine {
    detectors: Vec<Box<dyn Detector>>,
    config_store: Arc<dyn ConfigStore>,
    permissions: Arc<dyn PermissionService>,
    services: DetectorServices,
    tracker: EscalationTracker,
}

impl ModerationEngine {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        permissions: Arc<dyn PermissionService>,
        rate_lookup: Arc<dyn MessageRateLookup>,
    ) -> Self {
        Self::with_clock(config_store, permissions, rate_lookup, Arc::new(SystemClock))
    }

    /// Engine with an injected clock; window-expiry tests use this to
    /// drive time manually.
    pub fn with_clock(
        config_store: Arc<dyn ConfigStore>,
        permissions: Arc<dyn PermissionService>,
        rate_lookup: Arc<dyn MessageRateLookup>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let detectors = default_detectors();
        info!("moderation engine ready with {} detectors", detectors.len());
        Self {
            detectors,
            config_store,
            permissions,
            services: DetectorServices {
                rate_lookup,
                clock,
            },
            tracker: EscalationTracker::new(),
        }
    }

    /// Names of the detectors in dispatch order.
    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Evaluate one message. Returns the aggregated verdict: the most
    /// severe one any detector produced, ties going to the earliest
    /// detector in dispatch order.
    pub async fn evaluate(&self, message: &ChatMessage) -> ModerationVerdict {
        let config = match self.config_store.moderation_config(&message.channel_id).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!("no moderation config for {}; skipping", message.channel_id);
                return ModerationVerdict::none();
            }
            Err(e) => {
                warn!(
                    "config lookup failed for {}: {e:#}; failing open",
                    message.channel_id
                );
                return ModerationVerdict::none();
            }
        };

        let permissions = match self
            .permissions
            .permissions(&message.channel_id, &message.user_id)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    "permission lookup failed for {}:{}: {e:#}; failing open",
                    message.channel_id, message.user_id
                );
                return ModerationVerdict::none();
            }
        };

        let config_ref: &CompiledModerationConfig = &config;
        let verdicts = join_all(
            self.detectors
                .iter()
                .map(|detector| self.run_detector(detector.as_ref(), message, config_ref, permissions)),
        )
        .await;

        verdicts
            .into_iter()
            .fold(ModerationVerdict::none(), |best, verdict| {
                if verdict.kind.severity() > best.kind.severity() {
                    verdict
                } else {
                    best
                }
            })
    }

    async fn run_detector(
        &self,
        detector: &dyn Detector,
        message: &ChatMessage,
        config: &CompiledModerationConfig,
        permissions: PermissionLevelSet,
    ) -> ModerationVerdict {
        let gate = detector.gate(config);
        if !gate.enabled {
            return ModerationVerdict::none();
        }

        // Permission check precedes any content analysis.
        if permissions.intersects(PermissionLevelSet::ALWAYS_EXEMPT.union(gate.excluded_levels)) {
            return ModerationVerdict::none();
        }

        match detector.scan(message, config, &self.services).await {
            Err(e) => {
                warn!(
                    "{} detector failed for {}:{}: {e:#}; failing open",
                    detector.name(),
                    message.channel_id,
                    message.user_id
                );
                ModerationVerdict::none()
            }
            Ok(Detection::Clean) => ModerationVerdict::none(),
            Ok(Detection::Direct(verdict)) => {
                debug!(
                    "{} fired directly for {} in {}",
                    detector.name(),
                    message.username,
                    message.channel_id
                );
                verdict
            }
            Ok(Detection::Violation { warning, timeout }) => {
                let now = self.services.clock.now();
                let window = config.rules.warning_window_seconds;
                if self
                    .tracker
                    .should_escalate(&message.channel_id, &message.user_id, window, now)
                    .await
                {
                    debug!(
                        "{} fired for {} in {}; escalating to timeout",
                        detector.name(),
                        message.username,
                        message.channel_id
                    );
                    ModerationVerdict::from_tier(&timeout)
                } else {
                    debug!(
                        "{} fired for {} in {}; issuing warning",
                        detector.name(),
                        message.username,
                        message.channel_id
                    );
                    let verdict = ModerationVerdict::from_tier(&warning);
                    self.tracker
                        .record_warning(&message.channel_id, &message.user_id, now)
                        .await;
                    verdict
                }
            }
        }
    }
}
