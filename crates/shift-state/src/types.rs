//! Blue/green deployment state.
//!
//! Two slots, exactly one live. A promotion writes the candidate into the
//! inactive slot and flips the live pointer to it; a rollback flips back to
//! the slot that was live before, whose content was never touched.

use std::fmt;

use serde::{Deserialize, Serialize};
use shift_core::{ModelVariant, TemplateRef};

use crate::error::{StateError, StateResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotColor {
    Blue,
    Green,
}

impl SlotColor {
    pub fn other(self) -> Self {
        match self {
            SlotColor::Blue => SlotColor::Green,
            SlotColor::Green => SlotColor::Blue,
        }
    }
}

impl fmt::Display for SlotColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotColor::Blue => f.write_str("blue"),
            SlotColor::Green => f.write_str("green"),
        }
    }
}

/// What a slot serves: a template version and its model variant set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotContent {
    pub candidate_id: String,
    pub template: TemplateRef,
    pub variants: Vec<ModelVariant>,
    pub deployed_at: u64,
}

/// The live slot and what it serves. `content` is `None` for a target
/// that has never been promoted into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePointer {
    pub slot: SlotColor,
    pub content: Option<SlotContent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Promote,
    Rollback,
    /// A promotion undone because the hosting layer rejected it.
    Revert,
}

/// One live-pointer change, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotTransition {
    pub kind: TransitionKind,
    pub from: SlotColor,
    pub to: SlotColor,
    pub pipeline_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<String>,
    pub cause: String,
    pub at: u64,
}

/// Deployment state of one target. Mutated only through the transition
/// functions below, committed by a single writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    pub target: String,
    pub blue: Option<SlotContent>,
    pub green: Option<SlotContent>,
    pub live: SlotColor,
    /// Ordered pointer changes.
    pub history: Vec<SlotTransition>,
    /// Bumped on every committed change.
    pub revision: u64,
}

impl DeploymentState {
    /// Fresh target: blue is live and empty.
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            blue: None,
            green: None,
            live: SlotColor::Blue,
            history: Vec::new(),
            revision: 0,
        }
    }

    pub fn slot(&self, color: SlotColor) -> Option<&SlotContent> {
        match color {
            SlotColor::Blue => self.blue.as_ref(),
            SlotColor::Green => self.green.as_ref(),
        }
    }

    fn slot_mut(&mut self, color: SlotColor) -> &mut Option<SlotContent> {
        match color {
            SlotColor::Blue => &mut self.blue,
            SlotColor::Green => &mut self.green,
        }
    }

    pub fn inactive(&self) -> SlotColor {
        self.live.other()
    }

    pub fn live_pointer(&self) -> LivePointer {
        LivePointer {
            slot: self.live,
            content: self.slot(self.live).cloned(),
        }
    }

    /// Write `content` into the inactive slot and flip the live pointer to it.
    pub fn promote(&self, content: SlotContent, pipeline_id: &str, cause: &str, at: u64) -> Self {
        let mut next = self.clone();
        let from = next.live;
        let to = next.inactive();
        let candidate_id = content.candidate_id.clone();
        *next.slot_mut(to) = Some(content);
        next.live = to;
        next.history.push(SlotTransition {
            kind: TransitionKind::Promote,
            from,
            to,
            pipeline_id: pipeline_id.to_string(),
            candidate_id: Some(candidate_id),
            cause: cause.to_string(),
            at,
        });
        next.revision += 1;
        next
    }

    /// Flip the live pointer back to `previous`.
    ///
    /// The slot must still hold exactly the recorded content; the pointer is
    /// restored, never reconstructed. Returns `None` when `previous` is
    /// already live (nothing to do).
    pub fn rollback_to(
        &self,
        previous: &LivePointer,
        pipeline_id: &str,
        cause: &str,
        at: u64,
    ) -> StateResult<Option<Self>> {
        if self.slot(previous.slot) != previous.content.as_ref() {
            return Err(StateError::SlotMismatch {
                target: self.target.clone(),
                slot: previous.slot.to_string(),
            });
        }
        if self.live == previous.slot {
            return Ok(None);
        }

        let mut next = self.clone();
        let from = next.live;
        next.live = previous.slot;
        next.history.push(SlotTransition {
            kind: TransitionKind::Rollback,
            from,
            to: previous.slot,
            pipeline_id: pipeline_id.to_string(),
            candidate_id: previous.content.as_ref().map(|c| c.candidate_id.clone()),
            cause: cause.to_string(),
            at,
        });
        next.revision += 1;
        Ok(Some(next))
    }

    /// Undo a promotion that was committed but never took effect: both
    /// slots and the live pointer go back to `before`, history is kept.
    pub fn revert_to(&self, before: &DeploymentState, pipeline_id: &str, cause: &str, at: u64) -> Self {
        let mut next = before.clone();
        next.history = self.history.clone();
        next.history.push(SlotTransition {
            kind: TransitionKind::Revert,
            from: self.live,
            to: before.live,
            pipeline_id: pipeline_id.to_string(),
            candidate_id: before.slot(before.live).map(|c| c.candidate_id.clone()),
            cause: cause.to_string(),
            at,
        });
        next.revision = self.revision + 1;
        next
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;

    pub(crate) fn content(candidate: &str, version: (u64, u64, u64)) -> SlotContent {
        SlotContent {
            candidate_id: candidate.to_string(),
            template: TemplateRef {
                id: "support".into(),
                version: semver::Version::new(version.0, version.1, version.2),
            },
            variants: vec![ModelVariant {
                name: None,
                provider: "bedrock".into(),
                model: "claude-v2".into(),
                params: shift_core::InvocationParams {
                    temperature: 0.5,
                    max_tokens: 200,
                    top_p: None,
                    extra: BTreeMap::new(),
                },
            }],
            deployed_at: 100,
        }
    }

    #[test]
    fn new_state_has_empty_blue_live() {
        let s = DeploymentState::new("cs");
        assert_eq!(s.live, SlotColor::Blue);
        assert_eq!(s.live_pointer().content, None);
        assert_eq!(s.inactive(), SlotColor::Green);
    }

    #[test]
    fn promote_writes_inactive_slot_and_flips() {
        let s = DeploymentState::new("cs");
        let next = s.promote(content("c1", (1, 0, 0)), "p1", "gate passed", 10);

        assert_eq!(next.live, SlotColor::Green);
        assert_eq!(next.green.as_ref().unwrap().candidate_id, "c1");
        assert_eq!(next.blue, None);
        assert_eq!(next.revision, 1);
        assert_eq!(next.history.len(), 1);
        assert_eq!(next.history[0].kind, TransitionKind::Promote);
        // Original value untouched.
        assert_eq!(s.revision, 0);
    }

    #[test]
    fn rollback_restores_exact_previous_pointer() {
        let s = DeploymentState::new("cs").promote(content("c1", (1, 0, 0)), "p1", "ok", 10);
        let before = s.live_pointer();

        let promoted = s.promote(content("c2", (1, 1, 0)), "p2", "ok", 20);
        assert_eq!(promoted.live, SlotColor::Blue);

        let restored = promoted
            .rollback_to(&before, "p2", "health degradation", 30)
            .unwrap()
            .unwrap();
        assert_eq!(restored.live_pointer(), before);
        assert_eq!(restored.history.last().unwrap().kind, TransitionKind::Rollback);
        assert_eq!(restored.revision, 3);
    }

    #[test]
    fn revert_restores_slots_and_keeps_history() {
        let before = DeploymentState::new("cs").promote(content("c1", (1, 0, 0)), "p1", "ok", 10);
        let promoted = before.promote(content("c2", (2, 0, 0)), "p2", "ok", 20);
        let reverted = promoted.revert_to(&before, "p2", "host rejected directive", 21);

        assert_eq!(reverted.live_pointer(), before.live_pointer());
        assert_eq!(reverted.blue, before.blue);
        assert_eq!(reverted.green, before.green);
        assert_eq!(reverted.revision, promoted.revision + 1);
        assert_eq!(reverted.history.len(), 3);
        assert_eq!(reverted.history[2].kind, TransitionKind::Revert);
    }

    #[test]
    fn rollback_when_already_live_is_noop() {
        let s = DeploymentState::new("cs").promote(content("c1", (1, 0, 0)), "p1", "ok", 10);
        let pointer = s.live_pointer();
        assert!(s.rollback_to(&pointer, "p1", "manual", 11).unwrap().is_none());
    }

    #[test]
    fn rollback_rejects_overwritten_slot() {
        let s = DeploymentState::new("cs");
        let before = s.live_pointer(); // blue, empty
        let s = s
            .promote(content("c1", (1, 0, 0)), "p1", "ok", 10) // green live
            .promote(content("c2", (2, 0, 0)), "p2", "ok", 20); // blue overwritten
        let err = s.rollback_to(&before, "p1", "manual", 30).unwrap_err();
        assert!(matches!(err, StateError::SlotMismatch { .. }));
    }
}
