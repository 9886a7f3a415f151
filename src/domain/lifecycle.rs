//! Course lifecycle state machine.
//!
//! Courses move draft → submitted → {approved, rejected}, approved courses
//! may publish, and a review-relevant edit demotes an approved or published
//! course back to draft. The rules here are pure; services apply them with a
//! compare-and-set against storage so concurrent writers cannot skip states.

use crate::domain::types::CourseState;

/// Classification of a course edit. Metadata edits never move the state
/// machine; review-relevant edits (title, description, pricing, module and
/// lesson structure) are what approval attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditImpact {
    Metadata,
    ReviewRelevant,
}

pub fn can_submit(state: CourseState) -> bool {
    matches!(state, CourseState::Draft | CourseState::Rejected)
}

pub fn can_decide(state: CourseState) -> bool {
    matches!(state, CourseState::Submitted)
}

pub fn can_publish(state: CourseState) -> bool {
    matches!(state, CourseState::Approved)
}

/// State a course lands in after an edit of the given impact, or `None` when
/// the edit must be rejected outright (review-relevant change while the
/// course sits in the review queue).
pub fn edit_transition(state: CourseState, impact: EditImpact) -> Option<CourseState> {
    match impact {
        EditImpact::Metadata => Some(state),
        EditImpact::ReviewRelevant => match state {
            CourseState::Draft | CourseState::Rejected => Some(state),
            CourseState::Approved | CourseState::Published => Some(CourseState::Draft),
            CourseState::Submitted => None,
        },
    }
}

/// Invariant check: only approved-and-not-yet-edited courses may be
/// published, so a published state always carries the approval flag.
pub fn state_consistent(state: CourseState, admin_approved: bool) -> bool {
    match state {
        CourseState::Published => admin_approved,
        CourseState::Draft | CourseState::Submitted | CourseState::Rejected => true,
        CourseState::Approved => admin_approved,
    }
}
