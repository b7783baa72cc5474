//! Pure transition functions.
//!
//! Each transition takes the current record and a request and returns either
//! a typed failure or the new record together with the effects to dispatch
//! once it is committed. Nothing here reads clocks or generates ids; callers
//! pass them in.

pub mod application;
pub mod lifecycle;

pub use application::{decide, submit, ApplicationRequest, Decided};
pub use lifecycle::{
    announce, attach_origin_message, close, delete, finalize_draft, join, kick, leave,
    PartyDeletion,
};

use crate::effect::Effect;
use crate::error::PartyError;

/// New value plus the effects to execute after it is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<T> {
    pub value: T,
    pub effects: Vec<Effect>,
}

impl<T> Transition<T> {
    pub fn new(value: T, effects: Vec<Effect>) -> Self {
        Self { value, effects }
    }

    /// A transition that produces no effects.
    pub fn no_change(value: T) -> Self {
        Self {
            value,
            effects: vec![],
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Transition<U> {
        Transition {
            value: f(self.value),
            effects: self.effects,
        }
    }
}

pub type TransitionResult<T> = Result<Transition<T>, PartyError>;

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use crate::model::{Party, PartyId, PartyStatus, Requirement, UserId};

    pub fn user(id: &str) -> UserId {
        UserId::from(id)
    }

    /// An open party with no requirements. `members[0]` is the creator.
    pub fn open_party(members: &[&str], max_members: u32) -> Party {
        Party {
            id: PartyId::from("p1"),
            creator: user(members[0]),
            context_id: "chan-1".to_string(),
            origin_message_id: None,
            title: "Ranked night".to_string(),
            description: None,
            max_members,
            requirements: vec![],
            members: members.iter().map(|m| user(m)).collect(),
            status: PartyStatus::Open,
            created_at: Utc::now(),
            version: 0,
        }
    }

    /// An open party requiring a "Rank" answer.
    pub fn gated_party(members: &[&str], max_members: u32) -> Party {
        let mut party = open_party(members, max_members);
        party.requirements = vec![Requirement::new("Rank", Some("Diamond+".to_string()))];
        party
    }
}
