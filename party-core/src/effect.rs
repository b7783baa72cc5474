//! Effects (side effects as data).
//!
//! Transitions describe what should happen after a change is committed; the
//! server's interpreter delivers them. Delivery is best-effort and never part
//! of the consistency boundary, so effects are only dispatched once the
//! record write has succeeded.

use serde::{Deserialize, Serialize};

use crate::model::{Answer, ApplicationId, PartyId, UserId};

/// All effects that can be produced by transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Send a direct message to one user.
    Notify { recipient: UserId, notice: Notice },

    /// Redraw the posted party card, if there is one.
    RefreshListing { party_id: PartyId },

    /// Log a message (for debugging/tracing).
    Log { level: LogLevel, message: String },
}

impl Effect {
    pub fn notify(recipient: UserId, notice: Notice) -> Self {
        Self::Notify { recipient, notice }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    /// Recipient of a `Notify` effect, if this is one.
    pub fn recipient(&self) -> Option<&UserId> {
        match self {
            Self::Notify { recipient, .. } => Some(recipient),
            _ => None,
        }
    }
}

/// Content of a direct message, before rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    /// Sent to the creator when someone joins without an application.
    MemberJoined { party_title: String, member: UserId },
    /// Sent to the creator when a member leaves.
    MemberLeft { party_title: String, member: UserId },
    /// Sent to a member the creator removed.
    RemovedByLeader { party_title: String },
    /// Sent to the creator with the full answer set.
    ApplicationReceived {
        application_id: ApplicationId,
        party_title: String,
        applicant: UserId,
        applicant_display_name: String,
        answers: Vec<Answer>,
    },
    ApplicationApproved { party_title: String },
    ApplicationRejected { party_title: String },
    /// Sent to every non-creator member when the party is deleted.
    PartyDeleted { party_title: String },
    /// A creator's message fanned out to the rest of the party.
    PartyMessage {
        party_title: String,
        from: UserId,
        body: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}
