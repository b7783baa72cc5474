//! Typed failures returned by every party operation.

use std::fmt;

use thiserror::Error;

/// Which kind of record a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Party,
    Application,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Party => write!(f, "party"),
            Self::Application => write!(f, "application"),
        }
    }
}

/// Failure of a party, draft or application operation.
///
/// All variants are recovered at the operation boundary and rendered with
/// [`PartyError::user_message`]. `Storage` and `Contended` are the only ones
/// that do not describe a user-correctable condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartyError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(Entity),

    #[error("requester is not the party creator")]
    Forbidden,

    #[error("user is not a member of the party")]
    NotAMember,

    #[error("the creator cannot leave their own party")]
    CannotLeaveOwnParty,

    #[error("the creator cannot kick themselves")]
    CannotKickSelf,

    #[error("party is not open")]
    NotOpen,

    #[error("party is full")]
    PartyFull,

    #[error("user is already a member of the party")]
    AlreadyMember,

    #[error("a pending application already exists for this user and party")]
    DuplicatePending,

    #[error("application has already been decided")]
    AlreadyDecided,

    #[error("party has requirements; an application is needed to join")]
    ApplicationRequired,

    #[error("draft session expired, missing or owned by someone else")]
    SessionExpired,

    #[error("storage failure during {operation}: {message}")]
    Storage { operation: String, message: String },

    #[error("{0} kept changing underneath the operation")]
    Contended(String),
}

impl PartyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Short text safe to show to the user who triggered the operation.
    ///
    /// Validation messages are shown verbatim. Storage details are not
    /// exposed; they only reach the operator log.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::NotFound(Entity::Party) => "That party could not be found.".to_string(),
            Self::NotFound(Entity::Application) => {
                "Application not found or you are not the party leader.".to_string()
            }
            Self::Forbidden => "Only the party leader can do that.".to_string(),
            Self::NotAMember => "That user is not a member of this party.".to_string(),
            Self::CannotLeaveOwnParty => {
                "You cannot leave your own party. Delete it instead.".to_string()
            }
            Self::CannotKickSelf => "You cannot kick yourself from your own party.".to_string(),
            Self::NotOpen => "This party is no longer open.".to_string(),
            Self::PartyFull => "This party is full.".to_string(),
            Self::AlreadyMember => "You are already a member of this party.".to_string(),
            Self::DuplicatePending => {
                "You already have a pending application for this party.".to_string()
            }
            Self::AlreadyDecided => "This application has already been decided.".to_string(),
            Self::ApplicationRequired => {
                "This party has requirements. Submit an application to join.".to_string()
            }
            Self::SessionExpired => {
                "Session expired. Please start a new party draft.".to_string()
            }
            Self::Storage { .. } => {
                "Something went wrong saving that change. Please try again.".to_string()
            }
            Self::Contended(_) => "That party is busy right now. Please try again.".to_string(),
        }
    }
}
