//! In-progress party descriptions built up over several interactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PartyError;
use crate::model::{Requirement, UserId, MAX_REQUIREMENTS};
use crate::validation;

/// A party that has not been published yet.
///
/// Drafts live in the session store, keyed by session id, and only their
/// owner may touch them. Requirements behave as a stack: removal always
/// drops the most recently added one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyDraft {
    pub owner: UserId,
    pub title: String,
    pub max_members: u32,
    pub description: Option<String>,
    pub requirements: Vec<Requirement>,
    pub created_at: DateTime<Utc>,
}

impl PartyDraft {
    /// Start a draft, validating the fixed-shape fields up front.
    pub fn new(
        owner: UserId,
        title: &str,
        max_members: u32,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, PartyError> {
        Ok(Self {
            owner,
            title: validation::title(title)?,
            max_members: validation::max_members(max_members)?,
            description: validation::description(description)?,
            requirements: Vec::new(),
            created_at: now,
        })
    }

    pub fn add_requirement(
        &mut self,
        name: &str,
        description: Option<&str>,
    ) -> Result<&Requirement, PartyError> {
        if self.requirements.len() >= MAX_REQUIREMENTS {
            return Err(PartyError::validation(format!(
                "A party can have at most {} requirements.",
                MAX_REQUIREMENTS
            )));
        }
        let requirement = validation::requirement(name, description)?;
        if self
            .requirements
            .iter()
            .any(|r| r.name.eq_ignore_ascii_case(&requirement.name))
        {
            return Err(PartyError::validation(format!(
                "This party already has a requirement named \"{}\".",
                requirement.name
            )));
        }
        self.requirements.push(requirement);
        Ok(&self.requirements[self.requirements.len() - 1])
    }

    /// Remove the most recently added requirement. No-op when there are none.
    pub fn remove_last_requirement(&mut self) -> Option<Requirement> {
        self.requirements.pop()
    }
}
