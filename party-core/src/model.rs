//! Records for parties and applications.
//!
//! Following the principle of "make illegal states unrepresentable", the
//! member count of a party is derived from its member list instead of being
//! stored next to it, and statuses are enums rather than strings.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Smallest allowed party size (creator plus one).
pub const MIN_MEMBERS: u32 = 2;
/// Largest allowed party size.
pub const MAX_MEMBERS: u32 = 20;
pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 1000;
pub const MAX_REQUIREMENT_NAME_LEN: usize = 50;
pub const MAX_REQUIREMENT_DESCRIPTION_LEN: usize = 200;
/// An application form carries at most this many fields.
pub const MAX_REQUIREMENTS: usize = 5;
pub const MAX_ANSWER_LEN: usize = 500;
pub const MAX_ANNOUNCEMENT_LEN: usize = 2000;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Chat-platform user identifier.
    UserId
);
string_id!(
    /// Durable party identifier.
    PartyId
);
string_id!(
    /// Durable application identifier.
    ApplicationId
);

impl PartyId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl ApplicationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

/// A named criterion an applicant must answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Requirement {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            description,
        }
    }
}

/// Lifecycle status of a party.
///
/// `Open` is the only non-terminal status; nothing ever moves a party back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyStatus {
    Open,
    Closed,
    Deleted,
}

impl PartyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl fmt::Display for PartyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A durable, capacity-bounded group owned by its creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub creator: UserId,
    /// Where the party was posted (channel or guild scope).
    pub context_id: String,
    /// The posted party card, once the surface reports it.
    #[serde(default)]
    pub origin_message_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub max_members: u32,
    pub requirements: Vec<Requirement>,
    /// `members[0]` is always the creator.
    pub members: Vec<UserId>,
    pub status: PartyStatus,
    pub created_at: DateTime<Utc>,
    /// Store-managed write counter used for compare-and-swap.
    #[serde(default)]
    pub version: u64,
}

impl Party {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.iter().any(|m| m == user)
    }

    pub fn is_creator(&self, user: &UserId) -> bool {
        &self.creator == user
    }

    pub fn is_full(&self) -> bool {
        self.member_count() >= self.max_members as usize
    }

    pub fn open_slots(&self) -> usize {
        (self.max_members as usize).saturating_sub(self.member_count())
    }

    pub fn has_requirements(&self) -> bool {
        !self.requirements.is_empty()
    }

    /// Members other than the creator, in join order.
    pub fn other_members(&self) -> Vec<UserId> {
        self.members
            .iter()
            .filter(|m| **m != self.creator)
            .cloned()
            .collect()
    }

    /// Check the structural invariants that every stored party must satisfy.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.members.first() != Some(&self.creator) {
            return Err(format!("party {}: creator is not members[0]", self.id));
        }
        if self.member_count() > self.max_members as usize {
            return Err(format!(
                "party {}: {} members exceeds max {}",
                self.id,
                self.member_count(),
                self.max_members
            ));
        }
        for (i, m) in self.members.iter().enumerate() {
            if self.members[..i].contains(m) {
                return Err(format!("party {}: duplicate member {}", self.id, m));
            }
        }
        Ok(())
    }
}

/// Status of an application. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// The creator's verdict on an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

/// One answered requirement on an application form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub requirement: String,
    pub answer: String,
}

/// A request by a user to join a party that has requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub party_id: PartyId,
    pub applicant: UserId,
    pub applicant_display_name: String,
    /// Answers in the party's requirement order, one per requirement.
    pub answers: Vec<Answer>,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl Application {
    pub fn answer_for(&self, requirement: &str) -> Option<&str> {
        self.answers
            .iter()
            .find(|a| a.requirement == requirement)
            .map(|a| a.answer.as_str())
    }
}

/// Query over parties. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartyFilter {
    pub creator: Option<UserId>,
    pub member: Option<UserId>,
    pub status: Option<PartyStatus>,
}

impl PartyFilter {
    pub fn created_by(mut self, user: UserId) -> Self {
        self.creator = Some(user);
        self
    }

    pub fn with_member(mut self, user: UserId) -> Self {
        self.member = Some(user);
        self
    }

    pub fn with_status(mut self, status: PartyStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, party: &Party) -> bool {
        self.creator.as_ref().map_or(true, |c| party.creator == *c)
            && self.member.as_ref().map_or(true, |m| party.is_member(m))
            && self.status.map_or(true, |s| party.status == s)
    }
}

/// Query over applications. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationFilter {
    pub party: Option<PartyId>,
    /// Restrict to applications targeting any of these parties.
    pub party_in: Option<Vec<PartyId>>,
    pub applicant: Option<UserId>,
    pub status: Option<ApplicationStatus>,
}

impl ApplicationFilter {
    pub fn for_party(mut self, party: PartyId) -> Self {
        self.party = Some(party);
        self
    }

    pub fn for_parties(mut self, parties: Vec<PartyId>) -> Self {
        self.party_in = Some(parties);
        self
    }

    pub fn by_applicant(mut self, user: UserId) -> Self {
        self.applicant = Some(user);
        self
    }

    pub fn with_status(mut self, status: ApplicationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, app: &Application) -> bool {
        self.party.as_ref().map_or(true, |p| app.party_id == *p)
            && self
                .party_in
                .as_ref()
                .map_or(true, |ps| ps.contains(&app.party_id))
            && self
                .applicant
                .as_ref()
                .map_or(true, |u| app.applicant == *u)
            && self.status.map_or(true, |s| app.status == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party_with(members: &[&str], max_members: u32) -> Party {
        Party {
            id: PartyId::from("p1"),
            creator: UserId::from(members[0]),
            context_id: "chan".to_string(),
            origin_message_id: None,
            title: "Ranked night".to_string(),
            description: None,
            max_members,
            requirements: vec![],
            members: members.iter().map(|m| UserId::from(*m)).collect(),
            status: PartyStatus::Open,
            created_at: Utc::now(),
            version: 0,
        }
    }

    #[test]
    fn test_member_count_is_derived_from_members() {
        let party = party_with(&["a", "b", "c"], 4);
        assert_eq!(party.member_count(), 3);
        assert_eq!(party.open_slots(), 1);
        assert!(!party.is_full());
    }

    #[test]
    fn test_other_members_excludes_creator() {
        let party = party_with(&["a", "b", "c"], 4);
        assert_eq!(
            party.other_members(),
            vec![UserId::from("b"), UserId::from("c")]
        );
    }

    #[test]
    fn test_check_invariants_rejects_duplicates_and_overflow() {
        let mut party = party_with(&["a", "b"], 2);
        assert!(party.check_invariants().is_ok());

        party.members.push(UserId::from("c"));
        assert!(party.check_invariants().is_err());

        let dup = party_with(&["a", "b", "b"], 5);
        assert!(dup.check_invariants().is_err());

        let mut wrong_head = party_with(&["a", "b"], 5);
        wrong_head.members.reverse();
        assert!(wrong_head.check_invariants().is_err());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [PartyStatus::Open, PartyStatus::Closed, PartyStatus::Deleted] {
            assert_eq!(PartyStatus::parse(status.as_str()), Some(status));
        }
        for status in [
            ApplicationStatus::Pending,
            ApplicationStatus::Approved,
            ApplicationStatus::Rejected,
        ] {
            assert_eq!(ApplicationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PartyStatus::parse("archived"), None);
    }

    #[test]
    fn test_party_filter_matches() {
        let party = party_with(&["a", "b"], 4);

        assert!(PartyFilter::default().matches(&party));
        assert!(PartyFilter::default()
            .created_by(UserId::from("a"))
            .matches(&party));
        assert!(!PartyFilter::default()
            .created_by(UserId::from("b"))
            .matches(&party));
        assert!(PartyFilter::default()
            .with_member(UserId::from("b"))
            .with_status(PartyStatus::Open)
            .matches(&party));
        assert!(!PartyFilter::default()
            .with_status(PartyStatus::Closed)
            .matches(&party));
    }

    #[test]
    fn test_party_serializes_ids_transparently() {
        let party = party_with(&["a"], 2);
        let json = serde_json::to_value(&party).unwrap();
        assert_eq!(json["id"], "p1");
        assert_eq!(json["members"][0], "a");
        assert_eq!(json["status"], "open");
    }
}
