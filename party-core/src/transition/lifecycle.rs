//! Party lifecycle transitions.
//!
//! `Open -> Closed` and `Open -> Deleted` are the only status changes, both
//! creator-only. Membership changes (join, leave, kick) keep `members[0]`
//! as the creator and never push the count past `max_members`.

use chrono::{DateTime, Utc};

use super::{Transition, TransitionResult};
use crate::draft::PartyDraft;
use crate::effect::{Effect, Notice};
use crate::error::PartyError;
use crate::model::{Party, PartyId, PartyStatus, UserId};
use crate::validation;

/// Outcome of deleting a party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyDeletion {
    pub party: Party,
    /// Members other than the creator at the time of deletion.
    pub notified: Vec<UserId>,
}

/// Turn a draft into an open party whose only member is its creator.
pub fn finalize_draft(
    draft: PartyDraft,
    id: PartyId,
    context_id: impl Into<String>,
    now: DateTime<Utc>,
) -> TransitionResult<Party> {
    let title = validation::title(&draft.title)?;
    let max_members = validation::max_members(draft.max_members)?;
    let description = validation::description(draft.description.as_deref())?;
    validation::requirement_set(&draft.requirements)?;

    let party = Party {
        id,
        creator: draft.owner.clone(),
        context_id: context_id.into(),
        origin_message_id: None,
        title,
        description,
        max_members,
        requirements: draft.requirements,
        members: vec![draft.owner],
        status: PartyStatus::Open,
        created_at: now,
        version: 0,
    };
    let log = Effect::info(format!(
        "Party {} \"{}\" created by {} ({} slots, {} requirements)",
        party.id,
        party.title,
        party.creator,
        party.max_members,
        party.requirements.len()
    ));
    Ok(Transition::new(party, vec![log]))
}

/// Append a user to the member list. Callers check the preconditions.
pub(crate) fn admit(mut party: Party, user: UserId) -> Party {
    debug_assert!(!party.is_member(&user));
    debug_assert!(!party.is_full());
    party.members.push(user);
    party
}

/// Preconditions shared by direct joins and application submission.
pub(crate) fn check_can_enter(party: &Party, user: &UserId) -> Result<(), PartyError> {
    if party.status != PartyStatus::Open {
        return Err(PartyError::NotOpen);
    }
    if party.is_member(user) {
        return Err(PartyError::AlreadyMember);
    }
    if party.is_full() {
        return Err(PartyError::PartyFull);
    }
    Ok(())
}

/// Join a party that has no requirements.
pub fn join(party: Party, user: &UserId) -> TransitionResult<Party> {
    check_can_enter(&party, user)?;
    if party.has_requirements() {
        return Err(PartyError::ApplicationRequired);
    }

    let party = admit(party, user.clone());
    let effects = vec![
        Effect::notify(
            party.creator.clone(),
            Notice::MemberJoined {
                party_title: party.title.clone(),
                member: user.clone(),
            },
        ),
        Effect::RefreshListing {
            party_id: party.id.clone(),
        },
    ];
    Ok(Transition::new(party, effects))
}

pub fn leave(mut party: Party, user: &UserId) -> TransitionResult<Party> {
    if party.status == PartyStatus::Deleted {
        return Err(PartyError::NotOpen);
    }
    if !party.is_member(user) {
        return Err(PartyError::NotAMember);
    }
    if party.is_creator(user) {
        return Err(PartyError::CannotLeaveOwnParty);
    }

    party.members.retain(|m| m != user);
    let effects = vec![
        Effect::notify(
            party.creator.clone(),
            Notice::MemberLeft {
                party_title: party.title.clone(),
                member: user.clone(),
            },
        ),
        Effect::RefreshListing {
            party_id: party.id.clone(),
        },
    ];
    Ok(Transition::new(party, effects))
}

/// Stop accepting members. Closing an already closed party is a no-op.
pub fn close(mut party: Party, requester: &UserId) -> TransitionResult<Party> {
    if !party.is_creator(requester) {
        return Err(PartyError::Forbidden);
    }
    match party.status {
        PartyStatus::Open => {
            party.status = PartyStatus::Closed;
            let effects = vec![
                Effect::RefreshListing {
                    party_id: party.id.clone(),
                },
                Effect::info(format!("Party {} closed by its creator", party.id)),
            ];
            Ok(Transition::new(party, effects))
        }
        PartyStatus::Closed => Ok(Transition::no_change(party)),
        PartyStatus::Deleted => Err(PartyError::NotOpen),
    }
}

/// Mark a party deleted. The record and its member list are kept so that
/// applications still resolve; the other members are told about it.
pub fn delete(mut party: Party, requester: &UserId) -> TransitionResult<PartyDeletion> {
    if !party.is_creator(requester) {
        return Err(PartyError::Forbidden);
    }
    match party.status {
        PartyStatus::Open => {
            let notified = party.other_members();
            party.status = PartyStatus::Deleted;

            let mut effects: Vec<Effect> = notified
                .iter()
                .map(|member| {
                    Effect::notify(
                        member.clone(),
                        Notice::PartyDeleted {
                            party_title: party.title.clone(),
                        },
                    )
                })
                .collect();
            effects.push(Effect::RefreshListing {
                party_id: party.id.clone(),
            });

            Ok(Transition::new(PartyDeletion { party, notified }, effects))
        }
        PartyStatus::Deleted => Ok(Transition::no_change(PartyDeletion {
            party,
            notified: vec![],
        })),
        PartyStatus::Closed => Err(PartyError::NotOpen),
    }
}

pub fn kick(mut party: Party, requester: &UserId, target: &UserId) -> TransitionResult<Party> {
    if !party.is_creator(requester) {
        return Err(PartyError::Forbidden);
    }
    if party.status == PartyStatus::Deleted {
        return Err(PartyError::NotOpen);
    }
    if party.is_creator(target) {
        return Err(PartyError::CannotKickSelf);
    }
    if !party.is_member(target) {
        return Err(PartyError::NotAMember);
    }

    party.members.retain(|m| m != target);
    let effects = vec![
        Effect::notify(
            target.clone(),
            Notice::RemovedByLeader {
                party_title: party.title.clone(),
            },
        ),
        Effect::RefreshListing {
            party_id: party.id.clone(),
        },
    ];
    Ok(Transition::new(party, effects))
}

/// Send a message from the creator to every other member.
///
/// Does not change the party; the value is the list of recipients.
pub fn announce(party: &Party, requester: &UserId, body: &str) -> TransitionResult<Vec<UserId>> {
    if !party.is_creator(requester) {
        return Err(PartyError::Forbidden);
    }
    if party.status == PartyStatus::Deleted {
        return Err(PartyError::NotOpen);
    }
    let body = validation::announcement(body)?;

    let recipients = party.other_members();
    let effects = recipients
        .iter()
        .map(|member| {
            Effect::notify(
                member.clone(),
                Notice::PartyMessage {
                    party_title: party.title.clone(),
                    from: requester.clone(),
                    body: body.clone(),
                },
            )
        })
        .collect();
    Ok(Transition::new(recipients, effects))
}

/// Record where the party card was posted.
pub fn attach_origin_message(
    mut party: Party,
    requester: &UserId,
    message_id: &str,
) -> TransitionResult<Party> {
    if !party.is_creator(requester) {
        return Err(PartyError::Forbidden);
    }
    let message_id = message_id.trim();
    if message_id.is_empty() {
        return Err(PartyError::validation("Message id cannot be empty."));
    }
    party.origin_message_id = Some(message_id.to_string());
    Ok(Transition::no_change(party))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{open_party, user};
    use super::*;
    use crate::model::Requirement;

    #[test]
    fn test_finalize_creates_open_party_with_creator_only() {
        let mut draft =
            PartyDraft::new(user("a"), "Ranked night", 4, Some("Bring comms"), Utc::now())
                .unwrap();
        draft.add_requirement("Rank", Some("Diamond+")).unwrap();

        let result = finalize_draft(draft, PartyId::from("p1"), "chan-1", Utc::now()).unwrap();
        let party = result.value;

        assert_eq!(party.status, PartyStatus::Open);
        assert_eq!(party.members, vec![user("a")]);
        assert_eq!(party.member_count(), 1);
        assert_eq!(party.creator, user("a"));
        assert_eq!(party.context_id, "chan-1");
        assert_eq!(party.requirements.len(), 1);
        assert!(party.check_invariants().is_ok());
    }

    #[test]
    fn test_finalize_rejects_tampered_draft() {
        let mut draft = PartyDraft::new(user("a"), "t", 4, None, Utc::now()).unwrap();
        draft.max_members = 50;
        assert!(matches!(
            finalize_draft(draft, PartyId::from("p"), "c", Utc::now()),
            Err(PartyError::Validation(_))
        ));

        let mut draft = PartyDraft::new(user("a"), "t", 4, None, Utc::now()).unwrap();
        draft.requirements = vec![Requirement::new("Rank", None), Requirement::new("rank", None)];
        assert!(finalize_draft(draft, PartyId::from("p"), "c", Utc::now()).is_err());
    }

    #[test]
    fn test_join_appends_and_notifies_creator() {
        let party = open_party(&["a"], 3);
        let result = join(party, &user("b")).unwrap();

        assert_eq!(result.value.members, vec![user("a"), user("b")]);
        assert_eq!(
            result.effects[0],
            Effect::notify(
                user("a"),
                Notice::MemberJoined {
                    party_title: "Ranked night".to_string(),
                    member: user("b"),
                }
            )
        );
        assert!(result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::RefreshListing { .. })));
    }

    #[test]
    fn test_join_until_full() {
        // maxMembers=2, creator A: B joins, then C is refused
        let party = open_party(&["a"], 2);
        let party = join(party, &user("b")).unwrap().value;
        assert_eq!(party.member_count(), 2);

        assert_eq!(join(party, &user("c")).unwrap_err(), PartyError::PartyFull);
    }

    #[test]
    fn test_join_preconditions() {
        let party = open_party(&["a", "b"], 4);
        assert_eq!(
            join(party.clone(), &user("b")).unwrap_err(),
            PartyError::AlreadyMember
        );

        let mut closed = party.clone();
        closed.status = PartyStatus::Closed;
        assert_eq!(join(closed, &user("c")).unwrap_err(), PartyError::NotOpen);

        let mut gated = party;
        gated.requirements = vec![Requirement::new("Rank", None)];
        assert_eq!(
            join(gated, &user("c")).unwrap_err(),
            PartyError::ApplicationRequired
        );
    }

    #[test]
    fn test_leave() {
        let party = open_party(&["a", "b", "c"], 4);

        let result = leave(party.clone(), &user("b")).unwrap();
        assert_eq!(result.value.members, vec![user("a"), user("c")]);
        assert_eq!(result.effects[0].recipient(), Some(&user("a")));

        assert_eq!(
            leave(party.clone(), &user("a")).unwrap_err(),
            PartyError::CannotLeaveOwnParty
        );
        assert_eq!(
            leave(party, &user("z")).unwrap_err(),
            PartyError::NotAMember
        );
    }

    #[test]
    fn test_leave_closed_party_is_allowed() {
        let mut party = open_party(&["a", "b"], 4);
        party.status = PartyStatus::Closed;
        let result = leave(party, &user("b")).unwrap();
        assert_eq!(result.value.status, PartyStatus::Closed);
        assert_eq!(result.value.members, vec![user("a")]);
    }

    #[test]
    fn test_close_is_creator_only_and_idempotent() {
        let party = open_party(&["a", "b"], 4);
        assert_eq!(
            close(party.clone(), &user("b")).unwrap_err(),
            PartyError::Forbidden
        );

        let closed = close(party, &user("a")).unwrap().value;
        assert_eq!(closed.status, PartyStatus::Closed);

        let again = close(closed.clone(), &user("a")).unwrap();
        assert_eq!(again.value, closed);
        assert!(again.effects.is_empty());

        // Creator is re-validated on the repeated call
        assert_eq!(close(closed, &user("b")).unwrap_err(), PartyError::Forbidden);
    }

    #[test]
    fn test_delete_returns_other_members_and_keeps_record() {
        // Open party with members [A,B,C]: notify-list is [B,C]
        let party = open_party(&["a", "b", "c"], 4);
        let result = delete(party, &user("a")).unwrap();

        assert_eq!(result.value.party.status, PartyStatus::Deleted);
        assert_eq!(result.value.notified, vec![user("b"), user("c")]);
        assert_eq!(
            result.value.party.members,
            vec![user("a"), user("b"), user("c")]
        );
        let recipients: Vec<_> = result.effects.iter().filter_map(Effect::recipient).collect();
        assert_eq!(recipients, vec![&user("b"), &user("c")]);
    }

    #[test]
    fn test_delete_terminal_states() {
        let party = open_party(&["a", "b"], 4);
        assert_eq!(
            delete(party.clone(), &user("b")).unwrap_err(),
            PartyError::Forbidden
        );

        let deleted = delete(party.clone(), &user("a")).unwrap().value.party;
        let again = delete(deleted, &user("a")).unwrap();
        assert!(again.value.notified.is_empty());
        assert!(again.effects.is_empty());

        let closed = close(party, &user("a")).unwrap().value;
        assert_eq!(delete(closed, &user("a")).unwrap_err(), PartyError::NotOpen);
    }

    #[test]
    fn test_kick() {
        let party = open_party(&["a", "b", "c"], 4);

        let result = kick(party.clone(), &user("a"), &user("c")).unwrap();
        assert_eq!(result.value.members, vec![user("a"), user("b")]);
        assert_eq!(result.effects[0].recipient(), Some(&user("c")));

        assert_eq!(
            kick(party.clone(), &user("b"), &user("c")).unwrap_err(),
            PartyError::Forbidden
        );
        assert_eq!(
            kick(party.clone(), &user("a"), &user("a")).unwrap_err(),
            PartyError::CannotKickSelf
        );
        assert_eq!(
            kick(party, &user("a"), &user("z")).unwrap_err(),
            PartyError::NotAMember
        );
    }

    #[test]
    fn test_announce_fans_out_to_other_members() {
        let party = open_party(&["a", "b", "c"], 4);
        let result = announce(&party, &user("a"), "  Lobby in 5  ").unwrap();

        assert_eq!(result.value, vec![user("b"), user("c")]);
        assert_eq!(result.effects.len(), 2);
        match &result.effects[0] {
            Effect::Notify {
                notice: Notice::PartyMessage { body, .. },
                ..
            } => assert_eq!(body, "Lobby in 5"),
            other => panic!("unexpected effect {:?}", other),
        }

        assert_eq!(
            announce(&party, &user("b"), "hi").unwrap_err(),
            PartyError::Forbidden
        );
        assert!(announce(&party, &user("a"), "   ").is_err());
    }

    #[test]
    fn test_attach_origin_message() {
        let party = open_party(&["a"], 4);
        assert_eq!(
            attach_origin_message(party.clone(), &user("b"), "msg-9").unwrap_err(),
            PartyError::Forbidden
        );
        let party = attach_origin_message(party, &user("a"), "msg-9").unwrap().value;
        assert_eq!(party.origin_message_id.as_deref(), Some("msg-9"));
    }
}
