//! Application workflow: submit, then approve or reject.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::lifecycle::{admit, check_can_enter};
use super::{Transition, TransitionResult};
use crate::effect::{Effect, Notice};
use crate::error::{Entity, PartyError};
use crate::model::{
    Application, ApplicationId, ApplicationStatus, Decision, Party, PartyStatus, UserId,
};
use crate::validation;

/// A filled-in application form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationRequest {
    pub applicant: UserId,
    /// Name shown to the party creator. Blank falls back to the user id.
    pub display_name: String,
    /// Requirement name to answer. Keys match requirement names ignoring case.
    pub responses: HashMap<String, String>,
}

/// Result of a decision. `party` is the party after the decision; it only
/// differs from the input when an approval added the applicant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decided {
    pub party: Party,
    pub application: Application,
}

/// Create a pending application.
///
/// `has_pending` tells whether the applicant already has a pending
/// application for this party; the store enforces it again on insert.
pub fn submit(
    party: &Party,
    request: ApplicationRequest,
    has_pending: bool,
    id: ApplicationId,
    now: DateTime<Utc>,
) -> TransitionResult<Application> {
    check_can_enter(party, &request.applicant)?;
    if has_pending {
        return Err(PartyError::DuplicatePending);
    }
    if !party.has_requirements() {
        return Err(PartyError::validation(
            "This party has no requirements. Join it directly instead.",
        ));
    }
    let answers = validation::answers(&party.requirements, &request.responses)?;

    let display_name = match request.display_name.trim() {
        "" => request.applicant.to_string(),
        name => name.to_string(),
    };
    let application = Application {
        id,
        party_id: party.id.clone(),
        applicant: request.applicant,
        applicant_display_name: display_name,
        answers,
        status: ApplicationStatus::Pending,
        applied_at: now,
        version: 0,
    };

    let effects = vec![Effect::notify(
        party.creator.clone(),
        Notice::ApplicationReceived {
            application_id: application.id.clone(),
            party_title: party.title.clone(),
            applicant: application.applicant.clone(),
            applicant_display_name: application.applicant_display_name.clone(),
            answers: application.answers.clone(),
        },
    )];
    Ok(Transition::new(application, effects))
}

/// Approve or reject a pending application.
///
/// Anyone but the party creator gets `NotFound(Application)`, so a stranger
/// cannot learn which application ids exist.
pub fn decide(
    party: Party,
    mut application: Application,
    decider: &UserId,
    decision: Decision,
) -> TransitionResult<Decided> {
    if application.party_id != party.id || !party.is_creator(decider) {
        return Err(PartyError::NotFound(Entity::Application));
    }
    if application.status.is_terminal() {
        return Err(PartyError::AlreadyDecided);
    }

    if party.is_member(&application.applicant) {
        // A previous approval added the member but its application write
        // was lost. Status must match membership, so either verdict
        // completes it as approved.
        application.status = ApplicationStatus::Approved;
        let effects = vec![
            Effect::notify(
                application.applicant.clone(),
                Notice::ApplicationApproved {
                    party_title: party.title.clone(),
                },
            ),
            Effect::info(format!(
                "Application {} completed as approved for existing member {} ({:?} requested)",
                application.id, application.applicant, decision
            )),
        ];
        return Ok(Transition::new(Decided { party, application }, effects));
    }

    match decision {
        Decision::Reject => {
            application.status = ApplicationStatus::Rejected;
            let effects = vec![Effect::notify(
                application.applicant.clone(),
                Notice::ApplicationRejected {
                    party_title: party.title.clone(),
                },
            )];
            Ok(Transition::new(Decided { party, application }, effects))
        }
        Decision::Approve => {
            if party.status != PartyStatus::Open {
                return Err(PartyError::NotOpen);
            }
            if party.is_full() {
                return Err(PartyError::PartyFull);
            }

            let party = admit(party, application.applicant.clone());
            application.status = ApplicationStatus::Approved;
            let effects = vec![
                Effect::notify(
                    application.applicant.clone(),
                    Notice::ApplicationApproved {
                        party_title: party.title.clone(),
                    },
                ),
                Effect::RefreshListing {
                    party_id: party.id.clone(),
                },
            ];
            Ok(Transition::new(Decided { party, application }, effects))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{gated_party, user};
    use super::*;

    fn request(applicant: &str, pairs: &[(&str, &str)]) -> ApplicationRequest {
        ApplicationRequest {
            applicant: user(applicant),
            display_name: format!("{} (display)", applicant),
            responses: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn submitted(party: &Party, applicant: &str) -> Application {
        submit(
            party,
            request(applicant, &[("Rank", "Gold")]),
            false,
            ApplicationId::from(format!("app-{}", applicant)),
            Utc::now(),
        )
        .unwrap()
        .value
    }

    #[test]
    fn test_submit_creates_pending_and_notifies_creator() {
        let party = gated_party(&["a"], 4);
        let result = submit(
            &party,
            request("b", &[("rank", "Gold")]),
            false,
            ApplicationId::from("app-1"),
            Utc::now(),
        )
        .unwrap();

        let app = result.value;
        assert_eq!(app.status, ApplicationStatus::Pending);
        assert_eq!(app.party_id, party.id);
        assert_eq!(app.answer_for("Rank"), Some("Gold"));
        assert_eq!(app.applicant_display_name, "b (display)");

        assert_eq!(result.effects.len(), 1);
        match &result.effects[0] {
            Effect::Notify {
                recipient,
                notice: Notice::ApplicationReceived { application_id, answers, .. },
            } => {
                assert_eq!(recipient, &user("a"));
                assert_eq!(application_id, &ApplicationId::from("app-1"));
                assert_eq!(answers.len(), 1);
            }
            other => panic!("unexpected effect {:?}", other),
        }
    }

    #[test]
    fn test_submit_preconditions_in_order() {
        let party = gated_party(&["a", "b"], 2);
        // Member check comes before the capacity check
        assert_eq!(
            submit(&party, request("b", &[("Rank", "x")]), false, ApplicationId::from("x"), Utc::now())
                .unwrap_err(),
            PartyError::AlreadyMember
        );
        assert_eq!(
            submit(&party, request("c", &[("Rank", "x")]), false, ApplicationId::from("x"), Utc::now())
                .unwrap_err(),
            PartyError::PartyFull
        );

        let party = gated_party(&["a"], 4);
        assert_eq!(
            submit(&party, request("c", &[("Rank", "x")]), true, ApplicationId::from("x"), Utc::now())
                .unwrap_err(),
            PartyError::DuplicatePending
        );

        let mut closed = party.clone();
        closed.status = PartyStatus::Closed;
        assert_eq!(
            submit(&closed, request("c", &[("Rank", "x")]), false, ApplicationId::from("x"), Utc::now())
                .unwrap_err(),
            PartyError::NotOpen
        );
    }

    #[test]
    fn test_submit_validates_answers() {
        let party = gated_party(&["a"], 4);
        let err = submit(
            &party,
            request("c", &[("Rank", "Gold"), ("Agent", "Sage")]),
            false,
            ApplicationId::from("x"),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, PartyError::Validation(_)));

        let mut open = party;
        open.requirements.clear();
        assert!(matches!(
            submit(&open, request("c", &[]), false, ApplicationId::from("x"), Utc::now()),
            Err(PartyError::Validation(_))
        ));
    }

    #[test]
    fn test_blank_display_name_falls_back_to_user_id() {
        let party = gated_party(&["a"], 4);
        let mut req = request("c", &[("Rank", "Gold")]);
        req.display_name = "   ".to_string();
        let app = submit(&party, req, false, ApplicationId::from("x"), Utc::now())
            .unwrap()
            .value;
        assert_eq!(app.applicant_display_name, "c");
    }

    #[test]
    fn test_approve_adds_member_and_notifies_applicant() {
        let party = gated_party(&["a"], 4);
        let app = submitted(&party, "b");

        let result = decide(party, app, &user("a"), Decision::Approve).unwrap();
        assert_eq!(result.value.application.status, ApplicationStatus::Approved);
        assert_eq!(result.value.party.members, vec![user("a"), user("b")]);
        assert_eq!(result.effects[0].recipient(), Some(&user("b")));
    }

    #[test]
    fn test_reject_leaves_party_untouched() {
        let party = gated_party(&["a"], 4);
        let app = submitted(&party, "b");

        let result = decide(party.clone(), app, &user("a"), Decision::Reject).unwrap();
        assert_eq!(result.value.application.status, ApplicationStatus::Rejected);
        assert_eq!(result.value.party, party);
        assert!(matches!(
            &result.effects[0],
            Effect::Notify {
                notice: Notice::ApplicationRejected { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_non_creator_sees_not_found() {
        let party = gated_party(&["a"], 4);
        let app = submitted(&party, "b");
        assert_eq!(
            decide(party, app, &user("b"), Decision::Approve).unwrap_err(),
            PartyError::NotFound(Entity::Application)
        );
    }

    #[test]
    fn test_decided_application_cannot_be_decided_again() {
        let party = gated_party(&["a"], 4);
        let app = submitted(&party, "b");
        let decided = decide(party, app, &user("a"), Decision::Reject)
            .unwrap()
            .value;

        for decision in [Decision::Approve, Decision::Reject] {
            assert_eq!(
                decide(
                    decided.party.clone(),
                    decided.application.clone(),
                    &user("a"),
                    decision
                )
                .unwrap_err(),
                PartyError::AlreadyDecided
            );
        }
    }

    #[test]
    fn test_approve_full_party_fails_and_stays_pending() {
        // maxMembers=2 with [A,B]: approving C fails
        let party = gated_party(&["a"], 2);
        let app = submitted(&party, "c");
        let mut party = party;
        party.members.push(user("b"));

        assert_eq!(
            decide(party, app.clone(), &user("a"), Decision::Approve).unwrap_err(),
            PartyError::PartyFull
        );
        assert_eq!(app.status, ApplicationStatus::Pending);
    }

    #[test]
    fn test_approve_on_closed_party_fails() {
        let party = gated_party(&["a"], 4);
        let app = submitted(&party, "b");
        let mut party = party;
        party.status = PartyStatus::Closed;
        assert_eq!(
            decide(party, app, &user("a"), Decision::Approve).unwrap_err(),
            PartyError::NotOpen
        );
    }

    #[test]
    fn test_approve_existing_member_completes_without_duplicate() {
        let party = gated_party(&["a"], 2);
        let app = submitted(&party, "b");
        let mut party = party;
        party.members.push(user("b"));

        let result = decide(party.clone(), app, &user("a"), Decision::Approve).unwrap();
        assert_eq!(result.value.application.status, ApplicationStatus::Approved);
        assert_eq!(result.value.party, party);
        assert_eq!(result.value.party.member_count(), 2);
        // No listing refresh: membership did not change
        assert!(!result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::RefreshListing { .. })));
        assert_eq!(result.effects[0].recipient(), Some(&user("b")));
    }

    #[test]
    fn test_reject_existing_member_completes_as_approved() {
        let party = gated_party(&["a"], 4);
        let app = submitted(&party, "b");
        let mut party = party;
        party.members.push(user("b"));

        let result = decide(party.clone(), app, &user("a"), Decision::Reject).unwrap();
        assert_eq!(result.value.application.status, ApplicationStatus::Approved);
        assert_eq!(result.value.party, party);
        assert!(matches!(
            &result.effects[0],
            Effect::Notify {
                notice: Notice::ApplicationApproved { .. },
                ..
            }
        ));
    }
}
