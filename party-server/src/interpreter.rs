//! Effect interpreter: delivers the effects an engine operation returned.
//!
//! Effects are only handed here after the record write committed. Every
//! failure is logged and dropped; nothing in this module reports back to the
//! operation that produced the effect.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::notifier::{Listing, Notifier};
use crate::repository::RecordStore;
use party_core::{Effect, LogLevel, Notice, PartyId};

/// Outcome of executing one effect.
#[derive(Debug, PartialEq, Eq)]
pub enum EffectResult {
    Delivered,
    Skipped,
    Failed(String),
}

/// Delivers effects through a notifier.
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    records: Arc<dyn RecordStore>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, records: Arc<dyn RecordStore>) -> Self {
        Self { notifier, records }
    }

    /// Run the effects in the background. Returns immediately.
    pub fn dispatch(self: &Arc<Self>, effects: Vec<Effect>) {
        if effects.is_empty() {
            return;
        }
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.execute_effects(effects).await;
        });
    }

    /// Execute effects in order. A failed effect does not stop the rest.
    pub async fn execute_effects(&self, effects: Vec<Effect>) -> Vec<EffectResult> {
        let mut results = Vec::with_capacity(effects.len());
        for effect in effects {
            let result = self.execute_effect(effect).await;
            if let EffectResult::Failed(err) = &result {
                error!("Effect delivery failed: {}", err);
            }
            results.push(result);
        }
        results
    }

    async fn execute_effect(&self, effect: Effect) -> EffectResult {
        match effect {
            Effect::Notify { recipient, notice } => {
                let text = format_notice(&notice);
                match self.notifier.send_direct(&recipient, &text).await {
                    Ok(()) => EffectResult::Delivered,
                    Err(e) => EffectResult::Failed(format!(
                        "Failed to message {}: {}",
                        recipient, e
                    )),
                }
            }

            Effect::RefreshListing { party_id } => self.refresh_listing(&party_id).await,

            Effect::Log { level, message } => {
                match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => info!("{}", message),
                    LogLevel::Warn => warn!("{}", message),
                    LogLevel::Error => error!("{}", message),
                }
                EffectResult::Delivered
            }
        }
    }

    /// Redraw from the stored record so a late refresh never shows stale data.
    async fn refresh_listing(&self, party_id: &PartyId) -> EffectResult {
        let party = match self.records.get_party(party_id).await {
            Ok(Some(party)) => party,
            Ok(None) => {
                return EffectResult::Failed(format!("Party {} vanished before refresh", party_id))
            }
            Err(e) => {
                return EffectResult::Failed(format!(
                    "Failed to load party {} for refresh: {}",
                    party_id, e
                ))
            }
        };

        let Some(listing) = Listing::for_party(&party) else {
            return EffectResult::Skipped;
        };
        match self.notifier.update_listing(&listing).await {
            Ok(()) => EffectResult::Delivered,
            Err(e) => EffectResult::Failed(format!(
                "Failed to refresh listing for party {}: {}",
                party_id, e
            )),
        }
    }
}

/// Text of a direct message.
pub fn format_notice(notice: &Notice) -> String {
    match notice {
        Notice::MemberJoined {
            party_title,
            member,
        } => format!("{} joined your party **{}**.", member, party_title),

        Notice::MemberLeft {
            party_title,
            member,
        } => format!("{} left your party **{}**.", member, party_title),

        Notice::RemovedByLeader { party_title } => {
            format!("You were removed from **{}** by its leader.", party_title)
        }

        Notice::ApplicationReceived {
            application_id,
            party_title,
            applicant,
            applicant_display_name,
            answers,
        } => {
            let mut text = format!(
                "New application for **{}** from {} ({}):\n",
                party_title, applicant_display_name, applicant
            );
            for answer in answers {
                text.push_str(&format!("- {}: {}\n", answer.requirement, answer.answer));
            }
            text.push_str(&format!(
                "\nReply `!party approve {}` or `!party reject {}`.",
                application_id, application_id
            ));
            text
        }

        Notice::ApplicationApproved { party_title } => {
            format!("Your application to **{}** was approved. Welcome!", party_title)
        }

        Notice::ApplicationRejected { party_title } => {
            format!("Your application to **{}** was not accepted.", party_title)
        }

        Notice::PartyDeleted { party_title } => {
            format!("**{}** was deleted by its leader.", party_title)
        }

        Notice::PartyMessage {
            party_title,
            from,
            body,
        } => format!("Message from {} in **{}**:\n{}", from, party_title, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::testing::RecordingNotifier;
    use crate::repository::{ExpectedVersion, InMemoryRepository};
    use chrono::Utc;
    use party_core::{Answer, ApplicationId, Party, PartyStatus, UserId};

    fn party(origin: Option<&str>) -> Party {
        Party {
            id: PartyId::from("p1"),
            creator: UserId::from("a"),
            context_id: "chan-1".to_string(),
            origin_message_id: origin.map(str::to_string),
            title: "Ranked night".to_string(),
            description: None,
            max_members: 4,
            requirements: vec![],
            members: vec![UserId::from("a")],
            status: PartyStatus::Open,
            created_at: Utc::now(),
            version: 0,
        }
    }

    async fn dispatcher_with(
        notifier: Arc<RecordingNotifier>,
        stored: Option<Party>,
    ) -> Dispatcher {
        let records = Arc::new(InMemoryRepository::new());
        if let Some(party) = stored {
            records
                .put_party(party, ExpectedVersion::Absent)
                .await
                .unwrap();
        }
        Dispatcher::new(notifier, records)
    }

    #[test]
    fn test_format_application_received() {
        let text = format_notice(&Notice::ApplicationReceived {
            application_id: ApplicationId::from("app-7"),
            party_title: "Ranked night".to_string(),
            applicant: UserId::from("b"),
            applicant_display_name: "Bee".to_string(),
            answers: vec![Answer {
                requirement: "Rank".to_string(),
                answer: "Gold".to_string(),
            }],
        });
        assert!(text.contains("Ranked night"));
        assert!(text.contains("Bee"));
        assert!(text.contains("- Rank: Gold"));
        assert!(text.contains("!party approve app-7"));
    }

    #[test]
    fn test_format_party_message() {
        let text = format_notice(&Notice::PartyMessage {
            party_title: "Ranked night".to_string(),
            from: UserId::from("a"),
            body: "Lobby in 5".to_string(),
        });
        assert_eq!(text, "Message from a in **Ranked night**:\nLobby in 5");
    }

    #[tokio::test]
    async fn test_notify_is_sent() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher_with(notifier.clone(), None).await;

        let results = dispatcher
            .execute_effects(vec![Effect::notify(
                UserId::from("b"),
                Notice::ApplicationApproved {
                    party_title: "Ranked night".to_string(),
                },
            )])
            .await;
        assert_eq!(results, vec![EffectResult::Delivered]);

        let sent = notifier.direct.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, UserId::from("b"));
        assert!(sent[0].1.contains("approved"));
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_stop_later_effects() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let dispatcher = dispatcher_with(notifier.clone(), Some(party(Some("msg-1")))).await;

        let results = dispatcher
            .execute_effects(vec![
                Effect::notify(
                    UserId::from("a"),
                    Notice::MemberLeft {
                        party_title: "Ranked night".to_string(),
                        member: UserId::from("b"),
                    },
                ),
                Effect::RefreshListing {
                    party_id: PartyId::from("p1"),
                },
            ])
            .await;

        assert!(matches!(results[0], EffectResult::Failed(_)));
        assert_eq!(results[1], EffectResult::Delivered);
        assert_eq!(notifier.listings.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_skips_unposted_party() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher_with(notifier.clone(), Some(party(None))).await;

        let results = dispatcher
            .execute_effects(vec![Effect::RefreshListing {
                party_id: PartyId::from("p1"),
            }])
            .await;
        assert_eq!(results, vec![EffectResult::Skipped]);
        assert!(notifier.listings.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_of_missing_party_fails_quietly() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher_with(notifier, None).await;

        let results = dispatcher
            .execute_effects(vec![
                Effect::RefreshListing {
                    party_id: PartyId::from("ghost"),
                },
                Effect::info("still runs"),
            ])
            .await;
        assert!(matches!(results[0], EffectResult::Failed(_)));
        assert_eq!(results[1], EffectResult::Delivered);
    }
}
