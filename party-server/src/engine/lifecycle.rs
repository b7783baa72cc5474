//! Party lifecycle operations.

use tracing::info;

use super::{Outcome, PartyService};
use party_core::{transition, Party, PartyDeletion, PartyError, PartyId, UserId};

impl PartyService {
    pub async fn join(&self, party_id: &PartyId, user: &UserId) -> Result<Outcome<Party>, PartyError> {
        let outcome = self
            .mutate_party(party_id, "join", |party| transition::join(party, user))
            .await?;
        info!(
            "User {} joined party {} ({}/{})",
            user,
            party_id,
            outcome.value.member_count(),
            outcome.value.max_members
        );
        Ok(outcome)
    }

    pub async fn leave(
        &self,
        party_id: &PartyId,
        user: &UserId,
    ) -> Result<Outcome<Party>, PartyError> {
        let outcome = self
            .mutate_party(party_id, "leave", |party| transition::leave(party, user))
            .await?;
        info!("User {} left party {}", user, party_id);
        Ok(outcome)
    }

    pub async fn close(
        &self,
        party_id: &PartyId,
        requester: &UserId,
    ) -> Result<Outcome<Party>, PartyError> {
        let outcome = self
            .mutate_party(party_id, "close", |party| transition::close(party, requester))
            .await?;
        info!("Party {} closed by {}", party_id, requester);
        Ok(outcome)
    }

    /// Mark the party deleted. The returned deletion lists the members the
    /// caller should tell.
    pub async fn delete(
        &self,
        party_id: &PartyId,
        requester: &UserId,
    ) -> Result<Outcome<PartyDeletion>, PartyError> {
        let outcome = self
            .mutate_party(party_id, "delete", |party| {
                transition::delete(party, requester)
            })
            .await?;
        info!(
            "Party {} deleted by {} ({} members to notify)",
            party_id,
            requester,
            outcome.value.notified.len()
        );
        Ok(outcome)
    }

    pub async fn kick(
        &self,
        party_id: &PartyId,
        requester: &UserId,
        target: &UserId,
    ) -> Result<Outcome<Party>, PartyError> {
        let outcome = self
            .mutate_party(party_id, "kick", |party| {
                transition::kick(party, requester, target)
            })
            .await?;
        info!("User {} removed from party {} by {}", target, party_id, requester);
        Ok(outcome)
    }

    /// Message every other member. Nothing is written.
    pub async fn announce(
        &self,
        party_id: &PartyId,
        requester: &UserId,
        body: &str,
    ) -> Result<Outcome<Vec<UserId>>, PartyError> {
        let party = self.load_party(party_id).await?;
        let sent = transition::announce(&party, requester, body)?;
        info!(
            "Creator {} messaged {} members of party {}",
            requester,
            sent.value.len(),
            party_id
        );
        Ok(Outcome::committed(sent.value, sent.effects))
    }

    /// Remember the id of the posted party card.
    pub async fn attach_origin_message(
        &self,
        party_id: &PartyId,
        requester: &UserId,
        message_id: &str,
    ) -> Result<Outcome<Party>, PartyError> {
        self.mutate_party(party_id, "attach_origin_message", |party| {
            transition::attach_origin_message(party, requester, message_id)
        })
        .await
    }
}
