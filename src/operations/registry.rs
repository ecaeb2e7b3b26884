use crate::{db, util};
use crate::db::StoreError;
use crate::model::{PostVoterRequest, VoterSummary};
use super::{ElectionOperations, VoterError};

impl ElectionOperations {
    pub(super) async fn create_voter(&self, election_id: &str, request: &PostVoterRequest)
    -> Result<VoterSummary, VoterError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(VoterError::EmptyName);
        }

        self.db.select_election(election_id)
            .await?
            .ok_or(VoterError::ElectionNotFound)?;

        let voter_id = request.voter_id.as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(util::new_id);

        let voter = db::Voter {
            id: voter_id,
            election_id: election_id.to_owned(),
            name: name.to_owned(),
            email: request.email.clone(),
            has_voted: false,
        };
        let stored = match self.db.insert_voter(&voter).await {
            Ok(stored) => stored,
            Err(StoreError::Conflict) => return Err(VoterError::Conflict(voter.id)),
            Err(StoreError::NotFound) => return Err(VoterError::ElectionNotFound),
            Err(e) => return Err(e.into()),
        };

        info!("Registered voter_id={},election_id={},has_voted={}", stored.id, election_id, stored.has_voted);
        Ok(VoterSummary::from(stored))
    }

    /// Removes the voter only. Ballots and votes already cast stay in place
    /// and keep counting in tallies. Registering the id again restores
    /// `has_voted` from those ballots.
    pub(super) async fn remove_voter(&self, election_id: &str, voter_id: &str) -> Result<(), VoterError> {
        if !self.db.delete_voter(election_id, voter_id).await? {
            return Err(VoterError::VoterNotFound);
        }
        info!("Deleted voter_id={},election_id={}", voter_id, election_id);
        Ok(())
    }

    pub(super) async fn voters(&self, election_id: &str, only_non_voters: bool)
    -> Result<Vec<VoterSummary>, VoterError> {
        self.db.select_election(election_id)
            .await?
            .ok_or(VoterError::ElectionNotFound)?;

        let voters = self.db.select_voters(election_id).await?;
        Ok(voters.into_iter()
            .filter(|v| !(only_non_voters && v.has_voted))
            .map(VoterSummary::from)
            .collect())
    }
}
