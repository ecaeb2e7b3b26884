use crate::model::{ElectionResultsResponse, ParticipationResponse};
use crate::tally::{self, ItemTally};
use super::{ElectionError, ElectionOperations};

impl ElectionOperations {
    pub(super) async fn item_tally(&self, voting_item_id: &str) -> Result<ItemTally, ElectionError> {
        let item = self.db.select_voting_item(voting_item_id)
            .await?
            .ok_or(ElectionError::VotingItemNotFound)?;

        let options = self.db.select_options(voting_item_id).await?;
        let votes = self.db.select_votes(voting_item_id).await?;
        let ballots = self.db.select_ballots(voting_item_id).await?;

        Ok(tally::tally_item(&item, &options, &votes, &ballots))
    }

    pub(super) async fn election_participation(&self, election_id: &str)
    -> Result<ParticipationResponse, ElectionError> {
        self.db.select_election(election_id)
            .await?
            .ok_or(ElectionError::ElectionNotFound)?;

        let voters = self.db.select_voters(election_id).await?;
        Ok(tally::participation(election_id, &voters).into())
    }

    pub(super) async fn election_results(&self, election_id: &str)
    -> Result<ElectionResultsResponse, ElectionError> {
        self.db.select_election(election_id)
            .await?
            .ok_or(ElectionError::ElectionNotFound)?;

        let items = self.db.select_voting_items(election_id).await?;
        let options = self.db.select_election_options(election_id).await?;
        let votes = self.db.select_election_votes(election_id).await?;
        let ballots = self.db.select_election_ballots(election_id).await?;
        let voters = self.db.select_voters(election_id).await?;

        let items = items.iter()
            .map(|item| tally::tally_item(item, &options, &votes, &ballots))
            .collect();

        Ok(ElectionResultsResponse {
            election_id: election_id.to_owned(),
            items,
            participation: tally::participation(election_id, &voters).into(),
        })
    }
}
