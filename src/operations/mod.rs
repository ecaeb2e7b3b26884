mod ballot;
mod catalog;
mod registry;
mod results;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast::Receiver;

use crate::db::{ElectionStore, StoreError};
use crate::events::{VoteEvent, VoteFeed};
use crate::model::*;
use crate::state::{InvalidTransition, Status};
use crate::tally::ItemTally;

#[cfg(test)]
use mockall::automock;

#[derive(Error, Debug)]
pub enum ElectionError {
    #[error("election not found")]
    ElectionNotFound,
    #[error("session not found")]
    SessionNotFound,
    #[error("voting item not found")]
    VotingItemNotFound,
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("voting items can only be added while the session is upcoming")]
    SessionNotUpcoming,
    #[error("{0}")]
    Invalid(String),
    #[error("storage failure")]
    Storage,
}

impl From<StoreError> for ElectionError {
    fn from(e: StoreError) -> Self {
        log_store_error(e);
        Self::Storage
    }
}

#[derive(Error, Debug)]
pub enum VoterError {
    #[error("election not found")]
    ElectionNotFound,
    #[error("voter not found")]
    VoterNotFound,
    #[error("voter name must not be empty")]
    EmptyName,
    #[error("voter id already registered: [{0}]")]
    Conflict(String),
    #[error("storage failure")]
    Storage,
}

impl From<StoreError> for VoterError {
    fn from(e: StoreError) -> Self {
        log_store_error(e);
        Self::Storage
    }
}

#[derive(Error, Debug)]
pub enum BallotError {
    #[error("unknown voter")]
    Unauthenticated,
    #[error("voting item not found")]
    VotingItemNotFound,
    #[error("voter is not registered for this election")]
    VoterMismatch,
    #[error("voting is closed for this session")]
    VotingClosed,
    #[error("selected {selected} options, allowed 1 to {max}")]
    InvalidSelectionCount { selected: usize, max: i32 },
    #[error("option selected twice: [{0}]")]
    DuplicateSelection(String),
    #[error("invalid option: [{0}]")]
    OptionNotFound(String),
    #[error("voter has already voted on this item")]
    DuplicateVote,
    #[error("storage failure")]
    Storage,
}

impl From<StoreError> for BallotError {
    fn from(e: StoreError) -> Self {
        log_store_error(e);
        Self::Storage
    }
}

fn log_store_error(e: StoreError) {
    error!("unexpected store error: {:?}", e);
    if let StoreError::Database(e) = e {
        if let Some(e) = e.into_database_error() {
            error!("{}", e.message())
        }
    };
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ElectionOperationsT {
    async fn post_election(&self, request: &PostElectionRequest) -> Result<ElectionSummary, ElectionError>;
    async fn get_election(&self, id: &str) -> Result<GetElectionResponse, ElectionError>;
    async fn list_elections(&self, campus: Option<String>) -> Result<Vec<ElectionSummary>, ElectionError>;
    async fn put_election_status(&self, id: &str, status: Status) -> Result<ElectionSummary, ElectionError>;
    async fn post_session(&self, election_id: &str, request: &PostSessionRequest) -> Result<SessionSummary, ElectionError>;
    async fn put_session_status(&self, id: &str, status: Status) -> Result<SessionSummary, ElectionError>;
    async fn post_voting_item(&self, session_id: &str, request: &PostVotingItemRequest) -> Result<VotingItemSummary, ElectionError>;

    async fn post_voter(&self, election_id: &str, request: &PostVoterRequest) -> Result<VoterSummary, VoterError>;
    async fn delete_voter(&self, election_id: &str, voter_id: &str) -> Result<(), VoterError>;
    async fn list_voters(&self, election_id: &str) -> Result<Vec<VoterSummary>, VoterError>;
    async fn list_non_voters(&self, election_id: &str) -> Result<Vec<VoterSummary>, VoterError>;

    async fn post_ballot(&self,
        identity: &Identity,
        voting_item_id: &str,
        request: &PostBallotRequest
    ) -> Result<PostBallotResponse, BallotError>;

    async fn get_tally(&self, voting_item_id: &str) -> Result<ItemTally, ElectionError>;
    async fn get_participation(&self, election_id: &str) -> Result<ParticipationResponse, ElectionError>;
    async fn get_results(&self, election_id: &str) -> Result<ElectionResultsResponse, ElectionError>;

    fn subscribe_votes(&self) -> Receiver<VoteEvent>;
}

#[derive(Clone)]
pub struct ElectionOperations {
    db: Arc<dyn ElectionStore>,
    feed: VoteFeed,
}

impl ElectionOperations {
    pub fn new(db: Arc<dyn ElectionStore>, feed: VoteFeed) -> ElectionOperations {
        ElectionOperations {
            db,
            feed,
        }
    }
}

#[async_trait]
impl ElectionOperationsT for ElectionOperations {
    async fn post_election(&self, request: &PostElectionRequest) -> Result<ElectionSummary, ElectionError> {
        self.create_election(request).await
    }

    async fn get_election(&self, id: &str) -> Result<GetElectionResponse, ElectionError> {
        self.election_detail(id).await
    }

    async fn list_elections(&self, campus: Option<String>) -> Result<Vec<ElectionSummary>, ElectionError> {
        let elections = self.db.select_elections(campus.as_deref()).await?;
        Ok(elections.into_iter().map(ElectionSummary::from).collect())
    }

    async fn put_election_status(&self, id: &str, status: Status) -> Result<ElectionSummary, ElectionError> {
        self.advance_election(id, status).await
    }

    async fn post_session(&self, election_id: &str, request: &PostSessionRequest) -> Result<SessionSummary, ElectionError> {
        self.create_session(election_id, request).await
    }

    async fn put_session_status(&self, id: &str, status: Status) -> Result<SessionSummary, ElectionError> {
        self.advance_session(id, status).await
    }

    async fn post_voting_item(&self, session_id: &str, request: &PostVotingItemRequest) -> Result<VotingItemSummary, ElectionError> {
        self.create_voting_item(session_id, request).await
    }

    async fn post_voter(&self, election_id: &str, request: &PostVoterRequest) -> Result<VoterSummary, VoterError> {
        self.create_voter(election_id, request).await
    }

    async fn delete_voter(&self, election_id: &str, voter_id: &str) -> Result<(), VoterError> {
        self.remove_voter(election_id, voter_id).await
    }

    async fn list_voters(&self, election_id: &str) -> Result<Vec<VoterSummary>, VoterError> {
        self.voters(election_id, false).await
    }

    async fn list_non_voters(&self, election_id: &str) -> Result<Vec<VoterSummary>, VoterError> {
        self.voters(election_id, true).await
    }

    async fn post_ballot(&self,
        identity: &Identity,
        voting_item_id: &str,
        request: &PostBallotRequest
    ) -> Result<PostBallotResponse, BallotError> {
        self.cast_ballot(identity, voting_item_id, request).await
    }

    async fn get_tally(&self, voting_item_id: &str) -> Result<ItemTally, ElectionError> {
        self.item_tally(voting_item_id).await
    }

    async fn get_participation(&self, election_id: &str) -> Result<ParticipationResponse, ElectionError> {
        self.election_participation(election_id).await
    }

    async fn get_results(&self, election_id: &str) -> Result<ElectionResultsResponse, ElectionError> {
        self.election_results(election_id).await
    }

    fn subscribe_votes(&self) -> Receiver<VoteEvent> {
        self.feed.subscribe()
    }
}
