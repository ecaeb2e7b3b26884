mod memory;
mod transaction;

pub use memory::MemoryDb;
pub use transaction::*;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{
    DateTime,
    offset::Utc,
};
use serde::{Deserialize, Serialize};
use sqlx::{
    Executor,
    FromRow,
    PgPool,
    Row,
    postgres::PgRow,
};
use thiserror::Error;

use crate::state::Status;

const SCHEMA: &str = include_str!("../../schema.sql");

pub type Timestamp = DateTime<Utc>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Election {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub date: Timestamp,
    pub campus: String,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub election_id: String,
    pub name: String,
    pub description: Option<String>,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub status: Status,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Statute,
    Position,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Statute => "statute",
            ItemType::Position => "position",
        }
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "statute" => Ok(ItemType::Statute),
            "position" => Ok(ItemType::Position),
            other => Err(format!("unknown voting item type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingItem {
    pub id: String,
    pub session_id: String,
    pub election_id: String,
    pub title: String,
    pub description: Option<String>,
    pub item_type: ItemType,
    pub allow_abstain: bool,
    pub max_selections: i32,
    pub position: i32,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct VotingOption {
    pub id: String,
    pub voting_item_id: String,
    pub value: String,
    pub description: Option<String>,
    pub position: i32,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Voter {
    pub id: String,
    pub election_id: String,
    pub name: String,
    pub email: Option<String>,
    pub has_voted: bool,
}

/// Receipt for one voter's ballot on one voting item.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub election_id: String,
    pub voter_id: String,
    pub voting_item_id: String,
    pub voting_session_id: String,
    pub abstain: bool,
    pub cast_at: Timestamp,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub id: String,
    pub option_id: String,
    pub voter_id: String,
    pub election_id: String,
    pub voting_session_id: String,
    pub voting_item_id: String,
    pub cast_at: Timestamp,
}

fn try_get_parsed<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where T: FromStr,
      T::Err: std::fmt::Display {
    let text: String = row.try_get(column)?;
    text.parse::<T>()
        .map_err(|e| sqlx::Error::Decode(format!("column {}: {}", column, e).into()))
}

impl<'r> FromRow<'r, PgRow> for Election {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Election {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            date: row.try_get("date")?,
            campus: row.try_get("campus")?,
            status: try_get_parsed(row, "status")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Session {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Session {
            id: row.try_get("id")?,
            election_id: row.try_get("election_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            status: try_get_parsed(row, "status")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for VotingItem {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(VotingItem {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            election_id: row.try_get("election_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            item_type: try_get_parsed(row, "item_type")?,
            allow_abstain: row.try_get("allow_abstain")?,
            max_selections: row.try_get("max_selections")?,
            position: row.try_get("position")?,
        })
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("row conflicts with an existing row")]
    Conflict,
    #[error("referenced row does not exist")]
    NotFound,
    #[error("session is not accepting votes")]
    SessionClosed,
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        let optional_code = e.as_database_error()
            .and_then(|dbe| dbe.code());
        match optional_code.as_deref() {
            Some("23505") => StoreError::Conflict,
            Some("23503") => StoreError::NotFound,
            _ => StoreError::Database(e),
        }
    }
}

/// Persistence for elections and everything hanging off them.
///
/// Every method is atomic on its own. `insert_ballot` in particular writes
/// the ballot receipt, its vote rows and the voter's `has_voted` flag as one
/// unit, and reports a second ballot for the same (voter, item) pair as
/// [`StoreError::Conflict`]. It re-reads the session status inside that unit
/// and fails with [`StoreError::SessionClosed`] unless the session is ongoing.
///
/// Voters are keyed by (election, voter id).
#[async_trait]
pub trait ElectionStore: Send + Sync {
    async fn insert_election(&self, election: &Election) -> Result<(), StoreError>;
    async fn select_election(&self, id: &str) -> Result<Option<Election>, StoreError>;
    async fn select_elections(&self, campus: Option<&str>) -> Result<Vec<Election>, StoreError>;
    /// Compare-and-set; false when the election is missing or not in `from`.
    async fn update_election_status(&self, id: &str, from: Status, to: Status) -> Result<bool, StoreError>;

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;
    async fn select_session(&self, id: &str) -> Result<Option<Session>, StoreError>;
    async fn select_sessions(&self, election_id: &str) -> Result<Vec<Session>, StoreError>;
    /// Compare-and-set; false when the session is missing or not in `from`.
    async fn update_session_status(&self, id: &str, from: Status, to: Status) -> Result<bool, StoreError>;

    async fn insert_voting_item(&self, item: &VotingItem, options: &[VotingOption]) -> Result<(), StoreError>;
    async fn select_voting_item(&self, id: &str) -> Result<Option<VotingItem>, StoreError>;
    async fn select_voting_items(&self, election_id: &str) -> Result<Vec<VotingItem>, StoreError>;
    async fn select_options(&self, voting_item_id: &str) -> Result<Vec<VotingOption>, StoreError>;
    async fn select_election_options(&self, election_id: &str) -> Result<Vec<VotingOption>, StoreError>;

    /// Returns the stored row. `has_voted` starts true when ballots from an
    /// earlier registration of the same id are still on record.
    async fn insert_voter(&self, voter: &Voter) -> Result<Voter, StoreError>;
    async fn select_voter(&self, election_id: &str, id: &str) -> Result<Option<Voter>, StoreError>;
    /// Whether the id is registered in any election.
    async fn voter_exists(&self, id: &str) -> Result<bool, StoreError>;
    async fn select_voters(&self, election_id: &str) -> Result<Vec<Voter>, StoreError>;
    async fn delete_voter(&self, election_id: &str, id: &str) -> Result<bool, StoreError>;

    async fn insert_ballot(&self, ballot: &Ballot, votes: &[Vote]) -> Result<(), StoreError>;
    async fn select_ballots(&self, voting_item_id: &str) -> Result<Vec<Ballot>, StoreError>;
    async fn select_votes(&self, voting_item_id: &str) -> Result<Vec<Vote>, StoreError>;
    async fn select_election_ballots(&self, election_id: &str) -> Result<Vec<Ballot>, StoreError>;
    async fn select_election_votes(&self, election_id: &str) -> Result<Vec<Vote>, StoreError>;
}

#[derive(Clone)]
pub struct BisoDb {
    pool: PgPool
}

impl BisoDb {
    pub fn new(db_pool: PgPool) -> BisoDb {
        BisoDb{ pool: db_pool }
    }

    pub async fn new_transaction(&self) -> Result<BisoTransaction<'_>, sqlx::Error> {
        BisoTransaction::new(&self.pool).await
    }

    /// Creates any missing tables. Safe to run on every start.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        self.pool.execute(SCHEMA).await?;
        Ok(())
    }
}

#[async_trait]
impl ElectionStore for BisoDb {
    async fn insert_election(&self, election: &Election) -> Result<(), StoreError> {
        let mut tx = self.new_transaction().await?;
        tx.insert_election(election).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn select_election(&self, id: &str) -> Result<Option<Election>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let election = tx.select_election(id).await?;
        tx.commit().await?;
        Ok(election)
    }

    async fn select_elections(&self, campus: Option<&str>) -> Result<Vec<Election>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let elections = tx.select_elections(campus).await?;
        tx.commit().await?;
        Ok(elections)
    }

    async fn update_election_status(&self, id: &str, from: Status, to: Status) -> Result<bool, StoreError> {
        let mut tx = self.new_transaction().await?;
        let updated = tx.update_election_status(id, from, to).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut tx = self.new_transaction().await?;
        tx.insert_session(session).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn select_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let session = tx.select_session(id).await?;
        tx.commit().await?;
        Ok(session)
    }

    async fn select_sessions(&self, election_id: &str) -> Result<Vec<Session>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let sessions = tx.select_sessions(election_id).await?;
        tx.commit().await?;
        Ok(sessions)
    }

    async fn update_session_status(&self, id: &str, from: Status, to: Status) -> Result<bool, StoreError> {
        let mut tx = self.new_transaction().await?;
        let updated = tx.update_session_status(id, from, to).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn insert_voting_item(&self, item: &VotingItem, options: &[VotingOption]) -> Result<(), StoreError> {
        let mut tx = self.new_transaction().await?;
        tx.insert_voting_item(item).await?;
        for option in options {
            tx.insert_option(option).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn select_voting_item(&self, id: &str) -> Result<Option<VotingItem>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let item = tx.select_voting_item(id).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn select_voting_items(&self, election_id: &str) -> Result<Vec<VotingItem>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let items = tx.select_voting_items(election_id).await?;
        tx.commit().await?;
        Ok(items)
    }

    async fn select_options(&self, voting_item_id: &str) -> Result<Vec<VotingOption>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let options = tx.select_options(voting_item_id).await?;
        tx.commit().await?;
        Ok(options)
    }

    async fn select_election_options(&self, election_id: &str) -> Result<Vec<VotingOption>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let options = tx.select_election_options(election_id).await?;
        tx.commit().await?;
        Ok(options)
    }

    async fn insert_voter(&self, voter: &Voter) -> Result<Voter, StoreError> {
        let mut tx = self.new_transaction().await?;
        let stored = tx.insert_voter(voter).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn select_voter(&self, election_id: &str, id: &str) -> Result<Option<Voter>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let voter = tx.select_voter(election_id, id).await?;
        tx.commit().await?;
        Ok(voter)
    }

    async fn voter_exists(&self, id: &str) -> Result<bool, StoreError> {
        let mut tx = self.new_transaction().await?;
        let exists = tx.voter_exists(id).await?;
        tx.commit().await?;
        Ok(exists)
    }

    async fn select_voters(&self, election_id: &str) -> Result<Vec<Voter>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let voters = tx.select_voters(election_id).await?;
        tx.commit().await?;
        Ok(voters)
    }

    async fn delete_voter(&self, election_id: &str, id: &str) -> Result<bool, StoreError> {
        let mut tx = self.new_transaction().await?;
        let deleted = tx.delete_voter(election_id, id).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    async fn insert_ballot(&self, ballot: &Ballot, votes: &[Vote]) -> Result<(), StoreError> {
        let mut tx = self.new_transaction().await?;
        // Held until commit, so a concurrent close waits for this ballot or
        // this ballot sees the closed status.
        if tx.lock_session_status(&ballot.voting_session_id).await? != Some(Status::Ongoing) {
            return Err(StoreError::SessionClosed);
        }
        // Conflict here is the duplicate-vote signal; the dropped transaction rolls back.
        tx.insert_ballot(ballot).await?;
        for vote in votes {
            tx.insert_vote(vote).await?;
        }
        if !tx.mark_voted(&ballot.election_id, &ballot.voter_id).await? {
            return Err(StoreError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }

    async fn select_ballots(&self, voting_item_id: &str) -> Result<Vec<Ballot>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let ballots = tx.select_ballots(voting_item_id).await?;
        tx.commit().await?;
        Ok(ballots)
    }

    async fn select_votes(&self, voting_item_id: &str) -> Result<Vec<Vote>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let votes = tx.select_votes(voting_item_id).await?;
        tx.commit().await?;
        Ok(votes)
    }

    async fn select_election_ballots(&self, election_id: &str) -> Result<Vec<Ballot>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let ballots = tx.select_election_ballots(election_id).await?;
        tx.commit().await?;
        Ok(ballots)
    }

    async fn select_election_votes(&self, election_id: &str) -> Result<Vec<Vote>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let votes = tx.select_election_votes(election_id).await?;
        tx.commit().await?;
        Ok(votes)
    }
}
