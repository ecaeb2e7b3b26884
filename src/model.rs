use chrono::{DateTime, offset::Utc};
use serde::{Deserialize, Serialize};

use crate::db::{self, ItemType};
use crate::state::Status;
use crate::tally::{ItemTally, Participation};

#[derive(Serialize, Deserialize, Debug)]
#[cfg_attr(test, derive(Clone))]
pub struct PostElectionRequest {
    pub name: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub campus: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[cfg_attr(test, derive(Clone))]
pub struct PostSessionRequest {
    pub name: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug)]
#[cfg_attr(test, derive(Clone))]
pub struct PostOptionRequest {
    pub value: String,
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[cfg_attr(test, derive(Clone))]
pub struct PostVotingItemRequest {
    pub title: String,
    pub description: Option<String>,
    pub item_type: ItemType,
    #[serde(default)]
    pub allow_abstain: bool,
    pub max_selections: i32,
    pub options: Vec<PostOptionRequest>,
}

#[derive(Serialize, Deserialize, Debug)]
#[cfg_attr(test, derive(Clone))]
pub struct PutStatusRequest {
    pub status: Status,
}

#[derive(Serialize, Deserialize, Debug)]
#[cfg_attr(test, derive(Clone))]
pub struct PostVoterRequest {
    pub name: String,
    pub email: Option<String>,
    /// Stable id from the membership system; generated when absent.
    pub voter_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[cfg_attr(test, derive(Clone))]
pub struct PostBallotRequest {
    #[serde(default)]
    pub option_ids: Vec<String>,
    #[serde(default)]
    pub abstain: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CampusQuery {
    pub campus: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ElectionSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub campus: String,
    pub status: Status,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    pub election_id: String,
    pub name: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: Status,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OptionSummary {
    pub id: String,
    pub value: String,
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VotingItemSummary {
    pub id: String,
    pub session_id: String,
    pub title: String,
    pub description: Option<String>,
    pub item_type: ItemType,
    pub allow_abstain: bool,
    pub max_selections: i32,
    pub options: Vec<OptionSummary>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: SessionSummary,
    pub items: Vec<VotingItemSummary>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GetElectionResponse {
    #[serde(flatten)]
    pub election: ElectionSummary,
    pub sessions: Vec<SessionDetail>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VoterSummary {
    pub voter_id: String,
    pub election_id: String,
    pub name: String,
    pub email: Option<String>,
    pub has_voted: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostBallotResponse {
    pub voting_item_id: String,
    pub vote_ids: Vec<String>,
    pub abstain: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParticipationResponse {
    #[serde(flatten)]
    pub participation: Participation,
    pub ratio: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ElectionResultsResponse {
    pub election_id: String,
    pub items: Vec<ItemTally>,
    pub participation: ParticipationResponse,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Who is calling, as established from request headers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Voter(String),
    Admin,
}

impl From<db::Election> for ElectionSummary {
    fn from(e: db::Election) -> Self {
        ElectionSummary {
            id: e.id,
            name: e.name,
            description: e.description,
            date: e.date,
            campus: e.campus,
            status: e.status,
        }
    }
}

impl From<db::Session> for SessionSummary {
    fn from(s: db::Session) -> Self {
        SessionSummary {
            id: s.id,
            election_id: s.election_id,
            name: s.name,
            description: s.description,
            start_time: s.start_time,
            end_time: s.end_time,
            status: s.status,
        }
    }
}

impl From<db::VotingOption> for OptionSummary {
    fn from(o: db::VotingOption) -> Self {
        OptionSummary {
            id: o.id,
            value: o.value,
            description: o.description,
        }
    }
}

impl From<db::Voter> for VoterSummary {
    fn from(v: db::Voter) -> Self {
        VoterSummary {
            voter_id: v.id,
            election_id: v.election_id,
            name: v.name,
            email: v.email,
            has_voted: v.has_voted,
        }
    }
}

impl From<Participation> for ParticipationResponse {
    fn from(participation: Participation) -> Self {
        let ratio = participation.ratio();
        ParticipationResponse { participation, ratio }
    }
}
