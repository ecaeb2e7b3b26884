use std::collections::HashMap;

use itertools::Itertools;

use crate::{db, state, util};
use crate::db::StoreError;
use crate::model::*;
use crate::state::{InvalidTransition, Status};
use super::{ElectionError, ElectionOperations};

fn require_text(field: &str, value: &str) -> Result<(), ElectionError> {
    if value.trim().is_empty() {
        return Err(ElectionError::Invalid(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn item_summary(item: db::VotingItem, options: Vec<db::VotingOption>) -> VotingItemSummary {
    VotingItemSummary {
        id: item.id,
        session_id: item.session_id,
        title: item.title,
        description: item.description,
        item_type: item.item_type,
        allow_abstain: item.allow_abstain,
        max_selections: item.max_selections,
        options: options.into_iter().map(OptionSummary::from).collect(),
    }
}

impl ElectionOperations {
    pub(super) async fn create_election(&self, request: &PostElectionRequest) -> Result<ElectionSummary, ElectionError> {
        require_text("name", &request.name)?;
        require_text("campus", &request.campus)?;

        let election = db::Election {
            id: util::new_id(),
            name: request.name.trim().to_owned(),
            description: request.description.clone(),
            date: request.date,
            campus: request.campus.trim().to_owned(),
            status: Status::Upcoming,
        };
        self.db.insert_election(&election).await?;

        info!("Created election id={},campus={}", election.id, election.campus);
        Ok(ElectionSummary::from(election))
    }

    pub(super) async fn election_detail(&self, id: &str) -> Result<GetElectionResponse, ElectionError> {
        let election = self.db.select_election(id)
            .await?
            .ok_or(ElectionError::ElectionNotFound)?;

        let sessions = self.db.select_sessions(id).await?;
        let items = self.db.select_voting_items(id).await?;
        let options = self.db.select_election_options(id).await?;

        let mut options_by_item: HashMap<String, Vec<db::VotingOption>> = options
            .into_iter()
            .into_group_map_by(|o| o.voting_item_id.clone());

        let mut items_by_session: HashMap<String, Vec<VotingItemSummary>> = items
            .into_iter()
            .map(|item| {
                let mut item_options = options_by_item
                    .remove(item.id.as_str())
                    .unwrap_or_default();
                item_options.sort_by_key(|o| o.position);
                item_summary(item, item_options)
            })
            .into_group_map_by(|item| item.session_id.clone());

        let sessions = sessions.into_iter()
            .map(|s| {
                let items = items_by_session
                    .remove(s.id.as_str())
                    .unwrap_or_default();
                SessionDetail {
                    session: SessionSummary::from(s),
                    items,
                }
            })
            .collect();

        Ok(GetElectionResponse {
            election: ElectionSummary::from(election),
            sessions,
        })
    }

    pub(super) async fn advance_election(&self, id: &str, to: Status) -> Result<ElectionSummary, ElectionError> {
        let mut election = self.db.select_election(id)
            .await?
            .ok_or(ElectionError::ElectionNotFound)?;

        let from = election.status;
        state::transition(from, to)?;
        if !self.db.update_election_status(id, from, to).await? {
            // Someone else moved it first.
            return Err(InvalidTransition { from, to }.into());
        }

        info!("Election id={} moved from {} to {}", id, from, to);
        election.status = to;
        Ok(ElectionSummary::from(election))
    }

    pub(super) async fn create_session(&self, election_id: &str, request: &PostSessionRequest)
    -> Result<SessionSummary, ElectionError> {
        require_text("name", &request.name)?;
        if request.end_time < request.start_time {
            return Err(ElectionError::Invalid("end_time must not be before start_time".to_owned()));
        }

        self.db.select_election(election_id)
            .await?
            .ok_or(ElectionError::ElectionNotFound)?;

        let session = db::Session {
            id: util::new_id(),
            election_id: election_id.to_owned(),
            name: request.name.trim().to_owned(),
            description: request.description.clone(),
            start_time: request.start_time,
            end_time: request.end_time,
            status: Status::Upcoming,
        };
        match self.db.insert_session(&session).await {
            Ok(()) => (),
            Err(StoreError::NotFound) => return Err(ElectionError::ElectionNotFound),
            Err(e) => return Err(e.into()),
        }

        info!("Created session id={},election_id={}", session.id, election_id);
        Ok(SessionSummary::from(session))
    }

    pub(super) async fn advance_session(&self, id: &str, to: Status) -> Result<SessionSummary, ElectionError> {
        let mut session = self.db.select_session(id)
            .await?
            .ok_or(ElectionError::SessionNotFound)?;

        let from = session.status;
        state::transition(from, to)?;
        if !self.db.update_session_status(id, from, to).await? {
            return Err(InvalidTransition { from, to }.into());
        }

        info!("Session id={} moved from {} to {}", id, from, to);
        session.status = to;
        Ok(SessionSummary::from(session))
    }

    pub(super) async fn create_voting_item(&self, session_id: &str, request: &PostVotingItemRequest)
    -> Result<VotingItemSummary, ElectionError> {
        require_text("title", &request.title)?;
        if request.options.is_empty() {
            return Err(ElectionError::Invalid("a voting item needs at least one option".to_owned()));
        }
        for option in request.options.iter() {
            require_text("option value", &option.value)?;
        }
        if let Some(duplicate) = util::first_duplicate(request.options.iter().map(|o| o.value.trim())) {
            return Err(ElectionError::Invalid(format!("Duplicate option: [{}]", duplicate)));
        }
        if request.max_selections < 1 || request.max_selections as usize > request.options.len() {
            return Err(ElectionError::Invalid(format!(
                "max_selections must be between 1 and {}", request.options.len()
            )));
        }

        let session = self.db.select_session(session_id)
            .await?
            .ok_or(ElectionError::SessionNotFound)?;
        if session.status != Status::Upcoming {
            return Err(ElectionError::SessionNotUpcoming);
        }

        let position = self.db.select_voting_items(&session.election_id)
            .await?
            .iter()
            .filter(|i| i.session_id == session.id)
            .count() as i32;

        let item = db::VotingItem {
            id: util::new_id(),
            session_id: session.id.clone(),
            election_id: session.election_id.clone(),
            title: request.title.trim().to_owned(),
            description: request.description.clone(),
            item_type: request.item_type,
            allow_abstain: request.allow_abstain,
            max_selections: request.max_selections,
            position,
        };
        let options: Vec<db::VotingOption> = request.options.iter()
            .enumerate()
            .map(|(i, o)| db::VotingOption {
                id: util::new_id(),
                voting_item_id: item.id.clone(),
                value: o.value.trim().to_owned(),
                description: o.description.clone(),
                position: i as i32,
            })
            .collect();

        match self.db.insert_voting_item(&item, &options).await {
            Ok(()) => (),
            Err(StoreError::NotFound) => return Err(ElectionError::SessionNotFound),
            Err(e) => return Err(e.into()),
        }

        info!("Created voting item id={},session_id={},options={}", item.id, session.id, options.len());
        Ok(item_summary(item, options))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::operations::ElectionOperationsT;
    use crate::operations::fixtures::*;
    use super::*;

    #[tokio::test]
    async fn election_tree() {
        let ops = new_ops();
        let board = upcoming_board(&ops).await;
        ops.post_voting_item(&board.session_id, &item_request("Treasurer", 1, true, &["C", "D"]))
            .await
            .unwrap();

        let election = ops.get_election(&board.election_id).await.unwrap();

        assert_eq!("Board 2024", election.election.name);
        assert_eq!(Status::Upcoming, election.election.status);
        assert_eq!(1, election.sessions.len());
        let session = &election.sessions[0];
        assert_eq!("Main", session.session.name);
        let titles: Vec<&str> = session.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(vec!("President", "Treasurer"), titles);
        let values: Vec<&str> = session.items[0].options.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(vec!("A", "B"), values);
    }

    #[tokio::test]
    async fn missing_election() {
        let ops = new_ops();
        match ops.get_election("missing").await {
            Err(ElectionError::ElectionNotFound) => (),
            other => panic!("Expected ElectionNotFound {:?}", other),
        }
    }

    #[tokio::test]
    async fn lists_elections_by_campus() {
        let ops = new_ops();
        upcoming_board(&ops).await;
        ops.post_election(&PostElectionRequest {
            name: "Bergen board".to_owned(),
            description: None,
            date: Utc::now(),
            campus: "bergen".to_owned(),
        }).await.unwrap();

        assert_eq!(2, ops.list_elections(None).await.unwrap().len());
        let bergen = ops.list_elections(Some("bergen".to_owned())).await.unwrap();
        assert_eq!(1, bergen.len());
        assert_eq!("Bergen board", bergen[0].name);
    }

    #[tokio::test]
    async fn status_moves_forward_one_step() {
        let ops = new_ops();
        let board = upcoming_board(&ops).await;

        match ops.put_session_status(&board.session_id, Status::Past).await {
            Err(ElectionError::InvalidTransition(t)) => {
                assert_eq!(Status::Upcoming, t.from);
                assert_eq!(Status::Past, t.to);
            }
            other => panic!("Expected InvalidTransition {:?}", other),
        }

        let session = ops.put_session_status(&board.session_id, Status::Ongoing).await.unwrap();
        assert_eq!(Status::Ongoing, session.status);

        match ops.put_session_status(&board.session_id, Status::Upcoming).await {
            Err(ElectionError::InvalidTransition(_)) => (),
            other => panic!("Expected InvalidTransition {:?}", other),
        }

        let election = ops.put_election_status(&board.election_id, Status::Ongoing).await.unwrap();
        assert_eq!(Status::Ongoing, election.status);
        let election = ops.put_election_status(&board.election_id, Status::Past).await.unwrap();
        assert_eq!(Status::Past, election.status);
        match ops.put_election_status(&board.election_id, Status::Past).await {
            Err(ElectionError::InvalidTransition(_)) => (),
            other => panic!("Expected InvalidTransition {:?}", other),
        }
    }

    #[tokio::test]
    async fn items_only_while_upcoming() {
        let ops = new_ops();
        let board = ongoing_board(&ops).await;

        match ops.post_voting_item(&board.session_id, &item_request("Late", 1, false, &["A"])).await {
            Err(ElectionError::SessionNotUpcoming) => (),
            other => panic!("Expected SessionNotUpcoming {:?}", other),
        }
        match ops.post_voting_item("missing", &item_request("Lost", 1, false, &["A"])).await {
            Err(ElectionError::SessionNotFound) => (),
            other => panic!("Expected SessionNotFound {:?}", other),
        }
    }

    #[tokio::test]
    async fn validates_voting_items() {
        let ops = new_ops();
        let board = upcoming_board(&ops).await;

        let cases = vec!(
            item_request("No options", 1, false, &[]),
            item_request("Too many", 3, false, &["A", "B"]),
            item_request("Too few", 0, false, &["A", "B"]),
            item_request("Duplicates", 1, false, &["A", "A "]),
            item_request(" ", 1, false, &["A"]),
        );
        for request in cases {
            match ops.post_voting_item(&board.session_id, &request).await {
                Err(ElectionError::Invalid(_)) => (),
                other => panic!("Expected Invalid for {:?}: {:?}", request.title, other),
            }
        }
    }

    #[tokio::test]
    async fn validates_sessions() {
        let ops = new_ops();
        let board = upcoming_board(&ops).await;

        let backwards = PostSessionRequest {
            name: "Backwards".to_owned(),
            description: None,
            start_time: Utc::now(),
            end_time: Utc::now() - Duration::hours(1),
        };
        match ops.post_session(&board.election_id, &backwards).await {
            Err(ElectionError::Invalid(_)) => (),
            other => panic!("Expected Invalid {:?}", other),
        }

        let mut orphan = backwards.clone();
        orphan.end_time = orphan.start_time;
        match ops.post_session("missing", &orphan).await {
            Err(ElectionError::ElectionNotFound) => (),
            other => panic!("Expected ElectionNotFound {:?}", other),
        }
    }
}
