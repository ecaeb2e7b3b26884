use chrono::Utc;

use crate::{db, state, util};
use crate::db::StoreError;
use crate::events::VoteEvent;
use crate::model::{Identity, PostBallotRequest, PostBallotResponse};
use super::{BallotError, ElectionOperations};

/// Selection-count and abstention rules for one ballot.
fn check_selection(item: &db::VotingItem, request: &PostBallotRequest) -> Result<(), BallotError> {
    let selected = request.option_ids.len();
    let invalid_count = BallotError::InvalidSelectionCount {
        selected,
        max: item.max_selections,
    };

    if request.abstain {
        return if item.allow_abstain && selected == 0 {
            Ok(())
        } else {
            Err(invalid_count)
        };
    }

    if selected == 0 || selected > item.max_selections as usize {
        return Err(invalid_count);
    }

    if let Some(duplicate) = util::first_duplicate(request.option_ids.iter()) {
        return Err(BallotError::DuplicateSelection(duplicate.clone()));
    }
    Ok(())
}

impl ElectionOperations {
    pub(super) async fn cast_ballot(&self,
        identity: &Identity,
        voting_item_id: &str,
        request: &PostBallotRequest
    ) -> Result<PostBallotResponse, BallotError> {
        let voter_id = match identity {
            Identity::Voter(voter_id) => voter_id,
            Identity::Admin => return Err(BallotError::Unauthenticated),
        };

        if !self.db.voter_exists(voter_id).await? {
            return Err(BallotError::Unauthenticated);
        }

        let item = self.db.select_voting_item(voting_item_id)
            .await?
            .ok_or(BallotError::VotingItemNotFound)?;

        // The same id may be registered elsewhere; only this election's row counts.
        let voter = self.db.select_voter(&item.election_id, voter_id)
            .await?
            .ok_or(BallotError::VoterMismatch)?;

        let session = self.db.select_session(&item.session_id)
            .await?
            .ok_or_else(|| {
                error!("Session not found for voting_item_id={},session_id={}", item.id, item.session_id);
                BallotError::VotingItemNotFound
            })?;

        if !state::can_accept_votes(session.status) {
            return Err(BallotError::VotingClosed);
        }

        check_selection(&item, request)?;

        let options = self.db.select_options(&item.id).await?;
        if let Some(unknown) = request.option_ids.iter().find(|id| !options.iter().any(|o| &o.id == *id)) {
            return Err(BallotError::OptionNotFound(unknown.clone()));
        }

        let cast_at = Utc::now();
        let ballot = db::Ballot {
            election_id: item.election_id.clone(),
            voter_id: voter.id.clone(),
            voting_item_id: item.id.clone(),
            voting_session_id: session.id.clone(),
            abstain: request.abstain,
            cast_at,
        };
        let votes: Vec<db::Vote> = request.option_ids.iter()
            .map(|option_id| db::Vote {
                id: util::new_id(),
                option_id: option_id.clone(),
                voter_id: voter.id.clone(),
                election_id: item.election_id.clone(),
                voting_session_id: session.id.clone(),
                voting_item_id: item.id.clone(),
                cast_at,
            })
            .collect();

        match self.db.insert_ballot(&ballot, &votes).await {
            Ok(()) => (),
            Err(StoreError::Conflict) => return Err(BallotError::DuplicateVote),
            // Voter deleted between lookup and write.
            Err(StoreError::NotFound) => return Err(BallotError::Unauthenticated),
            // Session closed after the status check above.
            Err(StoreError::SessionClosed) => return Err(BallotError::VotingClosed),
            Err(e) => return Err(e.into()),
        }

        info!("Ballot cast voter_id={},voting_item_id={},options={}", voter.id, item.id, votes.len());

        self.feed.publish(VoteEvent::BallotCast {
            election_id: item.election_id.clone(),
            voting_session_id: session.id,
            voting_item_id: item.id.clone(),
            voter_id: voter.id,
            option_ids: request.option_ids.clone(),
            abstain: request.abstain,
            cast_at,
        });

        Ok(PostBallotResponse {
            voting_item_id: item.id,
            vote_ids: votes.into_iter().map(|v| v.id).collect(),
            abstain: request.abstain,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::model::*;
    use crate::operations::ElectionOperationsT;
    use crate::operations::fixtures::*;
    use crate::state::Status;
    use super::*;

    fn counts(tally: &crate::tally::ItemTally) -> Vec<(String, usize)> {
        tally.options.iter().map(|o| (o.value.clone(), o.vote_count)).collect()
    }

    #[tokio::test]
    async fn board_2024_example() {
        let ops = new_ops();
        let board = ongoing_board(&ops).await;

        //given voter 1 votes A and voter 2 votes B
        ops.post_ballot(&voter(&board.voters[0]), &board.president_id, &choose(&[&board.option_a]))
            .await
            .expect("Voter 1 should vote");
        ops.post_ballot(&voter(&board.voters[1]), &board.president_id, &choose(&[&board.option_b]))
            .await
            .expect("Voter 2 should vote");

        //then the tally is A:1, B:1 with 2 of 3 participating
        let tally = ops.get_tally(&board.president_id).await.unwrap();
        assert_eq!(vec!(("A".to_owned(), 1), ("B".to_owned(), 1)), counts(&tally));
        let participation = ops.get_participation(&board.election_id).await.unwrap();
        assert_eq!(3, participation.participation.total_voters);
        assert_eq!(2, participation.participation.participated_voters);

        //when voter 1 tries again for B
        let error = ops.post_ballot(&voter(&board.voters[0]), &board.president_id, &choose(&[&board.option_b]))
            .await
            .expect_err("Second ballot should be rejected");
        match error {
            BallotError::DuplicateVote => (),
            _ => panic!("Expected DuplicateVote {:?}", error),
        }

        //then nothing changed
        let tally = ops.get_tally(&board.president_id).await.unwrap();
        assert_eq!(vec!(("A".to_owned(), 1), ("B".to_owned(), 1)), counts(&tally));
    }

    #[tokio::test]
    async fn voting_closed_outside_ongoing_session() {
        let ops = new_ops();
        let board = upcoming_board(&ops).await;

        let error = ops.post_ballot(&voter(&board.voters[0]), &board.president_id, &choose(&[&board.option_a]))
            .await
            .expect_err("Upcoming session should not accept votes");
        match error {
            BallotError::VotingClosed => (),
            _ => panic!("Expected VotingClosed {:?}", error),
        }

        ops.put_session_status(&board.session_id, Status::Ongoing).await.unwrap();
        ops.put_session_status(&board.session_id, Status::Past).await.unwrap();

        let error = ops.post_ballot(&voter(&board.voters[0]), &board.president_id, &choose(&[&board.option_a]))
            .await
            .expect_err("Past session should not accept votes");
        match error {
            BallotError::VotingClosed => (),
            _ => panic!("Expected VotingClosed {:?}", error),
        }
        let voters = ops.list_voters(&board.election_id).await.unwrap();
        assert!(voters.iter().all(|v| !v.has_voted));
    }

    #[tokio::test]
    async fn selection_count_bounded_by_max_selections() {
        let ops = new_ops();
        let board = upcoming_board(&ops).await;
        let board_members = ops.post_voting_item(&board.session_id, &item_request("Board members", 2, false, &["X", "Y", "Z"]))
            .await
            .unwrap();
        ops.put_session_status(&board.session_id, Status::Ongoing).await.unwrap();
        let x = &board_members.options[0].id;
        let y = &board_members.options[1].id;
        let z = &board_members.options[2].id;

        let error = ops.post_ballot(&voter(&board.voters[0]), &board_members.id, &choose(&[x, y, z]))
            .await
            .expect_err("Three of two should fail");
        match error {
            BallotError::InvalidSelectionCount { selected: 3, max: 2 } => (),
            _ => panic!("Expected InvalidSelectionCount {:?}", error),
        }

        let response = ops.post_ballot(&voter(&board.voters[0]), &board_members.id, &choose(&[x, z]))
            .await
            .expect("Exactly max_selections should succeed");
        assert_eq!(2, response.vote_ids.len());

        let tally = ops.get_tally(&board_members.id).await.unwrap();
        assert_eq!(vec!(("X".to_owned(), 1), ("Y".to_owned(), 0), ("Z".to_owned(), 1)), counts(&tally));
        assert_eq!(1, tally.ballots);
    }

    #[tokio::test]
    async fn empty_ballot_needs_abstain() {
        let ops = new_ops();
        let board = ongoing_board(&ops).await;

        let error = ops.post_ballot(&voter(&board.voters[0]), &board.president_id, &choose(&[]))
            .await
            .expect_err("Empty ballot should fail");
        match error {
            BallotError::InvalidSelectionCount { selected: 0, max: 1 } => (),
            _ => panic!("Expected InvalidSelectionCount {:?}", error),
        }

        let abstain = PostBallotRequest { option_ids: vec!(), abstain: true };
        let error = ops.post_ballot(&voter(&board.voters[0]), &board.president_id, &abstain)
            .await
            .expect_err("Abstaining is not allowed on this item");
        match error {
            BallotError::InvalidSelectionCount { .. } => (),
            _ => panic!("Expected InvalidSelectionCount {:?}", error),
        }
    }

    #[tokio::test]
    async fn abstain_when_allowed() {
        let ops = new_ops();
        let board = upcoming_board(&ops).await;
        let statute = ops.post_voting_item(&board.session_id, &item_request("Statute change", 1, true, &["yes", "no"]))
            .await
            .unwrap();
        ops.put_session_status(&board.session_id, Status::Ongoing).await.unwrap();

        let abstain_with_choice = PostBallotRequest {
            option_ids: vec!(statute.options[0].id.clone()),
            abstain: true,
        };
        ops.post_ballot(&voter(&board.voters[0]), &statute.id, &abstain_with_choice)
            .await
            .expect_err("Abstaining with a choice should fail");

        let abstain = PostBallotRequest { option_ids: vec!(), abstain: true };
        let response = ops.post_ballot(&voter(&board.voters[0]), &statute.id, &abstain)
            .await
            .expect("Abstaining should succeed");
        assert!(response.abstain);
        assert!(response.vote_ids.is_empty());

        let tally = ops.get_tally(&statute.id).await.unwrap();
        assert_eq!(1, tally.ballots);
        assert_eq!(1, tally.abstentions);
        assert!(tally.options.iter().all(|o| o.vote_count == 0));

        let non_voters = ops.list_non_voters(&board.election_id).await.unwrap();
        assert!(non_voters.iter().all(|v| v.voter_id != board.voters[0]));
    }

    #[tokio::test]
    async fn rejects_bad_option_choices() {
        let ops = new_ops();
        let board = ongoing_board(&ops).await;

        let error = ops.post_ballot(&voter(&board.voters[0]), &board.president_id, &choose(&[&"nope".to_owned()]))
            .await
            .expect_err("Unknown option should fail");
        match error {
            BallotError::OptionNotFound(option) => assert_eq!("nope", option),
            _ => panic!("Expected OptionNotFound {:?}", error),
        }

        let mut twice = choose(&[&board.option_a, &board.option_a]);
        let error = ops.post_ballot(&voter(&board.voters[0]), &board.president_id, &twice)
            .await
            .expect_err("Two selections on a single-choice item should fail");
        match error {
            BallotError::InvalidSelectionCount { .. } => (),
            _ => panic!("Expected InvalidSelectionCount {:?}", error),
        }

        twice.option_ids.truncate(1);
        ops.post_ballot(&voter(&board.voters[0]), &board.president_id, &twice)
            .await
            .expect("A single selection should succeed after the rejections");
    }

    #[tokio::test]
    async fn duplicate_selection_on_multi_choice_item() {
        let ops = new_ops();
        let board = upcoming_board(&ops).await;
        let item = ops.post_voting_item(&board.session_id, &item_request("Committee", 3, false, &["X", "Y", "Z"]))
            .await
            .unwrap();
        ops.put_session_status(&board.session_id, Status::Ongoing).await.unwrap();
        let x = &item.options[0].id;

        let error = ops.post_ballot(&voter(&board.voters[0]), &item.id, &choose(&[x, x]))
            .await
            .expect_err("Same option twice should fail");
        match error {
            BallotError::DuplicateSelection(option) => assert_eq!(x, &option),
            _ => panic!("Expected DuplicateSelection {:?}", error),
        }
    }

    #[tokio::test]
    async fn voter_from_another_election() {
        let ops = new_ops();
        let board = ongoing_board(&ops).await;
        let other = ongoing_board(&ops).await;

        let error = ops.post_ballot(&voter(&other.voters[0]), &board.president_id, &choose(&[&board.option_a]))
            .await
            .expect_err("Foreign voter should be rejected");
        match error {
            BallotError::VoterMismatch => (),
            _ => panic!("Expected VoterMismatch {:?}", error),
        }
    }

    #[tokio::test]
    async fn unknown_identity() {
        let ops = new_ops();
        let board = ongoing_board(&ops).await;

        for identity in vec!(voter("stranger"), Identity::Admin) {
            let error = ops.post_ballot(&identity, &board.president_id, &choose(&[&board.option_a]))
                .await
                .expect_err("Unknown identity should be rejected");
            match error {
                BallotError::Unauthenticated => (),
                _ => panic!("Expected Unauthenticated {:?}", error),
            }
        }

        let error = ops.post_ballot(&voter(&board.voters[0]), "missing", &choose(&[&board.option_a]))
            .await
            .expect_err("Unknown item should be rejected");
        match error {
            BallotError::VotingItemNotFound => (),
            _ => panic!("Expected VotingItemNotFound {:?}", error),
        }
    }

    #[tokio::test]
    async fn ballot_is_published() {
        let ops = new_ops();
        let board = ongoing_board(&ops).await;
        let mut receiver = ops.subscribe_votes();

        ops.post_ballot(&voter(&board.voters[2]), &board.president_id, &choose(&[&board.option_b]))
            .await
            .unwrap();

        let event = receiver.recv().await.expect("Should receive vote event");
        match event {
            VoteEvent::BallotCast { voter_id, voting_item_id, option_ids, .. } => {
                assert_eq!(board.voters[2], voter_id);
                assert_eq!(board.president_id, voting_item_id);
                assert_eq!(vec!(board.option_b.clone()), option_ids);
            }
        }
    }

    #[tokio::test]
    async fn concurrent_ballots_from_one_voter() {
        let ops = new_ops();
        let board = ongoing_board(&ops).await;
        let identity = voter(&board.voters[0]);
        let for_a = choose(&[&board.option_a]);
        let for_b = choose(&[&board.option_b]);

        let (first, second) = futures::join!(
            ops.post_ballot(&identity, &board.president_id, &for_a),
            ops.post_ballot(&identity, &board.president_id, &for_b),
        );

        assert_eq!(1, vec!(&first, &second).into_iter().filter(|r| r.is_ok()).count());
        let tally = ops.get_tally(&board.president_id).await.unwrap();
        assert_eq!(1, tally.options.iter().map(|o| o.vote_count).sum::<usize>());
    }

    #[tokio::test]
    async fn same_member_votes_in_two_elections() {
        let ops = new_ops();
        let board = ongoing_board(&ops).await;
        let next_year = ongoing_board(&ops).await;
        for election_id in &[&board.election_id, &next_year.election_id] {
            ops.post_voter(election_id, &PostVoterRequest {
                name: "Kari".to_owned(),
                email: None,
                voter_id: Some("s123456".to_owned()),
            }).await.expect("Member should register in each election");
        }

        ops.post_ballot(&voter("s123456"), &board.president_id, &choose(&[&board.option_a]))
            .await
            .expect("Should vote in the first election");
        ops.post_ballot(&voter("s123456"), &next_year.president_id, &choose(&[&next_year.option_b]))
            .await
            .expect("Should vote in the second election");

        for election_id in &[&board.election_id, &next_year.election_id] {
            let non_voters = ops.list_non_voters(election_id).await.unwrap();
            assert!(non_voters.iter().all(|v| v.voter_id != "s123456"));
        }
    }

    mod session_closing_mid_ballot {
        use std::sync::{Arc, Mutex};

        use async_trait::async_trait;

        use crate::db::*;
        use crate::events::VoteFeed;
        use super::*;

        /// Memory store that closes a session the moment a ballot reads the
        /// item's options, after the status check has already passed.
        struct ClosingStore {
            inner: MemoryDb,
            close_session: Mutex<Option<String>>,
        }

        #[async_trait]
        impl ElectionStore for ClosingStore {
            async fn insert_election(&self, election: &Election) -> Result<(), StoreError> {
                self.inner.insert_election(election).await
            }
            async fn select_election(&self, id: &str) -> Result<Option<Election>, StoreError> {
                self.inner.select_election(id).await
            }
            async fn select_elections(&self, campus: Option<&str>) -> Result<Vec<Election>, StoreError> {
                self.inner.select_elections(campus).await
            }
            async fn update_election_status(&self, id: &str, from: Status, to: Status) -> Result<bool, StoreError> {
                self.inner.update_election_status(id, from, to).await
            }
            async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
                self.inner.insert_session(session).await
            }
            async fn select_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
                self.inner.select_session(id).await
            }
            async fn select_sessions(&self, election_id: &str) -> Result<Vec<Session>, StoreError> {
                self.inner.select_sessions(election_id).await
            }
            async fn update_session_status(&self, id: &str, from: Status, to: Status) -> Result<bool, StoreError> {
                self.inner.update_session_status(id, from, to).await
            }
            async fn insert_voting_item(&self, item: &VotingItem, options: &[VotingOption]) -> Result<(), StoreError> {
                self.inner.insert_voting_item(item, options).await
            }
            async fn select_voting_item(&self, id: &str) -> Result<Option<VotingItem>, StoreError> {
                self.inner.select_voting_item(id).await
            }
            async fn select_voting_items(&self, election_id: &str) -> Result<Vec<VotingItem>, StoreError> {
                self.inner.select_voting_items(election_id).await
            }
            async fn select_options(&self, voting_item_id: &str) -> Result<Vec<VotingOption>, StoreError> {
                let session_id = self.close_session.lock().unwrap().take();
                if let Some(session_id) = session_id {
                    assert!(self.inner.update_session_status(&session_id, Status::Ongoing, Status::Past).await?);
                }
                self.inner.select_options(voting_item_id).await
            }
            async fn select_election_options(&self, election_id: &str) -> Result<Vec<VotingOption>, StoreError> {
                self.inner.select_election_options(election_id).await
            }
            async fn insert_voter(&self, voter: &Voter) -> Result<Voter, StoreError> {
                self.inner.insert_voter(voter).await
            }
            async fn select_voter(&self, election_id: &str, id: &str) -> Result<Option<Voter>, StoreError> {
                self.inner.select_voter(election_id, id).await
            }
            async fn voter_exists(&self, id: &str) -> Result<bool, StoreError> {
                self.inner.voter_exists(id).await
            }
            async fn select_voters(&self, election_id: &str) -> Result<Vec<Voter>, StoreError> {
                self.inner.select_voters(election_id).await
            }
            async fn delete_voter(&self, election_id: &str, id: &str) -> Result<bool, StoreError> {
                self.inner.delete_voter(election_id, id).await
            }
            async fn insert_ballot(&self, ballot: &Ballot, votes: &[Vote]) -> Result<(), StoreError> {
                self.inner.insert_ballot(ballot, votes).await
            }
            async fn select_ballots(&self, voting_item_id: &str) -> Result<Vec<Ballot>, StoreError> {
                self.inner.select_ballots(voting_item_id).await
            }
            async fn select_votes(&self, voting_item_id: &str) -> Result<Vec<Vote>, StoreError> {
                self.inner.select_votes(voting_item_id).await
            }
            async fn select_election_ballots(&self, election_id: &str) -> Result<Vec<Ballot>, StoreError> {
                self.inner.select_election_ballots(election_id).await
            }
            async fn select_election_votes(&self, election_id: &str) -> Result<Vec<Vote>, StoreError> {
                self.inner.select_election_votes(election_id).await
            }
        }

        #[tokio::test]
        async fn ballot_is_rejected_and_nothing_is_written() {
            let store = Arc::new(ClosingStore {
                inner: MemoryDb::new(),
                close_session: Mutex::new(None),
            });
            let ops = ElectionOperations::new(store.clone(), VoteFeed::new());
            let board = ongoing_board(&ops).await;
            *store.close_session.lock().unwrap() = Some(board.session_id.clone());

            let error = ops.post_ballot(&voter(&board.voters[0]), &board.president_id, &choose(&[&board.option_a]))
                .await
                .expect_err("Ballot should not land in a closed session");
            match error {
                BallotError::VotingClosed => (),
                _ => panic!("Expected VotingClosed {:?}", error),
            }

            let session = store.select_session(&board.session_id).await.unwrap().unwrap();
            assert_eq!(Status::Past, session.status);
            assert!(store.select_votes(&board.president_id).await.unwrap().is_empty());
            assert!(store.select_ballots(&board.president_id).await.unwrap().is_empty());
            let voters = ops.list_voters(&board.election_id).await.unwrap();
            assert!(voters.iter().all(|v| !v.has_voted));
        }
    }
}
