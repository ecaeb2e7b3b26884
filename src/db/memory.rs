use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::*;

/// (election id, voter id)
type VoterKey = (String, String);

fn voter_key(election_id: &str, id: &str) -> VoterKey {
    (election_id.to_owned(), id.to_owned())
}

#[derive(Default)]
struct Tables {
    elections: Vec<Election>,
    sessions: Vec<Session>,
    items: Vec<VotingItem>,
    options: Vec<VotingOption>,
    voters: HashMap<VoterKey, Voter>,
    ballot_keys: HashSet<(String, String, String)>,
    ballots: Vec<Ballot>,
    votes: Vec<Vote>,
}

/// In-process store used when no database is configured, and by tests.
///
/// A single lock guards all tables, so each trait method observes and
/// mutates a consistent snapshot.
pub struct MemoryDb {
    tables: Mutex<Tables>,
}

impl MemoryDb {
    pub fn new() -> MemoryDb {
        MemoryDb {
            tables: Mutex::new(Tables::default()),
        }
    }
}

impl Default for MemoryDb {
    fn default() -> Self {
        MemoryDb::new()
    }
}

fn set_status<T>(rows: &mut [T], id: &str, from: Status, to: Status,
    key: impl Fn(&mut T) -> (&str, &mut Status)) -> bool {
    for row in rows.iter_mut() {
        let (row_id, status) = key(row);
        if row_id == id {
            if *status != from {
                return false;
            }
            *status = to;
            return true;
        }
    }
    false
}

#[async_trait]
impl ElectionStore for MemoryDb {
    async fn insert_election(&self, election: &Election) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.elections.iter().any(|e| e.id == election.id) {
            return Err(StoreError::Conflict);
        }
        tables.elections.push(election.clone());
        Ok(())
    }

    async fn select_election(&self, id: &str) -> Result<Option<Election>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.elections.iter().find(|e| e.id == id).cloned())
    }

    async fn select_elections(&self, campus: Option<&str>) -> Result<Vec<Election>, StoreError> {
        let tables = self.tables.lock().await;
        let mut elections: Vec<Election> = tables.elections.iter()
            .filter(|e| campus.map(|c| c == e.campus).unwrap_or(true))
            .cloned()
            .collect();
        elections.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
        Ok(elections)
    }

    async fn update_election_status(&self, id: &str, from: Status, to: Status) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(set_status(&mut tables.elections, id, from, to, |e| (e.id.as_str(), &mut e.status)))
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.elections.iter().any(|e| e.id == session.election_id) {
            return Err(StoreError::NotFound);
        }
        if tables.sessions.iter().any(|s| s.id == session.id) {
            return Err(StoreError::Conflict);
        }
        tables.sessions.push(session.clone());
        Ok(())
    }

    async fn select_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn select_sessions(&self, election_id: &str) -> Result<Vec<Session>, StoreError> {
        let tables = self.tables.lock().await;
        let mut sessions: Vec<Session> = tables.sessions.iter()
            .filter(|s| s.election_id == election_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        Ok(sessions)
    }

    async fn update_session_status(&self, id: &str, from: Status, to: Status) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(set_status(&mut tables.sessions, id, from, to, |s| (s.id.as_str(), &mut s.status)))
    }

    async fn insert_voting_item(&self, item: &VotingItem, options: &[VotingOption]) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.sessions.iter().any(|s| s.id == item.session_id) {
            return Err(StoreError::NotFound);
        }
        if tables.items.iter().any(|i| i.id == item.id) {
            return Err(StoreError::Conflict);
        }
        let mut values = HashSet::new();
        if !options.iter().all(|o| values.insert(&o.value)) {
            return Err(StoreError::Conflict);
        }
        tables.items.push(item.clone());
        tables.options.extend(options.iter().cloned());
        Ok(())
    }

    async fn select_voting_item(&self, id: &str) -> Result<Option<VotingItem>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.items.iter().find(|i| i.id == id).cloned())
    }

    async fn select_voting_items(&self, election_id: &str) -> Result<Vec<VotingItem>, StoreError> {
        let tables = self.tables.lock().await;
        let mut items: Vec<VotingItem> = tables.items.iter()
            .filter(|i| i.election_id == election_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.session_id.cmp(&b.session_id).then(a.position.cmp(&b.position)));
        Ok(items)
    }

    async fn select_options(&self, voting_item_id: &str) -> Result<Vec<VotingOption>, StoreError> {
        let tables = self.tables.lock().await;
        let mut options: Vec<VotingOption> = tables.options.iter()
            .filter(|o| o.voting_item_id == voting_item_id)
            .cloned()
            .collect();
        options.sort_by_key(|o| o.position);
        Ok(options)
    }

    async fn select_election_options(&self, election_id: &str) -> Result<Vec<VotingOption>, StoreError> {
        let tables = self.tables.lock().await;
        let item_ids: HashSet<&str> = tables.items.iter()
            .filter(|i| i.election_id == election_id)
            .map(|i| i.id.as_str())
            .collect();
        let mut options: Vec<VotingOption> = tables.options.iter()
            .filter(|o| item_ids.contains(o.voting_item_id.as_str()))
            .cloned()
            .collect();
        options.sort_by(|a, b| a.voting_item_id.cmp(&b.voting_item_id).then(a.position.cmp(&b.position)));
        Ok(options)
    }

    async fn insert_voter(&self, voter: &Voter) -> Result<Voter, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.elections.iter().any(|e| e.id == voter.election_id) {
            return Err(StoreError::NotFound);
        }
        let key = voter_key(&voter.election_id, &voter.id);
        if tables.voters.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        let mut stored = voter.clone();
        stored.has_voted |= tables.ballots.iter()
            .any(|b| b.election_id == voter.election_id && b.voter_id == voter.id);
        tables.voters.insert(key, stored.clone());
        Ok(stored)
    }

    async fn select_voter(&self, election_id: &str, id: &str) -> Result<Option<Voter>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.voters.get(&voter_key(election_id, id)).cloned())
    }

    async fn voter_exists(&self, id: &str) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.voters.keys().any(|(_, voter_id)| voter_id == id))
    }

    async fn select_voters(&self, election_id: &str) -> Result<Vec<Voter>, StoreError> {
        let tables = self.tables.lock().await;
        let mut voters: Vec<Voter> = tables.voters.values()
            .filter(|v| v.election_id == election_id)
            .cloned()
            .collect();
        voters.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(voters)
    }

    async fn delete_voter(&self, election_id: &str, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.voters.remove(&voter_key(election_id, id)).is_some())
    }

    async fn insert_ballot(&self, ballot: &Ballot, votes: &[Vote]) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let ongoing = tables.sessions.iter()
            .any(|s| s.id == ballot.voting_session_id && s.status == Status::Ongoing);
        if !ongoing {
            return Err(StoreError::SessionClosed);
        }
        let key = (ballot.election_id.clone(), ballot.voter_id.clone(), ballot.voting_item_id.clone());
        if tables.ballot_keys.contains(&key) {
            return Err(StoreError::Conflict);
        }
        match tables.voters.get_mut(&voter_key(&ballot.election_id, &ballot.voter_id)) {
            Some(voter) => voter.has_voted = true,
            None => return Err(StoreError::NotFound),
        }
        tables.ballot_keys.insert(key);
        tables.ballots.push(ballot.clone());
        tables.votes.extend(votes.iter().cloned());
        Ok(())
    }

    async fn select_ballots(&self, voting_item_id: &str) -> Result<Vec<Ballot>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.ballots.iter().filter(|b| b.voting_item_id == voting_item_id).cloned().collect())
    }

    async fn select_votes(&self, voting_item_id: &str) -> Result<Vec<Vote>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.votes.iter().filter(|v| v.voting_item_id == voting_item_id).cloned().collect())
    }

    async fn select_election_ballots(&self, election_id: &str) -> Result<Vec<Ballot>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.ballots.iter().filter(|b| b.election_id == election_id).cloned().collect())
    }

    async fn select_election_votes(&self, election_id: &str) -> Result<Vec<Vote>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.votes.iter().filter(|v| v.election_id == election_id).cloned().collect())
    }
}
