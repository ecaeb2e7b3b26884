use chrono::{DateTime, offset::Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, Receiver, RecvError, Sender};
use tokio::task::JoinHandle;

const FEED_CAPACITY: usize = 1000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoteEvent {
    BallotCast {
        election_id: String,
        voting_session_id: String,
        voting_item_id: String,
        voter_id: String,
        option_ids: Vec<String>,
        abstain: bool,
        cast_at: DateTime<Utc>,
    },
}

impl VoteEvent {
    pub fn election_id(&self) -> &str {
        match self {
            VoteEvent::BallotCast { election_id, .. } => election_id,
        }
    }
}

/// Fan-out of vote events to live dashboards. Delivery is best effort: with
/// no subscribers events are dropped, and slow subscribers skip ahead.
#[derive(Clone)]
pub struct VoteFeed {
    sender: Sender<VoteEvent>,
}

impl VoteFeed {
    pub fn new() -> VoteFeed {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        VoteFeed { sender }
    }

    pub fn publish(&self, event: VoteEvent) {
        if self.sender.send(event).is_err() {
            debug!("No subscribers for vote event");
        }
    }

    pub fn subscribe(&self) -> Receiver<VoteEvent> {
        self.sender.subscribe()
    }

    /// Runs `callback` for every event published after this call, until the
    /// feed is dropped.
    pub fn on_vote_created<F>(&self, callback: F) -> JoinHandle<()>
    where F: Fn(VoteEvent) + Send + 'static {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => callback(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Vote feed subscriber lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for VoteFeed {
    fn default() -> Self {
        VoteFeed::new()
    }
}
