use sqlx::{Done, Postgres, Transaction, postgres::PgDone};

use super::*;

pub struct BisoTransaction<'a>{
    tx: Transaction<'a, Postgres>,
}

impl<'a> BisoTransaction<'a> {

    pub async fn new(db: &'a PgPool) -> Result<BisoTransaction<'a>, sqlx::Error> {
        Ok(BisoTransaction {
            tx: db.begin().await?
        })
    }

    pub async fn insert_election(&mut self, election: &Election) -> Result<PgDone, sqlx::Error> {
        sqlx::query(
            "insert \
                into election(id, name, description, date, campus, status) \
                values ($1, $2, $3, $4, $5, $6)"
        ).bind(&election.id)
        .bind(&election.name)
        .bind(&election.description)
        .bind(election.date)
        .bind(&election.campus)
        .bind(election.status.as_str())
        .execute(&mut self.tx)
        .await
    }

    pub async fn select_election(&mut self, id: &str) -> Result<Option<Election>, sqlx::Error> {
        sqlx::query_as::<_, Election>(
            "select id, name, description, date, campus, status \
            from election where id = $1",
        ).bind(id)
        .fetch_optional(&mut self.tx)
        .await
    }

    pub async fn select_elections(&mut self, campus: Option<&str>) -> Result<Vec<Election>, sqlx::Error> {
        sqlx::query_as::<_, Election>(
            "select id, name, description, date, campus, status \
            from election where $1::text is null or campus = $1 \
            order by date desc, id",
        ).bind(campus)
        .fetch_all(&mut self.tx)
        .await
    }

    pub async fn update_election_status(&mut self, id: &str, from: Status, to: Status)
    -> Result<bool, sqlx::Error> {
        let done = sqlx::query(
            "update election set status = $1 where id = $2 and status = $3"
        ).bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .execute(&mut self.tx)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    pub async fn insert_session(&mut self, session: &Session) -> Result<PgDone, sqlx::Error> {
        sqlx::query(
            "insert \
                into election_session(id, election_id, name, description, start_time, end_time, status) \
                values ($1, $2, $3, $4, $5, $6, $7)"
        ).bind(&session.id)
        .bind(&session.election_id)
        .bind(&session.name)
        .bind(&session.description)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.status.as_str())
        .execute(&mut self.tx)
        .await
    }

    pub async fn select_session(&mut self, id: &str) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            "select id, election_id, name, description, start_time, end_time, status \
            from election_session where id = $1",
        ).bind(id)
        .fetch_optional(&mut self.tx)
        .await
    }

    pub async fn select_sessions(&mut self, election_id: &str) -> Result<Vec<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            "select id, election_id, name, description, start_time, end_time, status \
            from election_session where election_id = $1 order by start_time, id",
        ).bind(election_id)
        .fetch_all(&mut self.tx)
        .await
    }

    pub async fn update_session_status(&mut self, id: &str, from: Status, to: Status)
    -> Result<bool, sqlx::Error> {
        let done = sqlx::query(
            "update election_session set status = $1 where id = $2 and status = $3"
        ).bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .execute(&mut self.tx)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    pub async fn insert_voting_item(&mut self, item: &VotingItem) -> Result<PgDone, sqlx::Error> {
        sqlx::query(
            "insert \
                into voting_item(id, session_id, election_id, title, description, item_type, \
                    allow_abstain, max_selections, position) \
                values ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ).bind(&item.id)
        .bind(&item.session_id)
        .bind(&item.election_id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.item_type.as_str())
        .bind(item.allow_abstain)
        .bind(item.max_selections)
        .bind(item.position)
        .execute(&mut self.tx)
        .await
    }

    pub async fn select_voting_item(&mut self, id: &str) -> Result<Option<VotingItem>, sqlx::Error> {
        sqlx::query_as::<_, VotingItem>(
            "select id, session_id, election_id, title, description, item_type, \
                allow_abstain, max_selections, position \
            from voting_item where id = $1",
        ).bind(id)
        .fetch_optional(&mut self.tx)
        .await
    }

    pub async fn select_voting_items(&mut self, election_id: &str) -> Result<Vec<VotingItem>, sqlx::Error> {
        sqlx::query_as::<_, VotingItem>(
            "select id, session_id, election_id, title, description, item_type, \
                allow_abstain, max_selections, position \
            from voting_item where election_id = $1 order by session_id, position",
        ).bind(election_id)
        .fetch_all(&mut self.tx)
        .await
    }

    pub async fn insert_option(&mut self, option: &VotingOption) -> Result<PgDone, sqlx::Error> {
        sqlx::query(
            "insert into voting_option(id, voting_item_id, value, description, position) \
                values ($1, $2, $3, $4, $5)"
        ).bind(&option.id)
        .bind(&option.voting_item_id)
        .bind(&option.value)
        .bind(&option.description)
        .bind(option.position)
        .execute(&mut self.tx)
        .await
    }

    pub async fn select_options(&mut self, voting_item_id: &str) -> Result<Vec<VotingOption>, sqlx::Error> {
        sqlx::query_as::<_, VotingOption>(
            "select id, voting_item_id, value, description, position \
            from voting_option where voting_item_id = $1 order by position",
        ).bind(voting_item_id)
        .fetch_all(&mut self.tx)
        .await
    }

    pub async fn select_election_options(&mut self, election_id: &str) -> Result<Vec<VotingOption>, sqlx::Error> {
        sqlx::query_as::<_, VotingOption>(
            "select o.id, o.voting_item_id, o.value, o.description, o.position \
            from voting_option o join voting_item i on i.id = o.voting_item_id \
            where i.election_id = $1 order by o.voting_item_id, o.position",
        ).bind(election_id)
        .fetch_all(&mut self.tx)
        .await
    }

    pub async fn insert_voter(&mut self, voter: &Voter) -> Result<Voter, sqlx::Error> {
        sqlx::query_as::<_, Voter>(
            "insert into voter(id, election_id, name, email, has_voted) \
                values ($1, $2, $3, $4, $5 or exists( \
                    select 1 from election_ballot where election_id = $2 and voter_id = $1)) \
            returning id, election_id, name, email, has_voted"
        ).bind(&voter.id)
        .bind(&voter.election_id)
        .bind(&voter.name)
        .bind(&voter.email)
        .bind(voter.has_voted)
        .fetch_one(&mut self.tx)
        .await
    }

    pub async fn select_voter(&mut self, election_id: &str, id: &str) -> Result<Option<Voter>, sqlx::Error> {
        sqlx::query_as::<_, Voter>(
            "select id, election_id, name, email, has_voted from voter \
            where election_id = $1 and id = $2"
        ).bind(election_id)
        .bind(id)
        .fetch_optional(&mut self.tx)
        .await
    }

    pub async fn voter_exists(&mut self, id: &str) -> Result<bool, sqlx::Error> {
        let row: (bool,) = sqlx::query_as("select exists(select 1 from voter where id = $1)")
            .bind(id)
            .fetch_one(&mut self.tx)
            .await?;
        Ok(row.0)
    }

    pub async fn select_voters(&mut self, election_id: &str) -> Result<Vec<Voter>, sqlx::Error> {
        sqlx::query_as::<_, Voter>(
            "select id, election_id, name, email, has_voted from voter \
            where election_id = $1 order by name, id"
        ).bind(election_id)
        .fetch_all(&mut self.tx)
        .await
    }

    pub async fn delete_voter(&mut self, election_id: &str, id: &str) -> Result<bool, sqlx::Error> {
        let done = sqlx::query("delete from voter where election_id = $1 and id = $2")
            .bind(election_id)
            .bind(id)
            .execute(&mut self.tx)
            .await?;
        Ok(done.rows_affected() == 1)
    }

    /// Flips `has_voted`; false when the voter row is gone.
    pub async fn mark_voted(&mut self, election_id: &str, voter_id: &str) -> Result<bool, sqlx::Error> {
        let done = sqlx::query("update voter set has_voted = true where election_id = $1 and id = $2")
            .bind(election_id)
            .bind(voter_id)
            .execute(&mut self.tx)
            .await?;
        Ok(done.rows_affected() == 1)
    }

    /// Reads the session status under a share lock, which a concurrent
    /// status update has to wait for. None when the session is gone.
    pub async fn lock_session_status(&mut self, session_id: &str) -> Result<Option<Status>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as(
            "select status from election_session where id = $1 for share"
        ).bind(session_id)
        .fetch_optional(&mut self.tx)
        .await?;
        row.map(|(status,)| status.parse::<Status>()
                .map_err(|e| sqlx::Error::Decode(format!("column status: {}", e).into())))
            .transpose()
    }

    pub async fn insert_ballot(&mut self, ballot: &Ballot) -> Result<PgDone, sqlx::Error> {
        sqlx::query(
            "insert into election_ballot(election_id, voter_id, voting_item_id, voting_session_id, \
                    abstain, cast_at) \
                values ($1, $2, $3, $4, $5, $6)"
        ).bind(&ballot.election_id)
        .bind(&ballot.voter_id)
        .bind(&ballot.voting_item_id)
        .bind(&ballot.voting_session_id)
        .bind(ballot.abstain)
        .bind(ballot.cast_at)
        .execute(&mut self.tx)
        .await
    }

    pub async fn select_ballots(&mut self, voting_item_id: &str) -> Result<Vec<Ballot>, sqlx::Error> {
        sqlx::query_as::<_, Ballot>(
            "select election_id, voter_id, voting_item_id, voting_session_id, abstain, cast_at \
            from election_ballot where voting_item_id = $1"
        ).bind(voting_item_id)
        .fetch_all(&mut self.tx)
        .await
    }

    pub async fn select_election_ballots(&mut self, election_id: &str) -> Result<Vec<Ballot>, sqlx::Error> {
        sqlx::query_as::<_, Ballot>(
            "select election_id, voter_id, voting_item_id, voting_session_id, abstain, cast_at \
            from election_ballot where election_id = $1"
        ).bind(election_id)
        .fetch_all(&mut self.tx)
        .await
    }

    pub async fn insert_vote(&mut self, vote: &Vote) -> Result<PgDone, sqlx::Error> {
        sqlx::query(
            "insert into election_vote(id, option_id, voter_id, election_id, voting_session_id, \
                    voting_item_id, cast_at) \
                values ($1, $2, $3, $4, $5, $6, $7)"
        ).bind(&vote.id)
        .bind(&vote.option_id)
        .bind(&vote.voter_id)
        .bind(&vote.election_id)
        .bind(&vote.voting_session_id)
        .bind(&vote.voting_item_id)
        .bind(vote.cast_at)
        .execute(&mut self.tx)
        .await
    }

    pub async fn select_votes(&mut self, voting_item_id: &str) -> Result<Vec<Vote>, sqlx::Error> {
        sqlx::query_as::<_, Vote>(
            "select id, option_id, voter_id, election_id, voting_session_id, voting_item_id, cast_at \
            from election_vote where voting_item_id = $1"
        ).bind(voting_item_id)
        .fetch_all(&mut self.tx)
        .await
    }

    pub async fn select_election_votes(&mut self, election_id: &str) -> Result<Vec<Vote>, sqlx::Error> {
        sqlx::query_as::<_, Vote>(
            "select id, option_id, voter_id, election_id, voting_session_id, voting_item_id, cast_at \
            from election_vote where election_id = $1"
        ).bind(election_id)
        .fetch_all(&mut self.tx)
        .await
    }

    pub async fn commit(self)-> Result<(), sqlx::Error> {
        self.tx.commit().await
    }
}
