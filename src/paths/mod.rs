mod errors;
mod identity;

use errors::{invalid_json, invalid_query};

pub use identity::{Admin, AdminKey, ADMIN_KEY, VOTER_KEY};

use actix_web::{HttpResponse, Result, web};
use actix_web::web::{Bytes, Data, Json, JsonConfig, Path, Query, QueryConfig, ServiceConfig};
use tokio::sync::broadcast::RecvError;

use crate::model::*;
use crate::operations::ElectionOperationsT;
use crate::tally::ItemTally;

const ELECTIONS_PATH: &str = "/elections";
const ELECTION_PATH: &str = "/elections/{election_id}";
const ELECTION_STATUS_PATH: &str = "/elections/{election_id}/status";
const SESSIONS_PATH: &str = "/elections/{election_id}/sessions";
const SESSION_STATUS_PATH: &str = "/sessions/{session_id}/status";
const ITEMS_PATH: &str = "/sessions/{session_id}/items";
const VOTERS_PATH: &str = "/elections/{election_id}/voters";
const NON_VOTERS_PATH: &str = "/elections/{election_id}/non-voters";
const VOTER_PATH: &str = "/elections/{election_id}/voters/{voter_id}";
const BALLOT_PATH: &str = "/items/{item_id}/ballot";
const TALLY_PATH: &str = "/items/{item_id}/tally";
const PARTICIPATION_PATH: &str = "/elections/{election_id}/participation";
const RESULTS_PATH: &str = "/elections/{election_id}/results";
const VOTE_STREAM_PATH: &str = "/elections/{election_id}/votes/stream";

async fn post_election_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    _admin: Admin,
    body: Json<PostElectionRequest>) -> Result<Json<ElectionSummary>>
{
    let Json(request_body) = body;
    let election = ops.post_election(&request_body).await?;
    Ok(Json(election))
}

async fn list_elections_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    query: Query<CampusQuery>) -> Result<Json<Vec<ElectionSummary>>>
{
    let elections = ops.list_elections(query.into_inner().campus).await?;
    Ok(Json(elections))
}

async fn get_election_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    path: Path<String>) -> Result<Json<GetElectionResponse>>
{
    let election = ops.get_election(&path).await?;
    Ok(Json(election))
}

async fn put_election_status_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    _admin: Admin,
    path: Path<String>,
    body: Json<PutStatusRequest>) -> Result<Json<ElectionSummary>>
{
    let election = ops.put_election_status(&path, body.status).await?;
    Ok(Json(election))
}

async fn post_session_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    _admin: Admin,
    path: Path<String>,
    body: Json<PostSessionRequest>) -> Result<Json<SessionSummary>>
{
    let Json(request_body) = body;
    let session = ops.post_session(&path, &request_body).await?;
    Ok(Json(session))
}

async fn put_session_status_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    _admin: Admin,
    path: Path<String>,
    body: Json<PutStatusRequest>) -> Result<Json<SessionSummary>>
{
    let session = ops.put_session_status(&path, body.status).await?;
    Ok(Json(session))
}

async fn post_voting_item_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    _admin: Admin,
    path: Path<String>,
    body: Json<PostVotingItemRequest>) -> Result<Json<VotingItemSummary>>
{
    let Json(request_body) = body;
    let item = ops.post_voting_item(&path, &request_body).await?;
    Ok(Json(item))
}

async fn post_voter_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    _admin: Admin,
    path: Path<String>,
    body: Json<PostVoterRequest>) -> Result<Json<VoterSummary>>
{
    let Json(request_body) = body;
    let voter = ops.post_voter(&path, &request_body).await?;
    Ok(Json(voter))
}

async fn list_voters_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    _admin: Admin,
    path: Path<String>) -> Result<Json<Vec<VoterSummary>>>
{
    let voters = ops.list_voters(&path).await?;
    Ok(Json(voters))
}

async fn list_non_voters_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    _admin: Admin,
    path: Path<String>) -> Result<Json<Vec<VoterSummary>>>
{
    let voters = ops.list_non_voters(&path).await?;
    Ok(Json(voters))
}

async fn delete_voter_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    _admin: Admin,
    path: Path<(String, String)>) -> Result<HttpResponse>
{
    let (election_id, voter_id) = path.into_inner();
    ops.delete_voter(&election_id, &voter_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn post_ballot_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    identity: Identity,
    path: Path<String>,
    body: Json<PostBallotRequest>) -> Result<Json<PostBallotResponse>>
{
    let Json(request_body) = body;
    let ballot = ops.post_ballot(&identity, &path, &request_body).await?;
    Ok(Json(ballot))
}

async fn get_tally_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    _admin: Admin,
    path: Path<String>) -> Result<Json<ItemTally>>
{
    let tally = ops.get_tally(&path).await?;
    Ok(Json(tally))
}

async fn get_participation_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    _admin: Admin,
    path: Path<String>) -> Result<Json<ParticipationResponse>>
{
    let participation = ops.get_participation(&path).await?;
    Ok(Json(participation))
}

async fn get_results_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    _admin: Admin,
    path: Path<String>) -> Result<Json<ElectionResultsResponse>>
{
    let results = ops.get_results(&path).await?;
    Ok(Json(results))
}

/// Server-sent events for one election's ballots, for live dashboards.
async fn vote_stream_handler<A: 'static + ElectionOperationsT>(
    ops: Data<A>,
    _admin: Admin,
    path: Path<String>) -> HttpResponse
{
    let election_id = path.into_inner();
    let receiver = ops.subscribe_votes();

    let events = futures::stream::unfold(receiver, move |mut receiver| {
        let election_id = election_id.clone();
        async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.election_id() == election_id => {
                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                let frame = Bytes::from(format!("data: {}\n\n", json));
                                return Some((Ok::<_, actix_web::Error>(frame), receiver));
                            }
                            Err(e) => error!("Failed to serialize vote event: {:?}", e),
                        }
                    }
                    Ok(_) => (),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Vote stream for election_id={} skipped {} events", election_id, skipped);
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .streaming(Box::pin(events))
}

pub fn config<A: 'static + ElectionOperationsT>(cfg: &mut ServiceConfig) {
    let routes = web::scope("")
        .app_data(JsonConfig::default().error_handler(invalid_json))
        .app_data(QueryConfig::default().error_handler(invalid_query))
        .route(ELECTIONS_PATH, web::post().to(post_election_handler::<A>))
        .route(ELECTIONS_PATH, web::get().to(list_elections_handler::<A>))
        .route(ELECTION_PATH, web::get().to(get_election_handler::<A>))
        .route(ELECTION_STATUS_PATH, web::put().to(put_election_status_handler::<A>))
        .route(SESSIONS_PATH, web::post().to(post_session_handler::<A>))
        .route(SESSION_STATUS_PATH, web::put().to(put_session_status_handler::<A>))
        .route(ITEMS_PATH, web::post().to(post_voting_item_handler::<A>))
        .route(VOTERS_PATH, web::post().to(post_voter_handler::<A>))
        .route(VOTERS_PATH, web::get().to(list_voters_handler::<A>))
        .route(NON_VOTERS_PATH, web::get().to(list_non_voters_handler::<A>))
        .route(VOTER_PATH, web::delete().to(delete_voter_handler::<A>))
        .route(BALLOT_PATH, web::post().to(post_ballot_handler::<A>))
        .route(TALLY_PATH, web::get().to(get_tally_handler::<A>))
        .route(PARTICIPATION_PATH, web::get().to(get_participation_handler::<A>))
        .route(RESULTS_PATH, web::get().to(get_results_handler::<A>))
        .route(VOTE_STREAM_PATH, web::get().to(vote_stream_handler::<A>));
    cfg.service(routes);
}
