#[macro_use]
extern crate log;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer};
use sqlx::postgres::PgPoolOptions;

use config::{Config, Storage};
use db::{BisoDb, ElectionStore, MemoryDb};
use events::{VoteEvent, VoteFeed};
use operations::ElectionOperations;
use paths::AdminKey;

mod config;
mod db;
mod events;
mod model;
mod operations;
mod paths;
mod state;
mod tally;
mod util;

async fn new_store(config: &Config) -> Arc<dyn ElectionStore> {
    match &config.storage {
        Storage::Postgres(db_url) => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(config.max_connections)
                .connect_timeout(Duration::from_secs(2))
                .test_before_acquire(true)
                .connect(db_url)
                .await
                .expect("Failed to create database pool");
            let db = BisoDb::new(pool);
            db.ensure_schema()
                .await
                .expect("Failed to apply database schema");
            Arc::new(db)
        }
        Storage::Memory => Arc::new(MemoryDb::new()),
    }
}

#[actix_web::main]
async fn main() {
    env_logger::init();
    let config = Config::from_env().expect("Failed to read configuration");

    let db = new_store(&config).await;
    let feed = VoteFeed::new();
    feed.on_vote_created(|event| match event {
        VoteEvent::BallotCast { election_id, voting_item_id, voter_id, abstain, .. } => {
            info!("Ballot cast election_id={},voting_item_id={},voter_id={},abstain={}",
                election_id, voting_item_id, voter_id, abstain);
        }
    });

    let ops = ElectionOperations::new(db, feed);
    let admin_key = AdminKey(config.admin_key.clone());
    let app = move || {
        App::new()
            .data(ops.clone())
            .data(admin_key.clone())
            .configure(paths::config::<ElectionOperations>)
    };

    info!("Listening on {}", config.bind_addr);
    HttpServer::new(app).bind(config.bind_addr.as_str())
        .expect("HTTP server failed to bind")
        .run()
        .await
        .expect("HTTP Server failed to run");
}
