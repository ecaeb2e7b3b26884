use std::future::{Ready, ready};

use actix_web::{FromRequest, HttpRequest};
use actix_web::dev::Payload;
use actix_web::web::Data;
use sha2::{Digest, Sha256};

use crate::model::Identity;
use super::errors::Unauthenticated;

pub const VOTER_KEY: &str = "VOTER-KEY";
pub const ADMIN_KEY: &str = "ADMIN-KEY";

/// Shared secret admins present in the `ADMIN-KEY` header.
#[derive(Clone)]
pub struct AdminKey(pub String);

/// Extractor that only succeeds for requests carrying the admin key.
#[derive(Debug)]
pub struct Admin;

fn header<'a>(req: &'a HttpRequest, name: &str) -> Result<Option<&'a str>, Unauthenticated> {
    req.headers()
        .get(name)
        .map(|value| value
            .to_str()
            .map(str::trim)
            .map_err(|_| Unauthenticated(format!("Failed to handle header value for {}", name))))
        .transpose()
}

/// Compares SHA-256 digests without an early exit, so the time taken does
/// not depend on where the keys differ or on the presented key's length.
fn keys_match(expected: &str, presented: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let presented = Sha256::digest(presented.as_bytes());
    let diff = expected.iter()
        .zip(presented.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b));
    diff == 0
}

fn check_admin(req: &HttpRequest, presented: &str) -> Result<(), Unauthenticated> {
    let expected = req.app_data::<Data<AdminKey>>()
        .ok_or_else(|| {
            error!("No admin key configured");
            Unauthenticated("Admin access is not configured".to_owned())
        })?;
    if expected.0.is_empty() || !keys_match(&expected.0, presented) {
        warn!("Rejected admin request to {}", req.path());
        return Err(Unauthenticated(format!("Invalid header: {}", ADMIN_KEY)));
    }
    Ok(())
}

fn identify(req: &HttpRequest) -> Result<Identity, Unauthenticated> {
    if let Some(key) = header(req, ADMIN_KEY)? {
        check_admin(req, key)?;
        return Ok(Identity::Admin);
    }
    match header(req, VOTER_KEY)? {
        Some(voter_id) if !voter_id.is_empty() => Ok(Identity::Voter(voter_id.to_owned())),
        _ => Err(Unauthenticated(format!("Missing header: {}", VOTER_KEY))),
    }
}

impl FromRequest for Identity {
    type Error = Unauthenticated;
    type Future = Ready<Result<Self, Self::Error>>;
    type Config = ();

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(identify(req))
    }
}

impl FromRequest for Admin {
    type Error = Unauthenticated;
    type Future = Ready<Result<Self, Self::Error>>;
    type Config = ();

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let admin = header(req, ADMIN_KEY)
            .and_then(|key| key.ok_or_else(|| Unauthenticated(format!("Missing header: {}", ADMIN_KEY))))
            .and_then(|key| check_admin(req, key))
            .map(|_| Admin);
        ready(admin)
    }
}
