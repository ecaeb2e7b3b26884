use std::fmt::Display;

use actix_web::{HttpRequest, HttpResponse, ResponseError};
use actix_web::error::{Error, InternalError, JsonPayloadError, QueryPayloadError};
use actix_web::http::StatusCode;
use thiserror::Error;

use crate::model::ErrorResponse;
use crate::operations::{BallotError, ElectionError, VoterError};

#[derive(Error, Debug)]
#[error("{0}")]
pub struct Unauthenticated(pub String);

fn error_body(status: StatusCode, kind: &str, error: &impl Display) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: kind.to_owned(),
        message: error.to_string(),
    })
}

fn invalid_request<E>(error: E, req: &HttpRequest) -> Error
where E: Display + std::fmt::Debug + 'static {
    warn!("Rejected malformed request to {}: {}", req.path(), error);
    let response = error_body(StatusCode::BAD_REQUEST, "Invalid", &error);
    InternalError::from_response(error, response).into()
}

pub fn invalid_json(error: JsonPayloadError, req: &HttpRequest) -> Error {
    invalid_request(error, req)
}

pub fn invalid_query(error: QueryPayloadError, req: &HttpRequest) -> Error {
    invalid_request(error, req)
}

impl ResponseError for Unauthenticated {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        error_body(self.status_code(), "Unauthenticated", self)
    }
}

impl BallotError {
    fn kind(&self) -> &'static str {
        match self {
            BallotError::Unauthenticated => "Unauthenticated",
            BallotError::VotingItemNotFound => "VotingItemNotFound",
            BallotError::VoterMismatch => "VoterMismatch",
            BallotError::VotingClosed => "VotingClosed",
            BallotError::InvalidSelectionCount { .. } => "InvalidSelectionCount",
            BallotError::DuplicateSelection(_) => "DuplicateSelection",
            BallotError::OptionNotFound(_) => "OptionNotFound",
            BallotError::DuplicateVote => "DuplicateVote",
            BallotError::Storage => "StorageError",
        }
    }
}

impl ResponseError for BallotError {
    fn status_code(&self) -> StatusCode {
        match self {
            BallotError::Unauthenticated => StatusCode::UNAUTHORIZED,
            BallotError::VotingItemNotFound => StatusCode::NOT_FOUND,
            BallotError::VoterMismatch => StatusCode::FORBIDDEN,
            BallotError::VotingClosed | BallotError::DuplicateVote => StatusCode::CONFLICT,
            BallotError::InvalidSelectionCount { .. }
            | BallotError::DuplicateSelection(_)
            | BallotError::OptionNotFound(_) => StatusCode::BAD_REQUEST,
            BallotError::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        error_body(self.status_code(), self.kind(), self)
    }
}

impl ElectionError {
    fn kind(&self) -> &'static str {
        match self {
            ElectionError::ElectionNotFound => "ElectionNotFound",
            ElectionError::SessionNotFound => "SessionNotFound",
            ElectionError::VotingItemNotFound => "VotingItemNotFound",
            ElectionError::InvalidTransition(_) => "InvalidTransition",
            ElectionError::SessionNotUpcoming => "SessionNotUpcoming",
            ElectionError::Invalid(_) => "Invalid",
            ElectionError::Storage => "StorageError",
        }
    }
}

impl ResponseError for ElectionError {
    fn status_code(&self) -> StatusCode {
        match self {
            ElectionError::ElectionNotFound
            | ElectionError::SessionNotFound
            | ElectionError::VotingItemNotFound => StatusCode::NOT_FOUND,
            ElectionError::InvalidTransition(_) | ElectionError::SessionNotUpcoming => StatusCode::CONFLICT,
            ElectionError::Invalid(_) => StatusCode::BAD_REQUEST,
            ElectionError::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        error_body(self.status_code(), self.kind(), self)
    }
}

impl VoterError {
    fn kind(&self) -> &'static str {
        match self {
            VoterError::ElectionNotFound => "ElectionNotFound",
            VoterError::VoterNotFound => "VoterNotFound",
            VoterError::EmptyName => "EmptyName",
            VoterError::Conflict(_) => "Conflict",
            VoterError::Storage => "StorageError",
        }
    }
}

impl ResponseError for VoterError {
    fn status_code(&self) -> StatusCode {
        match self {
            VoterError::ElectionNotFound | VoterError::VoterNotFound => StatusCode::NOT_FOUND,
            VoterError::EmptyName => StatusCode::BAD_REQUEST,
            VoterError::Conflict(_) => StatusCode::CONFLICT,
            VoterError::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        error_body(self.status_code(), self.kind(), self)
    }
}
