//! Request extractors.
//!
//! Authentication happens upstream; this service trusts the identity headers
//! the auth layer sets and only checks that they are present and well formed.

use std::str::FromStr;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use common::{Actor, UserId, UserRole};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id: UserId = header(parts, USER_ID_HEADER)?
            .parse()
            .map_err(|_| ApiError::Unauthenticated(format!("{USER_ID_HEADER} is not a valid id")))?;
        let role: UserRole = header(parts, USER_ROLE_HEADER)?
            .parse()
            .map_err(|err: common::UnknownRole| {
                ApiError::Unauthenticated(format!("Unknown role '{}'", err.0))
            })?;
        Ok(Caller(Actor::new(user_id, role)))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ApiError::Unauthenticated(format!("Missing {name} header")))
}

/// JSON body whose rejections use the API error envelope.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|err: JsonRejection| ApiError::BadRequest(err.body_text()))?;
        Ok(JsonBody(value))
    }
}

/// Query string whose rejections use the API error envelope.
#[derive(Debug)]
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|err: QueryRejection| ApiError::BadRequest(err.body_text()))?;
        Ok(QueryParams(value))
    }
}

/// Parses a path segment into a typed id.
pub fn parse_id<T: FromStr>(raw: &str, label: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {label} id: {raw}")))
}
