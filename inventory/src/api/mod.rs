//! HTTP API for the inventory service.
//!
//! Handlers are grouped by concern:
//! - Inventory: status, availability, ticket types, adjustments, sweeps
//! - Holds: create, release, extend, update, timers, session holds
//! - Purchases: sales and refunds
//! - Ledger: transactions and alerts
//! - Bulk: batch operations
//!
//! Every handler takes a [`Session`], built from the request headers:
//! - `Authorization: Bearer <token>`: required, resolved to an identity
//! - `X-Session-ID`: the checkout session the caller's holds belong to
//! - `X-Act-As`: email of a user to impersonate (audited)

pub mod bulk;
pub mod holds;
pub mod idempotency;
pub mod inventory;
pub mod ledger;
pub mod purchases;

pub use idempotency::{ApiResponse, Idempotency, IdempotencyCache};

use crate::access::SessionContext;
use crate::server::state::AppState;
use crate::types::SessionId;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use boxoffice_web::{AppError, BearerToken};

/// Header naming the caller's checkout session
pub const SESSION_ID_HEADER: &str = "X-Session-ID";

/// Header naming a user to impersonate
pub const ACT_AS_HEADER: &str = "X-Act-As";

/// Authenticated request context.
#[derive(Debug, Clone)]
pub struct Session(pub SessionContext);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, AppError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(str::trim)
                .map_err(|_| AppError::bad_request(format!("Invalid {name} header")))
        })
        .transpose()
        .map(|value| value.filter(|v| !v.is_empty()))
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;

        let identity = state
            .resolver
            .resolve_token(&token)
            .await
            .ok_or_else(|| AppError::unauthorized("Unknown or expired token"))?;

        let session_id = header(parts, SESSION_ID_HEADER)?.map(SessionId::new);
        let context = SessionContext::new(identity, session_id);

        let Some(email) = header(parts, ACT_AS_HEADER)? else {
            return Ok(Self(context));
        };

        let target = state
            .resolver
            .resolve_email(email)
            .await
            .ok_or_else(|| AppError::not_found("User", email))?;

        let context = state.service.policy().impersonate(context, target)?;
        Ok(Self(context))
    }
}
