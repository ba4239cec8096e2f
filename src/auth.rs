//! Bearer-token authentication and the shared authorization policy.
//!
//! The core trusts the claims of a verified token verbatim (the auth
//! collaborator owns registration and credential management). Authorization
//! for lifecycle operations goes through one policy function, reused by both
//! the order and return managers.

use crate::{entities::user::Role, errors::ServiceError, AppState};
use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use chrono::{Duration, Utc};
use http::{header, request::Parts};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub exp: i64,
}

/// Verified requester identity, extracted from the Authorization header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            role: claims.role,
            email: claims.email,
            name: claims.name,
            phone: claims.phone,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);

        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::AuthError("Missing authorization header".into()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::AuthError("Expected bearer token".into()))?;

        let claims = decode_token(token, &app.config.jwt_secret)?;
        Ok(AuthUser::from(claims))
    }
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, ServiceError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ServiceError::AuthError(format!("Invalid token: {}", e)))?;

    Ok(data.claims)
}

/// Issues a signed token for the given identity. Used by tests and tooling;
/// production tokens come from the auth collaborator.
pub fn issue_token(user: &AuthUser, secret: &str, ttl: Duration) -> Result<String, ServiceError> {
    let claims = Claims {
        sub: user.id,
        role: user.role,
        email: user.email.clone(),
        name: user.name.clone(),
        phone: user.phone.clone(),
        exp: (Utc::now() + ttl).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::AuthError(format!("Failed to sign token: {}", e)))
}

/// Actions gated by the authorization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Assign a transporter to an order or return (staff)
    AssignTransporter,
    /// Reject a processing order or return (staff)
    Reject,
    /// Confirm an external payment (staff; stands in for the gateway callback)
    ConfirmPayment,
    /// Cancel an owned order or return
    Cancel,
    /// Read a single order or return
    View,
    /// List with arbitrary filters
    ListAll,
}

/// Single authorization policy for both lifecycle managers.
///
/// `resource_owner` is the owning user of the resource under access, when one
/// exists. Staff pass everything; owners pass owner-scoped actions; everyone
/// else is denied.
pub fn authorize(
    requester: &AuthUser,
    action: Action,
    resource_owner: Option<Uuid>,
) -> Result<(), ServiceError> {
    if requester.role.is_staff() {
        return Ok(());
    }

    let allowed = match action {
        Action::AssignTransporter | Action::Reject | Action::ConfirmPayment | Action::ListAll => {
            false
        }
        Action::Cancel | Action::View => resource_owner == Some(requester.id),
    };

    if allowed {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "role {} may not perform this action",
            requester.role
        )))
    }
}
