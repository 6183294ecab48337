//! Authentication middleware
//!
//! Bearer-token validation and role extraction. Session issuance lives in
//! the out-of-scope auth service; this middleware only validates tokens it
//! issued and derives the request principal from the claims.

use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::ErrorResponse;

/// Role carried in the token
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Vendor,
    Delivery,
}

/// Authenticated principal extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: uuid::Uuid,
    pub tenant_id: uuid::Uuid,
    pub role: Role,
    /// Present for vendor principals only
    pub shop_id: Option<uuid::Uuid>,
}

impl AuthUser {
    /// Shop id of a vendor principal, or a forbidden error
    pub fn require_shop(&self) -> Result<uuid::Uuid, crate::error::AppError> {
        match (self.role, self.shop_id) {
            (Role::Vendor, Some(shop_id)) => Ok(shop_id),
            _ => Err(crate::error::AppError::Forbidden(
                "Vendor account required".to_string(),
            )),
        }
    }

    pub fn require_role(&self, role: Role) -> Result<(), crate::error::AppError> {
        if self.role == role {
            Ok(())
        } else {
            Err(crate::error::AppError::Forbidden(format!(
                "Requires {:?} role",
                role
            )))
        }
    }
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => {
            return unauthorized_response("Missing or invalid Authorization header");
        }
    };

    // Secret from environment; middleware runs without router state
    let jwt_secret = std::env::var("MKT__JWT__SECRET")
        .or_else(|_| std::env::var("MKT_JWT_SECRET"))
        .unwrap_or_else(|_| "development-secret-key".to_string());

    let claims = match decode_jwt(token, &jwt_secret) {
        Ok(claims) => claims,
        Err(msg) => {
            return unauthorized_response(&msg);
        }
    };

    let user_id = match uuid::Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => return unauthorized_response("Invalid user ID in token"),
    };

    let tenant_id = match uuid::Uuid::parse_str(&claims.tenant_id) {
        Ok(id) => id,
        Err(_) => return unauthorized_response("Invalid tenant ID in token"),
    };

    let shop_id = match claims.shop_id.as_deref() {
        None => None,
        Some(raw) => match uuid::Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => return unauthorized_response("Invalid shop ID in token"),
        },
    };

    let auth_user = AuthUser {
        user_id,
        tenant_id,
        role: claims.role,
        shop_id,
    };

    request.extensions_mut().insert(auth_user);

    next.run(request).await
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    tenant_id: String,
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    shop_id: Option<String>,
    exp: i64,
    iat: i64,
}

/// Decode and validate JWT token
fn decode_jwt(token: &str, secret: &str) -> Result<Claims, String> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {}", e))
}

/// Create unauthorized response
fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("UNAUTHORIZED", message)),
    )
        .into_response()
}

/// Extractor for the authenticated principal
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse::new("UNAUTHORIZED", "Authentication required")),
                )
            })
    }
}
