//! Authentication middleware
//!
//! Bearer JWT only. A valid token resolves to an [`AuthAccount`] extension;
//! everything downstream trusts that extension and never re-reads the header.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// JWT claims carried by merchant tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: Uuid,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// The authenticated merchant account, inserted as a request extension.
#[derive(Debug, Clone, Copy)]
pub struct AuthAccount {
    pub account_id: Uuid,
}

/// Extract bearer token from the Authorization header.
fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(String::from)
}

/// Middleware that requires a valid merchant JWT.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(token) = extract_bearer_token(&request) else {
        tracing::warn!(path = %path, "Request without bearer token");
        return ApiError::MissingAuth.into_response();
    };

    match decode_account(&token, &state.decoding_key) {
        Ok(account) => {
            request.extensions_mut().insert(account);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "Token rejected");
            err.into_response()
        }
    }
}

fn decode_account(token: &str, key: &DecodingKey) -> Result<AuthAccount, ApiError> {
    let data = decode::<Claims>(token, key, &Validation::default())
        .map_err(|_| ApiError::InvalidToken)?;
    Ok(AuthAccount {
        account_id: data.claims.sub,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &[u8] = b"test-secret-test-secret-test-secret";

    fn token_for(account_id: Uuid, exp: i64) -> String {
        encode(
            &Header::default(),
            &Claims {
                sub: account_id,
                exp,
            },
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_decodes_to_account() {
        let account_id = Uuid::new_v4();
        let exp = time::OffsetDateTime::now_utc().unix_timestamp() + 3600;
        let token = token_for(account_id, exp);

        let account = decode_account(&token, &DecodingKey::from_secret(SECRET)).unwrap();
        assert_eq!(account.account_id, account_id);
    }

    #[test]
    fn test_expired_token_rejected() {
        let exp = time::OffsetDateTime::now_utc().unix_timestamp() - 3600;
        let token = token_for(Uuid::new_v4(), exp);

        assert!(decode_account(&token, &DecodingKey::from_secret(SECRET)).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let exp = time::OffsetDateTime::now_utc().unix_timestamp() + 3600;
        let token = token_for(Uuid::new_v4(), exp);

        let other = DecodingKey::from_secret(b"other-secret-other-secret-other-secret");
        assert!(decode_account(&token, &other).is_err());
    }
}
