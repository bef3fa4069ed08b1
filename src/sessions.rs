//! Bearer-token sessions backed by `session:{token}` documents.
//!
//! Being signed in means a request carries a token whose session document
//! exists, has not expired, and still points at a live user.

use spin_sdk::http::{Request, Response};
use uuid::Uuid;

use crate::config::{session_expiration_hours, session_key};
use crate::core::db::DocStore;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, now_iso};
use crate::models::models::Session;
use crate::users::{find_by_username, validate_user, Credential};

fn bearer_token(req: &Request) -> Option<&str> {
    let auth_header = req.header("Authorization")?.as_str()?;
    auth_header.strip_prefix("Bearer ")
}

/// Resolve the session for a request, or `None` when not signed in.
pub fn current_session<S: DocStore>(store: &S, req: &Request) -> Option<Session> {
    let token = bearer_token(req)?;
    let session: Session = store.get_json(&session_key(token)).ok()??;

    if let Ok(created) = chrono::DateTime::parse_from_rfc3339(&session.created_at) {
        let age_hours = (chrono::Utc::now() - created.with_timezone(&chrono::Utc)).num_hours();
        if age_hours > session_expiration_hours() {
            return None;
        }
    }

    // The account may have vanished since the token was issued.
    find_by_username(store, &session.username).ok()??;
    Some(session)
}

/// POST /api/login
pub fn handle_login<S: DocStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let creds: serde_json::Value = serde_json::from_slice(req.body())?;
    let username = creds["username"].as_str().unwrap_or_default();
    let password = creds["password"].as_str().unwrap_or_default();

    match validate_user(store, username, password)? {
        Credential::Valid { username, user_id } => {
            let token = Uuid::new_v4().to_string();
            let session = Session {
                username: username.clone(),
                user_id,
                created_at: now_iso(),
            };
            store.set_json(&session_key(&token), &session)?;

            json_response(
                200,
                &serde_json::json!({
                    "token": token,
                    "username": username,
                    "message": "Welcome to SlugFest!"
                }),
            )
        }
        Credential::NoSuchUser => {
            tracing::debug!(username, "login for unknown account");
            Ok(ApiError::Unauthorized.into())
        }
        Credential::BadPassword => {
            tracing::debug!(username, "login with bad password");
            Ok(ApiError::Unauthorized.into())
        }
    }
}

/// GET /api/logout
pub fn handle_logout<S: DocStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    if current_session(store, req).is_none() {
        return Ok(ApiError::Unauthorized.into());
    }
    if let Some(token) = bearer_token(req) {
        store.delete(&session_key(token))?;
    }
    json_response(200, &serde_json::json!({ "message": "Goodbye!" }))
}
