use spin_sdk::http::{Request, Response};
use uuid::Uuid;

use crate::config::*;
use crate::core::db::{insert_user, DocStore};
use crate::core::errors::ApiError;
use crate::core::helpers::{
    hash_password, json_response, now_iso, sanitize_text, validate_id, verify_password,
};
use crate::core::query_params::{get_string, parse_query_params};
use crate::models::models::{User, UserView};
use crate::sessions::current_session;

pub enum RegisterOutcome {
    Created(Box<User>),
    UsernameTaken,
}

/// Credential check result. A missing account is reported as its own case
/// so verification is never attempted against a record that does not exist.
pub enum Credential {
    Valid { username: String, user_id: String },
    NoSuchUser,
    BadPassword,
}

pub(crate) fn find_by_username<S: DocStore>(
    store: &S,
    username: &str,
) -> anyhow::Result<Option<User>> {
    let ids: Vec<String> = store.get_json(USERS_INDEX_KEY)?.unwrap_or_default();
    for id in ids {
        if let Some(user) = store.get_json::<User>(&user_key(&id))? {
            if user.username == username {
                return Ok(Some(user));
            }
        }
    }
    Ok(None)
}

/// Resolve a user by username (with or without the leading `@`) or, when
/// that misses and the identifier is a well-formed id, by id. A malformed
/// id is a miss, not an error.
pub(crate) fn fetch_user<S: DocStore>(
    store: &S,
    identifier: &str,
) -> anyhow::Result<Option<User>> {
    let identifier = identifier.strip_prefix('@').unwrap_or(identifier);
    if let Some(user) = find_by_username(store, identifier)? {
        return Ok(Some(user));
    }
    if validate_id(identifier) {
        return store.get_json(&user_key(identifier));
    }
    Ok(None)
}

pub fn get_user<S: DocStore>(store: &S, identifier: &str) -> anyhow::Result<Option<UserView>> {
    Ok(fetch_user(store, identifier)?
        .as_ref()
        .map(UserView::from_record))
}

pub fn register_user<S: DocStore>(
    store: &S,
    username: &str,
    password: &str,
) -> anyhow::Result<RegisterOutcome> {
    if find_by_username(store, username)?.is_some() {
        tracing::debug!(username, "registration rejected, username taken");
        return Ok(RegisterOutcome::UsernameTaken);
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        name: String::new(),
        description: String::new(),
        email: String::new(),
        created: now_iso(),
        followers_count: 0,
        friends_count: 0,
        favorites_count: 0,
        statuses_count: 0,
        profile_image_url: DEFAULT_PROFILE_IMAGE.to_string(),
        friends: Vec::new(),
        favorited_slimes: Vec::new(),
        password: hash_password(password)?,
    };
    insert_user(store, &user)?;
    Ok(RegisterOutcome::Created(Box::new(user)))
}

pub fn validate_user<S: DocStore>(
    store: &S,
    username: &str,
    password: &str,
) -> anyhow::Result<Credential> {
    let Some(user) = find_by_username(store, username)? else {
        return Ok(Credential::NoSuchUser);
    };
    if verify_password(password, &user.password) {
        Ok(Credential::Valid {
            username: user.username,
            user_id: user.id,
        })
    } else {
        Ok(Credential::BadPassword)
    }
}

/// Update the display name of the authenticated caller only.
pub fn update_display_name<S: DocStore>(
    store: &S,
    name: &str,
    authenticated: &str,
) -> anyhow::Result<Option<UserView>> {
    let Some(mut user) = fetch_user(store, authenticated)? else {
        return Ok(None);
    };
    user.name = name.to_string();
    store.set_json(&user_key(&user.id), &user)?;
    Ok(Some(UserView::from_record(&user)))
}

// === HTTP handlers ===

/// GET /api/user/get.json — `user_id` xor `screen_name`, default self.
pub fn handle_get_user<S: DocStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let Some(session) = current_session(store, req) else {
        return Ok(ApiError::Unauthorized.into());
    };

    let params = parse_query_params(req.uri());
    let user_id = get_string(&params, "user_id");
    let screen_name = get_string(&params, "screen_name");

    let identifier = match (user_id, screen_name) {
        (Some(_), Some(_)) => {
            return Ok(
                ApiError::BadRequest("Provide user_id or screen_name, not both".to_string())
                    .into(),
            )
        }
        (Some(id), None) => id,
        (None, Some(name)) => name,
        (None, None) => session.username,
    };

    match get_user(store, &identifier)? {
        Some(view) => json_response(200, &view),
        None => Ok(ApiError::BadRequest("User not found".to_string()).into()),
    }
}

/// POST /api/user/create.json — open registration, duplicate names rejected.
pub fn handle_create_user<S: DocStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let body: serde_json::Value = serde_json::from_slice(req.body())?;
    let username = body["username"].as_str().unwrap_or("");
    let password = body["password"].as_str().unwrap_or("");

    if username.len() < MIN_USERNAME_LENGTH || username.len() > MAX_USERNAME_LENGTH {
        return Ok(ApiError::BadRequest("Username must be 3-50 characters".to_string()).into());
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Ok(ApiError::BadRequest("Password too short".to_string()).into());
    }

    let username = sanitize_text(username);
    match register_user(store, &username, password)? {
        RegisterOutcome::Created(user) => json_response(201, &UserView::from_record(&user)),
        RegisterOutcome::UsernameTaken => {
            Ok(ApiError::Conflict("Username already taken".to_string()).into())
        }
    }
}

/// PUT /api/user/display-name.json
pub fn handle_update_display_name<S: DocStore>(
    store: &S,
    req: &Request,
) -> anyhow::Result<Response> {
    let Some(session) = current_session(store, req) else {
        return Ok(ApiError::Unauthorized.into());
    };

    let body: serde_json::Value = serde_json::from_slice(req.body())?;
    let Some(display_name) = body["display_name"].as_str() else {
        return Ok(ApiError::BadRequest("display_name is required".to_string()).into());
    };
    if display_name.len() > MAX_DISPLAY_NAME_LENGTH {
        return Ok(ApiError::BadRequest("Display name too long".to_string()).into());
    }

    let display_name = sanitize_text(display_name);
    match update_display_name(store, &display_name, &session.username)? {
        Some(view) => json_response(200, &view),
        None => Ok(ApiError::NotFound("User not found".to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::{fixture_user, insert_user, MemoryStore};

    #[test]
    fn identifier_forms_resolve_to_same_user() {
        let store = MemoryStore::new();
        let ed = fixture_user("ed", "Ed Harcourt", "", "x");
        insert_user(&store, &ed).unwrap();

        let by_name = get_user(&store, "ed").unwrap().unwrap();
        let by_screen_name = get_user(&store, "@ed").unwrap().unwrap();
        let by_id = get_user(&store, &ed.id).unwrap().unwrap();

        assert_eq!(by_name.id_str, ed.id);
        assert_eq!(by_screen_name.id_str, ed.id);
        assert_eq!(by_id.id_str, ed.id);
        assert_eq!(by_name.screen_name, "@ed");
    }

    #[test]
    fn malformed_id_is_a_miss_not_an_error() {
        let store = MemoryStore::new();
        assert!(get_user(&store, "definitely-not-an-id").unwrap().is_none());
        assert!(get_user(&store, "").unwrap().is_none());
    }

    #[test]
    fn view_never_contains_password() {
        let store = MemoryStore::new();
        let ed = fixture_user("ed", "Ed", "", "super-secret-hash");
        insert_user(&store, &ed).unwrap();

        let view = get_user(&store, "ed").unwrap().unwrap();
        let raw = serde_json::to_string(&view).unwrap();
        assert!(!raw.contains("super-secret-hash"));
        assert!(!raw.contains("password"));
    }

    #[test]
    fn duplicate_registration_is_rejected_and_leaves_record_alone() {
        let store = MemoryStore::new();
        let first = match register_user(&store, "slimer", "ectoplasm").unwrap() {
            RegisterOutcome::Created(user) => user,
            RegisterOutcome::UsernameTaken => panic!("fresh username rejected"),
        };

        assert!(matches!(
            register_user(&store, "slimer", "other-password").unwrap(),
            RegisterOutcome::UsernameTaken
        ));

        let stored = fetch_user(&store, "slimer").unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.password, first.password);
    }

    #[test]
    fn registration_zeroes_counters() {
        let store = MemoryStore::new();
        let RegisterOutcome::Created(user) = register_user(&store, "newbie", "pass").unwrap()
        else {
            panic!("expected creation");
        };
        assert_eq!(user.statuses_count, 0);
        assert_eq!(user.favorites_count, 0);
        assert!(user.friends.is_empty());
        assert!(user.favorited_slimes.is_empty());
    }

    #[test]
    fn missing_user_is_distinct_from_bad_password() {
        let store = MemoryStore::new();
        assert!(matches!(
            validate_user(&store, "ghost", "anything").unwrap(),
            Credential::NoSuchUser
        ));

        register_user(&store, "real", "correct-horse").unwrap();
        assert!(matches!(
            validate_user(&store, "real", "wrong").unwrap(),
            Credential::BadPassword
        ));
        assert!(matches!(
            validate_user(&store, "real", "correct-horse").unwrap(),
            Credential::Valid { .. }
        ));
    }

    #[test]
    fn display_name_update_touches_only_name() {
        let store = MemoryStore::new();
        let ed = fixture_user("ed", "Ed", "bio", "x");
        insert_user(&store, &ed).unwrap();

        let view = update_display_name(&store, "Edward", "ed").unwrap().unwrap();
        assert_eq!(view.name, "Edward");

        let stored = fetch_user(&store, "ed").unwrap().unwrap();
        assert_eq!(stored.name, "Edward");
        assert_eq!(stored.description, "bio");
        assert_eq!(stored.username, "ed");
    }
}
