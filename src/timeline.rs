//! Timeline aggregation: the higher-level views composed from Post Store
//! queries. All results are newest first; every aggregate returns `None`
//! when the subject user does not resolve.

use spin_sdk::http::{Request, Response};
use std::collections::HashSet;

use crate::core::db::DocStore;
use crate::core::errors::ApiError;
use crate::core::helpers::json_response;
use crate::core::query_params::{get_count, get_string, parse_query_params};
use crate::models::models::{Slime, SlimeKind, SlimeView, User};
use crate::sessions::current_session;
use crate::slimes::{list_slimes, materialize, sort_newest_first};
use crate::users::fetch_user;

fn authored_by<S: DocStore>(store: &S, user_id: &str) -> anyhow::Result<Vec<Slime>> {
    Ok(list_slimes(store)?
        .into_iter()
        .filter(|slime| slime.user_id == user_id)
        .collect())
}

/// Everything the resolved user has posted.
pub fn get_user_timeline<S: DocStore>(
    store: &S,
    identifier: &str,
    count: Option<usize>,
    viewer: &str,
) -> anyhow::Result<Option<Vec<SlimeView>>> {
    let Some(user) = fetch_user(store, identifier)? else {
        return Ok(None);
    };
    let mut records = authored_by(store, &user.id)?;
    sort_newest_first(&mut records);
    materialize(store, records, viewer, count).map(Some)
}

/// Slimes by the user and everyone they follow. The author set is built
/// locally; the fetched record is never touched.
pub fn get_home_timeline<S: DocStore>(
    store: &S,
    identifier: &str,
    count: Option<usize>,
) -> anyhow::Result<Option<Vec<SlimeView>>> {
    let Some(user) = fetch_user(store, identifier)? else {
        return Ok(None);
    };

    let mut author_ids: HashSet<&str> = user.friends.iter().map(String::as_str).collect();
    author_ids.insert(&user.id);

    let mut records: Vec<Slime> = list_slimes(store)?
        .into_iter()
        .filter(|slime| author_ids.contains(slime.user_id.as_str()))
        .collect();
    sort_newest_first(&mut records);
    materialize(store, records, identifier, count).map(Some)
}

fn ids_of(records: &[Slime]) -> HashSet<String> {
    records.iter().map(|slime| slime.id.clone()).collect()
}

fn responses_to_user<S: DocStore>(
    store: &S,
    user: &User,
    keep: impl Fn(&Slime, &HashSet<String>) -> bool,
) -> anyhow::Result<Vec<Slime>> {
    let own_ids = ids_of(&authored_by(store, &user.id)?);
    let mut records: Vec<Slime> = list_slimes(store)?
        .into_iter()
        .filter(|slime| slime.user_id != user.id && keep(slime, &own_ids))
        .collect();
    sort_newest_first(&mut records);
    Ok(records)
}

/// Reslimes of any of the user's slimes, authored by someone else.
pub fn get_reslimes_of_me<S: DocStore>(
    store: &S,
    identifier: &str,
    count: Option<usize>,
) -> anyhow::Result<Option<Vec<SlimeView>>> {
    let Some(user) = fetch_user(store, identifier)? else {
        return Ok(None);
    };
    let records = responses_to_user(store, &user, |slime, own_ids| {
        matches!(&slime.kind, SlimeKind::Reslime(data) if own_ids.contains(&data.reslimed_status_id))
    })?;
    materialize(store, records, identifier, count).map(Some)
}

/// Replies to any of the user's slimes, authored by someone else.
pub fn get_replies_of_me<S: DocStore>(
    store: &S,
    identifier: &str,
    count: Option<usize>,
) -> anyhow::Result<Option<Vec<SlimeView>>> {
    let Some(user) = fetch_user(store, identifier)? else {
        return Ok(None);
    };
    let records = responses_to_user(store, &user, |slime, own_ids| {
        matches!(&slime.kind, SlimeKind::Post(data)
            if data.in_reply_to_status_id.as_ref().is_some_and(|id| own_ids.contains(id)))
    })?;
    materialize(store, records, identifier, count).map(Some)
}

/// Reslimes-of-me followed by replies-of-me. Each half is truncated to
/// `count` independently, so the total may reach twice the limit.
pub fn get_activity<S: DocStore>(
    store: &S,
    identifier: &str,
    count: Option<usize>,
) -> anyhow::Result<Option<Vec<SlimeView>>> {
    let Some(mut activity) = get_reslimes_of_me(store, identifier, count)? else {
        return Ok(None);
    };
    if let Some(replies) = get_replies_of_me(store, identifier, count)? {
        activity.extend(replies);
    }
    Ok(Some(activity))
}

// === HTTP handlers ===

/// GET /api/statuses/user_timeline.json — `user_id` xor `screen_name`,
/// default the authenticated user.
pub fn handle_user_timeline<S: DocStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let Some(session) = current_session(store, req) else {
        return Ok(ApiError::Unauthorized.into());
    };

    let params = parse_query_params(req.uri());
    let user_id = get_string(&params, "user_id");
    let screen_name = get_string(&params, "screen_name");
    let count = get_count(&params);

    let identifier = match (user_id, screen_name) {
        (Some(_), Some(_)) => {
            return Ok(
                ApiError::BadRequest("Provide user_id or screen_name, not both".to_string())
                    .into(),
            )
        }
        (Some(id), None) => id,
        (None, Some(name)) => name,
        (None, None) => session.username.clone(),
    };

    match get_user_timeline(store, &identifier, count, &session.username)? {
        Some(views) => json_response(200, &views),
        None => Ok(ApiError::BadRequest("User not found".to_string()).into()),
    }
}

/// GET /api/statuses/home_timeline.json
pub fn handle_home_timeline<S: DocStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let Some(session) = current_session(store, req) else {
        return Ok(ApiError::Unauthorized.into());
    };
    let count = get_count(&parse_query_params(req.uri()));
    match get_home_timeline(store, &session.username, count)? {
        Some(views) => json_response(200, &views),
        None => Ok(ApiError::BadRequest("User not found".to_string()).into()),
    }
}

/// GET /api/statuses/reslimes_of_me.json
pub fn handle_reslimes_of_me<S: DocStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let Some(session) = current_session(store, req) else {
        return Ok(ApiError::Unauthorized.into());
    };
    let count = get_count(&parse_query_params(req.uri()));
    match get_reslimes_of_me(store, &session.username, count)? {
        Some(views) => json_response(200, &views),
        None => Ok(ApiError::BadRequest("User not found".to_string()).into()),
    }
}

/// GET /api/statuses/activity.json
pub fn handle_activity<S: DocStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let Some(session) = current_session(store, req) else {
        return Ok(ApiError::Unauthorized.into());
    };
    let count = get_count(&parse_query_params(req.uri()));
    match get_activity(store, &session.username, count)? {
        Some(views) => json_response(200, &views),
        None => Ok(ApiError::BadRequest("User not found".to_string()).into()),
    }
}
