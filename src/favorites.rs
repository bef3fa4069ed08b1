//! Favorites projection: a user's `favorited_slimes` ids resolved into
//! fully materialized slimes, in stored order.

use spin_sdk::http::{Request, Response};

use crate::config::slime_key;
use crate::core::db::DocStore;
use crate::core::errors::ApiError;
use crate::core::helpers::json_response;
use crate::core::query_params::{get_count, get_string, parse_query_params};
use crate::models::models::{Slime, SlimeView};
use crate::sessions::current_session;
use crate::slimes::materialize;
use crate::users::fetch_user;

/// `None` when the target user does not resolve. Unlike the timelines this
/// keeps the stored favorites order rather than re-sorting by timestamp.
pub fn get_user_favorites<S: DocStore>(
    store: &S,
    identifier: &str,
    count: Option<usize>,
    viewer: &str,
) -> anyhow::Result<Option<Vec<SlimeView>>> {
    let Some(user) = fetch_user(store, identifier)? else {
        return Ok(None);
    };

    let mut records = Vec::with_capacity(user.favorited_slimes.len());
    for id in &user.favorited_slimes {
        if let Some(slime) = store.get_json::<Slime>(&slime_key(id))? {
            records.push(slime);
        } else {
            tracing::warn!(%id, "favorited slime no longer exists");
        }
    }
    materialize(store, records, viewer, count).map(Some)
}

/// GET /api/favorites/list.json — `user_id` xor `screen_name`, default self.
pub fn handle_list<S: DocStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
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

    match get_user_favorites(store, &identifier, count, &session.username)? {
        Some(views) => json_response(200, &views),
        None => Ok(ApiError::BadRequest("User not found".to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::{fixture_post, fixture_user, insert_slime, insert_user, MemoryStore};

    #[test]
    fn favorites_come_back_in_stored_order() {
        let store = MemoryStore::new();
        let mut ed = fixture_user("ed", "Ed", "", "x");
        let laura = fixture_user("laura", "Laura", "", "x");

        // Stored favorites order is newest-last on purpose; it must survive.
        let older = fixture_post(&laura.id, "2021-10-24T20:00:00Z", "older");
        let newer = fixture_post(&laura.id, "2021-10-24T22:00:00Z", "newer");
        ed.favorited_slimes = vec![newer.id.clone(), older.id.clone()];

        insert_user(&store, &ed).unwrap();
        insert_user(&store, &laura).unwrap();
        insert_slime(&store, &older).unwrap();
        insert_slime(&store, &newer).unwrap();

        let views = get_user_favorites(&store, "ed", None, "ed").unwrap().unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].id_str, newer.id);
        assert_eq!(views[1].id_str, older.id);
        assert_eq!(views[0].favorited, Some(true));
    }

    #[test]
    fn unknown_user_is_none_and_no_favorites_is_empty() {
        let store = MemoryStore::new();
        assert!(get_user_favorites(&store, "ghost", None, "ghost")
            .unwrap()
            .is_none());

        let ed = fixture_user("ed", "Ed", "", "x");
        insert_user(&store, &ed).unwrap();
        let views = get_user_favorites(&store, "ed", None, "ed").unwrap().unwrap();
        assert!(views.is_empty());
    }

    #[test]
    fn count_truncates_the_projection() {
        let store = MemoryStore::new();
        let mut ed = fixture_user("ed", "Ed", "", "x");
        let laura = fixture_user("laura", "Laura", "", "x");

        let mut ids = Vec::new();
        let mut slimes = Vec::new();
        for hour in 18..21 {
            let post = fixture_post(
                &laura.id,
                &format!("2021-10-24T{:02}:00:00Z", hour),
                "fav",
            );
            ids.push(post.id.clone());
            slimes.push(post);
        }
        ed.favorited_slimes = ids.clone();

        insert_user(&store, &ed).unwrap();
        insert_user(&store, &laura).unwrap();
        for slime in &slimes {
            insert_slime(&store, slime).unwrap();
        }

        let views = get_user_favorites(&store, "ed", Some(2), "ed").unwrap().unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].id_str, ids[0]);
        assert_eq!(views[1].id_str, ids[1]);
    }
}
