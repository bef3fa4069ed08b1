use regex::Regex;
use spin_sdk::http::{Request, Response};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::config::{slime_key, MAX_SLIME_LENGTH, SLIMES_INDEX_KEY};
use crate::core::db::{insert_slime, DocStore};
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, now_iso, validate_id};
use crate::core::query_params::{get_count, parse_query_params};
use crate::models::models::{
    Entities, PostData, Slime, SlimeKind, SlimeView, User, UserView,
};
use crate::sessions::current_session;
use crate::users::fetch_user;

pub enum CreateOutcome {
    Created(Box<Slime>),
    AuthorNotFound,
    ReplyTargetNotFound,
}

fn hashtag_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"^#[^\s!@#$%^&*(),.?":{}|<>]+$"#).expect("Regex should compile")
    })
}

fn mention_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"^@[^\s!@$%^&*(),.?":{}|<>]+$"#).expect("Regex should compile")
    })
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^https?://(www\.)?[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b[-a-zA-Z0-9()@:%_+.~#?&/=]*")
            .expect("Regex should compile")
    })
}

/// Pull hashtags, mentions, and urls out of the whitespace-split tokens of
/// a slime body. The matched tokens themselves are stored.
pub fn extract_entities(text: &str) -> Entities {
    let mut entities = Entities::default();
    for token in text.split_whitespace() {
        if hashtag_regex().is_match(token) {
            entities.hashtags.push(token.to_string());
        }
        if mention_regex().is_match(token) {
            entities.user_mentions.push(token.to_string());
        }
        if url_regex().is_match(token) {
            entities.urls.push(token.to_string());
        }
    }
    entities
}

/// Create and persist a slime. Reply linkage is resolved from the target
/// slime so `in_reply_to_user_id_str` always names the real author.
pub fn create_slime<S: DocStore>(
    store: &S,
    text: &str,
    reply_to: Option<&str>,
    author_identifier: &str,
) -> anyhow::Result<CreateOutcome> {
    let Some(author) = fetch_user(store, author_identifier)? else {
        return Ok(CreateOutcome::AuthorNotFound);
    };

    let linkage = match reply_to {
        Some(target_id) => {
            let Some(target) = store.get_json::<Slime>(&slime_key(target_id))? else {
                return Ok(CreateOutcome::ReplyTargetNotFound);
            };
            Some((target_id.to_string(), target.user_id))
        }
        None => None,
    };

    let slime = Slime {
        id: Uuid::new_v4().to_string(),
        created_at: now_iso(),
        user_id: author.id,
        kind: SlimeKind::Post(PostData {
            text: text.to_string(),
            reply_count: 0,
            reslime_count: 0,
            favorite_count: 0,
            entities: extract_entities(text),
            in_reply_to_status_id: linkage.as_ref().map(|(id, _)| id.clone()),
            in_reply_to_user_id: linkage.map(|(_, author_id)| author_id),
        }),
    };
    insert_slime(store, &slime)?;
    tracing::debug!(id = %slime.id, "slime created");
    Ok(CreateOutcome::Created(Box::new(slime)))
}

/// Every stored slime, in index order. Field queries are scans over this.
pub(crate) fn list_slimes<S: DocStore>(store: &S) -> anyhow::Result<Vec<Slime>> {
    let ids: Vec<String> = store.get_json(SLIMES_INDEX_KEY)?.unwrap_or_default();
    let mut slimes = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(slime) = store.get_json::<Slime>(&slime_key(&id))? {
            slimes.push(slime);
        }
    }
    Ok(slimes)
}

pub(crate) fn sort_newest_first(slimes: &mut [Slime]) {
    // RFC-3339 UTC timestamps order lexicographically.
    slimes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// The slime whose favorites/reslimes the viewer flags are judged against:
/// a reslime delegates to its target, everything else stands for itself.
fn annotation_target(slime: &Slime) -> &str {
    match &slime.kind {
        SlimeKind::Reslime(data) => &data.reslimed_status_id,
        SlimeKind::Post(_) => &slime.id,
    }
}

fn viewer_favorited(slime: &Slime, viewer: &User) -> bool {
    let target = annotation_target(slime);
    viewer.favorited_slimes.iter().any(|id| id == target)
}

/// True iff any reslime of this slime (or of its target, when this is
/// itself a reslime) was authored by the viewer.
fn viewer_reslimed<S: DocStore>(store: &S, slime: &Slime, viewer: &User) -> anyhow::Result<bool> {
    let target = annotation_target(slime);
    for candidate in list_slimes(store)? {
        if let SlimeKind::Reslime(data) = &candidate.kind {
            if data.reslimed_status_id == target && candidate.user_id == viewer.id {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Build the client-facing view of a stored slime. With no viewer the
/// annotation flags are omitted (used for the embedded reslime target).
pub(crate) fn build_view<S: DocStore>(
    store: &S,
    slime: &Slime,
    viewer: Option<&User>,
    resolve_target: bool,
) -> anyhow::Result<SlimeView> {
    let author = fetch_user(store, &slime.user_id)?
        .ok_or_else(|| anyhow::anyhow!("slime {} has no author", slime.id))?;

    let (favorited, reslimed) = match viewer {
        Some(viewer) => (
            Some(viewer_favorited(slime, viewer)),
            Some(viewer_reslimed(store, slime, viewer)?),
        ),
        None => (None, None),
    };

    let mut view = SlimeView {
        id_str: slime.id.clone(),
        created_at: slime.created_at.clone(),
        user_id_str: slime.user_id.clone(),
        text: None,
        entities: None,
        reply_count: None,
        reslime_count: None,
        favorite_count: None,
        in_reply_to_status_id_str: None,
        in_reply_to_user_id_str: None,
        reslimed_status_id_str: None,
        reslimed_status: None,
        user: UserView::from_record(&author),
        reslimed,
        favorited,
    };

    match &slime.kind {
        SlimeKind::Post(data) => {
            view.text = Some(data.text.clone());
            view.entities = Some(data.entities.clone());
            view.reply_count = Some(data.reply_count);
            view.reslime_count = Some(data.reslime_count);
            view.favorite_count = Some(data.favorite_count);
            view.in_reply_to_status_id_str = data.in_reply_to_status_id.clone();
            view.in_reply_to_user_id_str = data.in_reply_to_user_id.clone();
        }
        SlimeKind::Reslime(data) => {
            view.reslimed_status_id_str = Some(data.reslimed_status_id.clone());
            if resolve_target {
                // One level deep, flags stripped from the embedded target.
                if let Some(target) =
                    store.get_json::<Slime>(&slime_key(&data.reslimed_status_id))?
                {
                    view.reslimed_status = Some(Box::new(build_view(store, &target, None, false)?));
                }
            }
        }
    }

    Ok(view)
}

/// Fetch one slime fully materialized for the given viewer.
pub fn get_slime<S: DocStore>(
    store: &S,
    id: &str,
    viewer: &str,
) -> anyhow::Result<Option<SlimeView>> {
    let Some(slime) = store.get_json::<Slime>(&slime_key(id))? else {
        return Ok(None);
    };
    let viewer_user = fetch_user(store, viewer)?;
    build_view(store, &slime, viewer_user.as_ref(), true).map(Some)
}

/// Materialize a batch of records for one viewer, truncated to `count`.
/// The input order is preserved; callers sort first.
pub(crate) fn materialize<S: DocStore>(
    store: &S,
    mut records: Vec<Slime>,
    viewer: &str,
    count: Option<usize>,
) -> anyhow::Result<Vec<SlimeView>> {
    if let Some(n) = count {
        records.truncate(n);
    }
    let viewer_user = fetch_user(store, viewer)?;
    records
        .iter()
        .map(|slime| build_view(store, slime, viewer_user.as_ref(), true))
        .collect()
}

/// All reslimes of the given slime, newest first.
pub fn get_reslimes<S: DocStore>(
    store: &S,
    id: &str,
    viewer: &str,
    count: Option<usize>,
) -> anyhow::Result<Vec<SlimeView>> {
    let mut records: Vec<Slime> = list_slimes(store)?
        .into_iter()
        .filter(|slime| matches!(&slime.kind, SlimeKind::Reslime(data) if data.reslimed_status_id == id))
        .collect();
    sort_newest_first(&mut records);
    materialize(store, records, viewer, count)
}

/// All replies to the given slime, newest first.
pub fn get_replies<S: DocStore>(
    store: &S,
    id: &str,
    viewer: &str,
    count: Option<usize>,
) -> anyhow::Result<Vec<SlimeView>> {
    let mut records: Vec<Slime> = list_slimes(store)?
        .into_iter()
        .filter(|slime| {
            matches!(&slime.kind, SlimeKind::Post(data)
                if data.in_reply_to_status_id.as_deref() == Some(id))
        })
        .collect();
    sort_newest_first(&mut records);
    materialize(store, records, viewer, count)
}

// === HTTP handlers ===

fn path_id<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    path.strip_prefix(prefix)?.strip_suffix(".json")
}

/// GET /api/statuses/show/{id}.json
pub fn handle_show<S: DocStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let Some(session) = current_session(store, req) else {
        return Ok(ApiError::Unauthorized.into());
    };

    let id = path_id(req.path(), "/api/statuses/show/").unwrap_or_default();
    if !validate_id(id) {
        return Ok(ApiError::BadRequest("Malformed slime id".to_string()).into());
    }

    match get_slime(store, id, &session.username)? {
        Some(view) => json_response(200, &view),
        None => Ok(ApiError::NotFound("Slime not found".to_string()).into()),
    }
}

fn handle_referencing<S: DocStore>(
    store: &S,
    req: &Request,
    prefix: &str,
    lookup: fn(&S, &str, &str, Option<usize>) -> anyhow::Result<Vec<SlimeView>>,
) -> anyhow::Result<Response> {
    let Some(session) = current_session(store, req) else {
        return Ok(ApiError::Unauthorized.into());
    };

    let id = path_id(req.path(), prefix).unwrap_or_default();
    if !validate_id(id) {
        return Ok(ApiError::BadRequest("Malformed slime id".to_string()).into());
    }
    // The base slime must exist; referencing an unknown one is a bad request.
    if store.get_json::<Slime>(&slime_key(id))?.is_none() {
        return Ok(ApiError::BadRequest("Unknown slime".to_string()).into());
    }

    let count = get_count(&parse_query_params(req.uri()));
    let views = lookup(store, id, &session.username, count)?;
    json_response(200, &views)
}

/// GET /api/statuses/reslimes/{id}.json
pub fn handle_reslimes<S: DocStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    handle_referencing(store, req, "/api/statuses/reslimes/", get_reslimes)
}

/// GET /api/statuses/replies/{id}.json
pub fn handle_replies<S: DocStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    handle_referencing(store, req, "/api/statuses/replies/", get_replies)
}

/// POST /api/statuses/update.json — body `{status, reply_to?}`.
pub fn handle_update<S: DocStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let Some(session) = current_session(store, req) else {
        return Ok(ApiError::Unauthorized.into());
    };

    let body: serde_json::Value = serde_json::from_slice(req.body())?;
    let status = body["status"].as_str().unwrap_or_default();
    if status.is_empty() || status.len() > MAX_SLIME_LENGTH {
        return Ok(ApiError::BadRequest("Invalid status".to_string()).into());
    }

    let reply_to = body["reply_to"].as_str();
    if let Some(id) = reply_to {
        if !validate_id(id) {
            return Ok(ApiError::BadRequest("Malformed reply_to id".to_string()).into());
        }
    }

    match create_slime(store, status, reply_to, &session.username)? {
        CreateOutcome::Created(slime) => {
            let view = get_slime(store, &slime.id, &session.username)?
                .ok_or_else(|| anyhow::anyhow!("created slime {} not readable", slime.id))?;
            json_response(201, &view)
        }
        CreateOutcome::AuthorNotFound => {
            Ok(ApiError::NotFound("User not found".to_string()).into())
        }
        CreateOutcome::ReplyTargetNotFound => {
            Ok(ApiError::BadRequest("Unknown reply target".to_string()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::{
        fixture_post, fixture_user, insert_slime, insert_user, MemoryStore,
    };
    use crate::models::models::ReslimeData;

    fn reslime_of(user_id: &str, target_id: &str, created_at: &str) -> Slime {
        Slime {
            id: Uuid::new_v4().to_string(),
            created_at: created_at.to_string(),
            user_id: user_id.to_string(),
            kind: SlimeKind::Reslime(ReslimeData {
                reslimed_status_id: target_id.to_string(),
            }),
        }
    }

    #[test]
    fn entity_extraction_classifies_tokens() {
        let entities =
            extract_entities("good #morning @ed check https://stlawu.edu plain #tag! #");
        assert_eq!(entities.hashtags, vec!["#morning"]);
        assert_eq!(entities.user_mentions, vec!["@ed"]);
        assert_eq!(entities.urls, vec!["https://stlawu.edu"]);
        assert!(entities.media.is_empty());
    }

    #[test]
    fn entity_extraction_rejects_embedded_punctuation() {
        let entities = extract_entities("#ends. @who? #ok @fine");
        assert_eq!(entities.hashtags, vec!["#ok"]);
        assert_eq!(entities.user_mentions, vec!["@fine"]);
    }

    #[test]
    fn create_persists_and_returns_the_stored_record() {
        let store = MemoryStore::new();
        let ed = fixture_user("ed", "Ed", "", "x");
        insert_user(&store, &ed).unwrap();

        let CreateOutcome::Created(slime) =
            create_slime(&store, "hello #world", None, "ed").unwrap()
        else {
            panic!("expected creation");
        };

        let stored: Slime = store.get_json(&slime_key(&slime.id)).unwrap().unwrap();
        assert_eq!(stored.user_id, ed.id);
        let SlimeKind::Post(data) = stored.kind else {
            panic!("expected a post");
        };
        assert_eq!(data.text, "hello #world");
        assert_eq!(data.entities.hashtags, vec!["#world"]);
        assert_eq!(data.reply_count, 0);
    }

    #[test]
    fn reply_linkage_names_the_target_author() {
        let store = MemoryStore::new();
        let ed = fixture_user("ed", "Ed", "", "x");
        let laura = fixture_user("laura", "Laura", "", "x");
        insert_user(&store, &ed).unwrap();
        insert_user(&store, &laura).unwrap();

        let original = fixture_post(&ed.id, "2021-10-24T20:00:00Z", "original");
        insert_slime(&store, &original).unwrap();

        let CreateOutcome::Created(reply) =
            create_slime(&store, "a reply", Some(&original.id), "laura").unwrap()
        else {
            panic!("expected creation");
        };
        let SlimeKind::Post(data) = reply.kind else {
            panic!("expected a post");
        };
        assert_eq!(data.in_reply_to_status_id.as_deref(), Some(original.id.as_str()));
        assert_eq!(data.in_reply_to_user_id.as_deref(), Some(ed.id.as_str()));

        assert!(matches!(
            create_slime(&store, "x", Some("no-such-slime"), "laura").unwrap(),
            CreateOutcome::ReplyTargetNotFound
        ));
    }

    #[test]
    fn reslime_view_has_no_text_and_embeds_its_target() {
        let store = MemoryStore::new();
        let ed = fixture_user("ed", "Ed", "", "x");
        let choong = fixture_user("choongsool", "Choong-Soo", "", "x");
        insert_user(&store, &ed).unwrap();
        insert_user(&store, &choong).unwrap();

        let original = fixture_post(&ed.id, "2021-10-24T20:00:00Z", "the original");
        insert_slime(&store, &original).unwrap();
        let reslime = reslime_of(&choong.id, &original.id, "2021-10-24T21:00:00Z");
        insert_slime(&store, &reslime).unwrap();

        let view = get_slime(&store, &reslime.id, "ed").unwrap().unwrap();
        assert!(view.text.is_none());
        assert!(view.entities.is_none());
        assert_eq!(
            view.reslimed_status_id_str.as_deref(),
            Some(original.id.as_str())
        );

        let embedded = view.reslimed_status.expect("target embedded");
        assert_eq!(embedded.id_str, original.id);
        assert_eq!(embedded.text.as_deref(), Some("the original"));
        // The embedded target carries no viewer flags.
        assert!(embedded.favorited.is_none());
        assert!(embedded.reslimed.is_none());
    }

    #[test]
    fn post_view_always_carries_entity_lists() {
        let store = MemoryStore::new();
        let ed = fixture_user("ed", "Ed", "", "x");
        insert_user(&store, &ed).unwrap();
        let post = fixture_post(&ed.id, "2021-10-24T20:00:00Z", "no entities here");
        insert_slime(&store, &post).unwrap();

        let view = get_slime(&store, &post.id, "ed").unwrap().unwrap();
        let entities = view.entities.expect("entities present");
        assert!(entities.hashtags.is_empty());
        assert_eq!(view.text.as_deref(), Some("no entities here"));
    }

    #[test]
    fn favorited_follows_the_reslime_target() {
        let store = MemoryStore::new();
        let mut ed = fixture_user("ed", "Ed", "", "x");
        let choong = fixture_user("choongsool", "Choong-Soo", "", "x");

        let original = fixture_post(&choong.id, "2021-10-24T20:00:00Z", "something nice");
        let reslime = reslime_of(&choong.id, &original.id, "2021-10-24T21:00:00Z");

        // ed favorited the original, not the reslime.
        ed.favorited_slimes = vec![original.id.clone()];
        insert_user(&store, &ed).unwrap();
        insert_user(&store, &choong).unwrap();
        insert_slime(&store, &original).unwrap();
        insert_slime(&store, &reslime).unwrap();

        let original_view = get_slime(&store, &original.id, "ed").unwrap().unwrap();
        assert_eq!(original_view.favorited, Some(true));

        // The reslime inherits the flag from its target.
        let reslime_view = get_slime(&store, &reslime.id, "ed").unwrap().unwrap();
        assert_eq!(reslime_view.favorited, Some(true));

        let choong_view = get_slime(&store, &original.id, "choongsool").unwrap().unwrap();
        assert_eq!(choong_view.favorited, Some(false));
    }

    #[test]
    fn reslimed_is_true_for_any_matching_reslime_by_the_viewer() {
        let store = MemoryStore::new();
        let ed = fixture_user("ed", "Ed", "", "x");
        let choong = fixture_user("choongsool", "Choong-Soo", "", "x");
        let laura = fixture_user("laura", "Laura", "", "x");
        for user in [&ed, &choong, &laura] {
            insert_user(&store, user).unwrap();
        }

        let original = fixture_post(&ed.id, "2021-10-24T20:00:00Z", "popular slime");
        insert_slime(&store, &original).unwrap();
        // Someone else reslimed first; the viewer's own reslime must still count.
        insert_slime(&store, &reslime_of(&laura.id, &original.id, "2021-10-24T20:30:00Z")).unwrap();
        insert_slime(&store, &reslime_of(&choong.id, &original.id, "2021-10-24T21:00:00Z")).unwrap();

        let view = get_slime(&store, &original.id, "choongsool").unwrap().unwrap();
        assert_eq!(view.reslimed, Some(true));

        let view = get_slime(&store, &original.id, "ed").unwrap().unwrap();
        assert_eq!(view.reslimed, Some(false));
    }

    #[test]
    fn reslimes_and_replies_are_newest_first_and_truncated() {
        let store = MemoryStore::new();
        let ed = fixture_user("ed", "Ed", "", "x");
        let choong = fixture_user("choongsool", "Choong-Soo", "", "x");
        insert_user(&store, &ed).unwrap();
        insert_user(&store, &choong).unwrap();

        let original = fixture_post(&ed.id, "2021-10-24T19:00:00Z", "base");
        insert_slime(&store, &original).unwrap();
        for hour in [20, 22, 21] {
            let mut reply = fixture_post(
                &choong.id,
                &format!("2021-10-24T{:02}:00:00Z", hour),
                "a reply",
            );
            if let SlimeKind::Post(data) = &mut reply.kind {
                data.in_reply_to_status_id = Some(original.id.clone());
                data.in_reply_to_user_id = Some(ed.id.clone());
            }
            insert_slime(&store, &reply).unwrap();
        }

        let replies = get_replies(&store, &original.id, "ed", None).unwrap();
        let stamps: Vec<&str> = replies.iter().map(|v| v.created_at.as_str()).collect();
        assert_eq!(
            stamps,
            vec![
                "2021-10-24T22:00:00Z",
                "2021-10-24T21:00:00Z",
                "2021-10-24T20:00:00Z"
            ]
        );

        let limited = get_replies(&store, &original.id, "ed", Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].created_at, "2021-10-24T22:00:00Z");

        assert!(get_reslimes(&store, &original.id, "ed", None).unwrap().is_empty());
    }
}
