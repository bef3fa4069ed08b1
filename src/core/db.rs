//! Document-store seam plus the seed/reset utilities.
//!
//! Collections are emulated over a key-value host: one JSON document per
//! key (`user:{id}`, `slime:{id}`, `session:{token}`) with index keys
//! (`users`, `slimes`) holding the id lists that field-equality queries
//! scan. The [`DocStore`] trait is the narrow interface everything else is
//! written against; the connected client is constructed once by the entry
//! point and passed down, never held in a global.

use serde::{de::DeserializeOwned, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;

use crate::config::{slime_key, user_key, SLIMES_INDEX_KEY, USERS_INDEX_KEY};
use crate::core::helpers::{hash_password, now_iso};
use crate::models::models::{Entities, PostData, ReslimeData, Slime, SlimeKind, User};

pub trait DocStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>>;
    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;
}

impl DocStore for spin_sdk::key_value::Store {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self
            .get(key)
            .map_err(|e| anyhow::anyhow!("key-value get {}: {:?}", key, e))?
        {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let raw = serde_json::to_vec(value)?;
        self.set(key, &raw)
            .map_err(|e| anyhow::anyhow!("key-value set {}: {:?}", key, e))
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        spin_sdk::key_value::Store::delete(self, key)
            .map_err(|e| anyhow::anyhow!("key-value delete {}: {:?}", key, e))
    }
}

/// In-memory store with the same document semantics as the host store.
/// Used by the test suite and for seeding dry-runs.
#[derive(Default)]
pub struct MemoryStore {
    docs: RefCell<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl DocStore for MemoryStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.docs.borrow().get(key) {
            Some(raw) => Ok(Some(serde_json::from_slice(raw)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        self.docs
            .borrow_mut()
            .insert(key.to_string(), serde_json::to_vec(value)?);
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.docs.borrow_mut().remove(key);
        Ok(())
    }
}

/// Delete every document reachable from the indexes, then the indexes.
pub fn reset_all(store: &impl DocStore) -> anyhow::Result<()> {
    let users: Vec<String> = store.get_json(USERS_INDEX_KEY)?.unwrap_or_default();
    for id in &users {
        store.delete(&user_key(id))?;
    }
    let slimes: Vec<String> = store.get_json(SLIMES_INDEX_KEY)?.unwrap_or_default();
    for id in &slimes {
        store.delete(&slime_key(id))?;
    }
    store.delete(USERS_INDEX_KEY)?;
    store.delete(SLIMES_INDEX_KEY)?;
    tracing::debug!(users = users.len(), slimes = slimes.len(), "store reset");
    Ok(())
}

pub(crate) fn insert_user(store: &impl DocStore, user: &User) -> anyhow::Result<()> {
    store.set_json(&user_key(&user.id), user)?;
    let mut index: Vec<String> = store.get_json(USERS_INDEX_KEY)?.unwrap_or_default();
    index.push(user.id.clone());
    store.set_json(USERS_INDEX_KEY, &index)
}

pub(crate) fn insert_slime(store: &impl DocStore, slime: &Slime) -> anyhow::Result<()> {
    store.set_json(&slime_key(&slime.id), slime)?;
    let mut index: Vec<String> = store.get_json(SLIMES_INDEX_KEY)?.unwrap_or_default();
    index.push(slime.id.clone());
    store.set_json(SLIMES_INDEX_KEY, &index)
}

pub(crate) fn fixture_user(
    username: &str,
    name: &str,
    description: &str,
    password_hash: &str,
) -> User {
    User {
        id: uuid::Uuid::new_v4().to_string(),
        username: username.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        email: format!("{}@slugfest.example", username),
        created: now_iso(),
        followers_count: 0,
        friends_count: 0,
        favorites_count: 0,
        statuses_count: 0,
        profile_image_url: crate::config::DEFAULT_PROFILE_IMAGE.to_string(),
        friends: Vec::new(),
        favorited_slimes: Vec::new(),
        password: password_hash.to_string(),
    }
}

pub(crate) fn fixture_post(user_id: &str, created_at: &str, text: &str) -> Slime {
    Slime {
        id: uuid::Uuid::new_v4().to_string(),
        created_at: created_at.to_string(),
        user_id: user_id.to_string(),
        kind: SlimeKind::Post(PostData {
            text: text.to_string(),
            reply_count: 0,
            reslime_count: 0,
            favorite_count: 0,
            entities: Entities::default(),
            in_reply_to_status_id: None,
            in_reply_to_user_id: None,
        }),
    }
}

/// Recreate the demo universe: three users, a handful of slimes, a reslime,
/// a reply, and `ed` with two favorited slimes. Every fixture account shares
/// the password `password`.
pub fn seed_demo_data(store: &impl DocStore) -> anyhow::Result<()> {
    reset_all(store)?;

    let shared_hash = hash_password("password")?;

    let mut ed = fixture_user(
        "ed",
        "Ed Harcourt",
        "My other computer is a Raspberry Pi",
        &shared_hash,
    );
    let mut choong = fixture_user("choongsool", "Choong-Soo Lee", "", &shared_hash);
    let laura = fixture_user("laura", "Laura Bray", "Slime enthusiast", &shared_hash);

    let ed_first = fixture_post(&ed.id, "2021-08-20T15:32:06Z", "Hello SlugFest! #first");
    let choong_post = fixture_post(
        &choong.id,
        "2021-10-24T20:59:24Z",
        "Grading slimes all afternoon https://stlawu.edu",
    );
    let laura_post = fixture_post(&laura.id, "2021-10-24T21:02:27Z", "Anyone up for tea? @ed");

    let choong_reslime = Slime {
        id: uuid::Uuid::new_v4().to_string(),
        created_at: "2021-10-24T21:01:22Z".to_string(),
        user_id: choong.id.clone(),
        kind: SlimeKind::Reslime(ReslimeData {
            reslimed_status_id: ed_first.id.clone(),
        }),
    };

    let laura_reply = Slime {
        id: uuid::Uuid::new_v4().to_string(),
        created_at: "2021-10-24T21:05:10Z".to_string(),
        user_id: laura.id.clone(),
        kind: SlimeKind::Post(PostData {
            text: "Welcome aboard, Ed!".to_string(),
            reply_count: 0,
            reslime_count: 0,
            favorite_count: 0,
            entities: Entities::default(),
            in_reply_to_status_id: Some(ed_first.id.clone()),
            in_reply_to_user_id: Some(ed.id.clone()),
        }),
    };

    ed.favorited_slimes = vec![laura_post.id.clone(), choong_post.id.clone()];
    ed.favorites_count = 2;
    ed.friends = vec![choong.id.clone()];
    ed.friends_count = 1;
    choong.friends = vec![ed.id.clone(), laura.id.clone()];
    choong.friends_count = 2;

    for user in [&ed, &choong, &laura] {
        insert_user(store, user)?;
    }
    for slime in [&ed_first, &choong_post, &laura_post, &choong_reslime, &laura_reply] {
        insert_slime(store, slime)?;
    }

    tracing::debug!("seeded demo data");
    Ok(())
}
