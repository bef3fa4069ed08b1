use serde::{Deserialize, Serialize};

/// Stored user record. `password` is an argon2 PHC string and never leaves
/// the store inside a view.
#[derive(Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: String,
    pub description: String,
    pub email: String,
    pub created: String,
    pub followers_count: u64,
    pub friends_count: u64,
    pub favorites_count: u64,
    pub statuses_count: u64,
    pub profile_image_url: String,
    pub friends: Vec<String>,
    pub favorited_slimes: Vec<String>,
    pub password: String,
}

/// Stored slime record. The two shapes a slime can take live in
/// [`SlimeKind`]; on the wire the discriminant stays the presence of
/// `reslimed_status_id_str`, so the enum is untagged with the reslime
/// variant tried first.
#[derive(Serialize, Deserialize, Clone)]
pub struct Slime {
    pub id: String,
    pub created_at: String,
    #[serde(rename = "user_id_str")]
    pub user_id: String,
    #[serde(flatten)]
    pub kind: SlimeKind,
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum SlimeKind {
    Reslime(ReslimeData),
    Post(PostData),
}

/// A reslime carries no text or entities of its own, only the reference to
/// the slime it reshares.
#[derive(Serialize, Deserialize, Clone)]
pub struct ReslimeData {
    #[serde(rename = "reslimed_status_id_str")]
    pub reslimed_status_id: String,
}

/// An original slime or a reply.
#[derive(Serialize, Deserialize, Clone)]
pub struct PostData {
    pub text: String,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub reslime_count: u64,
    #[serde(default)]
    pub favorite_count: u64,
    #[serde(default)]
    pub entities: Entities,
    #[serde(rename = "in_reply_to_status_id_str", default)]
    pub in_reply_to_status_id: Option<String>,
    #[serde(rename = "in_reply_to_user_id_str", default)]
    pub in_reply_to_user_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq, Eq)]
pub struct Entities {
    pub hashtags: Vec<String>,
    pub user_mentions: Vec<String>,
    pub urls: Vec<String>,
    pub media: Vec<String>,
}

/// Redacted user shape returned to clients.
#[derive(Serialize, Deserialize, Clone)]
pub struct UserView {
    pub id_str: String,
    pub screen_name: String,
    pub name: String,
    pub description: String,
    pub created: String,
    pub followers_count: u64,
    pub friends_count: u64,
    pub favorites_count: u64,
    pub statuses_count: u64,
    pub profile_image_url: String,
    pub friends: Vec<String>,
    pub favorited_slimes: Vec<String>,
}

impl UserView {
    pub fn from_record(user: &User) -> Self {
        UserView {
            id_str: user.id.clone(),
            screen_name: format!("@{}", user.username),
            name: user.name.clone(),
            description: user.description.clone(),
            created: user.created.clone(),
            followers_count: user.followers_count,
            friends_count: user.friends_count,
            favorites_count: user.favorites_count,
            statuses_count: user.statuses_count,
            profile_image_url: user.profile_image_url.clone(),
            friends: user.friends.clone(),
            favorited_slimes: user.favorited_slimes.clone(),
        }
    }
}

/// Fully materialized slime returned to clients: the record fields plus the
/// embedded author, the resolved reslime target (its own viewer flags
/// stripped), and the viewer-relative annotations.
#[derive(Serialize, Deserialize, Clone)]
pub struct SlimeView {
    pub id_str: String,
    pub created_at: String,
    pub user_id_str: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Entities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reslime_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_status_id_str: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_user_id_str: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reslimed_status_id_str: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reslimed_status: Option<Box<SlimeView>>,
    pub user: UserView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reslimed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorited: Option<bool>,
}

/// Server-side session document backing a bearer token.
#[derive(Serialize, Deserialize, Clone)]
pub struct Session {
    pub username: String,
    pub user_id: String,
    pub created_at: String,
}
