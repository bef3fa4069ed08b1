//! Store key layout, validation limits, and environment-derived settings.

pub const USERS_INDEX_KEY: &str = "users";
pub const SLIMES_INDEX_KEY: &str = "slimes";

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 3;
pub const MAX_SLIME_LENGTH: usize = 280;
pub const MAX_DISPLAY_NAME_LENGTH: usize = 100;

pub const DEFAULT_PROFILE_IMAGE: &str = "/assets/profile/default_profile_image.jpg";

// Argon2id memory cost in KiB (15 MiB), matching the stored fixture hashes.
pub const ARGON2_MEMORY_KIB: u32 = 15360;
pub const ARGON2_ITERATIONS: u32 = 2;
pub const ARGON2_PARALLELISM: u32 = 1;

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn slime_key(id: &str) -> String {
    format!("slime:{}", id)
}

pub fn session_key(token: &str) -> String {
    format!("session:{}", token)
}

pub fn session_expiration_hours() -> i64 {
    std::env::var("SLUGFEST_SESSION_HOURS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(24)
}
