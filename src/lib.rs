use spin_sdk::http::{Request, Response};
#[cfg(target_arch = "wasm32")]
use spin_sdk::{http::IntoResponse, http_component, key_value::Store};

pub mod config;
pub mod core {
    pub mod db;
    pub mod errors;
    pub mod helpers;
    pub mod query_params;
}
pub mod models {
    pub mod models;
}
pub mod favorites;
pub mod sessions;
pub mod slimes;
pub mod static_server;
pub mod timeline;
pub mod users;

use crate::core::db::DocStore;

/// Transport-agnostic dispatch: every entry point (the Spin component, the
/// native binary, the test suite) funnels requests through here with its
/// own store.
pub fn route<S: DocStore>(store: &S, req: Request) -> anyhow::Result<Response> {
    let path = req.path().to_string();
    let method = req.method().to_string();

    match (method.as_str(), path.as_str()) {
        ("POST", "/api/login") => sessions::handle_login(store, &req),
        ("GET", "/api/logout") => sessions::handle_logout(store, &req),

        ("GET", "/api/user/get.json") => users::handle_get_user(store, &req),
        ("POST", "/api/user/create.json") => users::handle_create_user(store, &req),
        ("PUT", "/api/user/display-name.json") => {
            users::handle_update_display_name(store, &req)
        }

        ("POST", "/api/statuses/update.json") => slimes::handle_update(store, &req),
        ("GET", p) if p.starts_with("/api/statuses/show/") => slimes::handle_show(store, &req),
        ("GET", p) if p.starts_with("/api/statuses/reslimes/") => {
            slimes::handle_reslimes(store, &req)
        }
        ("GET", p) if p.starts_with("/api/statuses/replies/") => {
            slimes::handle_replies(store, &req)
        }
        ("GET", "/api/statuses/user_timeline.json") => {
            timeline::handle_user_timeline(store, &req)
        }
        ("GET", "/api/statuses/home_timeline.json") => {
            timeline::handle_home_timeline(store, &req)
        }
        ("GET", "/api/statuses/reslimes_of_me.json") => {
            timeline::handle_reslimes_of_me(store, &req)
        }
        ("GET", "/api/statuses/activity.json") => timeline::handle_activity(store, &req),

        ("GET", "/api/favorites/list.json") => favorites::handle_list(store, &req),

        ("GET", p) => static_server::serve_static(p),
        _ => Ok(Response::builder().status(404).body("Not found").build()),
    }
}

#[cfg(target_arch = "wasm32")]
#[http_component]
fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
    let store = Store::open_default()
        .map_err(|e| anyhow::anyhow!("failed to open key-value store: {:?}", e))?;
    route(&store, req)
}
