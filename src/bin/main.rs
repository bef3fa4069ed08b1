#[cfg(not(target_arch = "wasm32"))]
mod native {
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};

    mod adapter {
        use actix_web::{HttpRequest, HttpResponse};
        use spin_sdk::http::{Method, Request};

        pub fn actix_to_spin_request(
            req: &HttpRequest,
            body: actix_web::web::Bytes,
        ) -> Request {
            let method = match req.method().as_str() {
                "GET" => Method::Get,
                "POST" => Method::Post,
                "PUT" => Method::Put,
                "DELETE" => Method::Delete,
                "HEAD" => Method::Head,
                "OPTIONS" => Method::Options,
                "PATCH" => Method::Patch,
                _ => Method::Get,
            };

            let uri = req.uri().to_string();

            let mut builder = Request::builder();
            let mut with_headers = builder.method(method).uri(&uri);
            for (name, value) in req.headers() {
                if let Ok(val_str) = value.to_str() {
                    with_headers = with_headers.header(name.as_str(), val_str);
                }
            }

            with_headers.body(body.to_vec()).build()
        }

        pub fn spin_to_actix_response(spin_resp: spin_sdk::http::Response) -> HttpResponse {
            let status = *spin_resp.status();
            let body = spin_resp.body().to_vec();

            let mut response = HttpResponse::build(
                actix_web::http::StatusCode::from_u16(status)
                    .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
            );
            response.body(body)
        }
    }

    fn listen_address() -> String {
        std::env::var("SLUGFEST_LISTEN").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
    }

    fn check_environment() {
        // Fail fast on malformed settings instead of limping along with
        // silent defaults.
        if let Ok(raw) = std::env::var("SLUGFEST_SESSION_HOURS") {
            if raw.parse::<i64>().is_err() {
                eprintln!("SLUGFEST_SESSION_HOURS must be an integer, got {:?}", raw);
                std::process::exit(1);
            }
        }
    }

    pub async fn run() -> std::io::Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
        check_environment();

        let addr = listen_address();
        tracing::info!(%addr, "slugfest listening");

        HttpServer::new(|| App::new().default_service(web::route().to(handle_all)))
            .bind(addr)?
            .run()
            .await
    }

    async fn handle_all(req: HttpRequest, body: web::Bytes) -> HttpResponse {
        let method = req.method().to_string();
        let path = req.path().to_string();

        let store = match spin_sdk::key_value::Store::open_default() {
            Ok(store) => store,
            Err(e) => {
                tracing::error!(?e, "key-value store unavailable");
                return HttpResponse::InternalServerError()
                    .json(serde_json::json!({"error": "Store unavailable"}));
            }
        };

        let spin_req = adapter::actix_to_spin_request(&req, body);
        match slugfest::route(&store, spin_req) {
            Ok(spin_resp) => {
                tracing::debug!(%method, %path, status = *spin_resp.status(), "handled");
                adapter::spin_to_actix_response(spin_resp)
            }
            Err(e) => {
                tracing::error!(%method, %path, %e, "handler failed");
                HttpResponse::InternalServerError()
                    .json(serde_json::json!({"error": "Internal server error"}))
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
