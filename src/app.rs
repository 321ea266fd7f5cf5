//! Assembles the application from its configuration.

use std::sync::Arc;

use tracing::info;

use crate::api::{self, Api};
use crate::config::Config;
use crate::fault::{FaultPolicy, NoFaults, RandomFaults};
use crate::middleware::{Cors, Logging, Recovery, Timeout};
use crate::router::Router;

/// The full request pipeline, outermost layer first.
pub type App = Logging<Cors<Timeout<Recovery<Router>>>>;

/// Builds the application. Test mode turns fault injection off.
pub fn build(config: &Config) -> App {
    let faults: Arc<dyn FaultPolicy> = if config.test_mode {
        info!("Test mode enabled, fault injection disabled");
        Arc::new(NoFaults)
    } else {
        Arc::new(RandomFaults::default())
    };
    with_policy(config, faults)
}

/// Builds the application around an explicit fault policy.
pub fn with_policy(config: &Config, faults: Arc<dyn FaultPolicy>) -> App {
    layer(api::routes(Arc::new(Api::new(faults))), config)
}

/// Wraps any router in the middleware stack.
pub fn layer(router: Router, config: &Config) -> App {
    let guarded = Timeout::new(Recovery::new(router), config.write_limit());
    Logging::new(Cors::new(guarded, config.allowed_origins.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use crate::request::Request;
    use crate::service::Service;
    use crate::writer::BufferedWriter;

    async fn get(app: &App, uri: &str) -> BufferedWriter {
        let req = http::Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("origin", "http://localhost:3000")
            .body(Bytes::new())
            .unwrap();
        let mut w = BufferedWriter::new();
        app.serve(Request::from_http(req, "127.0.0.1:1".parse().unwrap()), &mut w).await.unwrap();
        w
    }

    #[tokio::test]
    async fn test_mode_app_is_deterministic() {
        let app = build(&Config { test_mode: true, ..Config::default() });
        for _ in 0..20 {
            let w = get(&app, "/api/users").await;
            assert_eq!(w.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn stack_applies_cors_from_config() {
        let app = build(&Config { test_mode: true, ..Config::default() });
        let w = get(&app, "/api/health").await;
        assert_eq!(w.headers()["access-control-allow-origin"], "http://localhost:3000");
    }

    #[tokio::test]
    async fn unknown_get_path_reaches_home() {
        let app = build(&Config { test_mode: true, ..Config::default() });
        let w = get(&app, "/nope").await;
        assert_eq!(w.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(w.body()).unwrap();
        assert_eq!(body["message"], "Welcome to the API");
    }

    #[tokio::test]
    async fn zero_write_timeout_means_no_limit() {
        let config = Config::from_lookup(|key| (key == "WRITE_TIMEOUT").then(|| "0".to_owned()));
        assert_eq!(config.write_limit(), None);

        let router = Router::new().on(Method::GET, "/nap", |_req: Request| async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            crate::response::Response::text(StatusCode::OK, "rested")
        });
        let w = get(&layer(router, &config), "/nap").await;
        assert_eq!(w.status(), StatusCode::OK);
        assert_eq!(w.body(), b"rested");
    }
}
