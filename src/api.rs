//! The API's route handlers.
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | GET  | `/`               | [`Api::home`] |
//! | GET  | any other path    | [`Api::home`] |
//! | GET  | `/api/health`     | [`health`] |
//! | GET  | `/api/version`    | [`version`] |
//! | GET  | `/api/users`      | [`Api::list_users`] |
//! | POST | `/api/users`      | [`Api::create_user`] |
//! | GET  | `/api/users/{id}` | [`Api::get_user`] |
//!
//! Client mistakes and simulated backend failures are answered right here
//! with an error-shaped JSON body. Only an encoding failure leaves a handler
//! as a [`Fault`](crate::Fault).

use std::future::Future;
use std::sync::Arc;

use http::{Method, StatusCode};
use serde_json::json;
use tracing::{debug, error, info};

use crate::fault::{FaultOutcome, FaultPolicy, FaultSite};
use crate::handler::Handler;
use crate::models::{CreateUser, User, UserResponse, VersionInfo};
use crate::request::Request;
use crate::response::{Outcome, Response};
use crate::router::Router;

/// Handlers that consult a [`FaultPolicy`].
pub struct Api {
    faults: Arc<dyn FaultPolicy>,
}

impl Api {
    pub fn new(faults: Arc<dyn FaultPolicy>) -> Self {
        Self { faults }
    }

    /// `GET /`, and every GET path no other route claims.
    pub async fn home(self: Arc<Self>, req: Request) -> Outcome {
        info!(path = req.path(), method = %req.method(), "Handling home request");

        if let Some(fault) = self.faults.decide(FaultSite::Home) {
            error!(error = %fault, "Random error in home handler");
            return Ok(Response::error(StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable"));
        }

        Response::json(StatusCode::OK, &json!({"message": "Welcome to the API"}))
    }

    /// `GET /api/users`
    pub async fn list_users(self: Arc<Self>, req: Request) -> Outcome {
        info!(path = req.path(), "Getting all users");

        if let Some(fault) = self.faults.decide(FaultSite::ListUsers) {
            error!(error = %fault, "Failed to get users");
            return Ok(Response::error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to retrieve users"));
        }

        let res = UserResponse {
            status: "success".to_owned(),
            users: vec![User::new(1, "John Doe"), User::new(2, "Jane Smith")],
            ..Default::default()
        };
        Response::json(StatusCode::OK, &res)
    }

    /// `POST /api/users`
    pub async fn create_user(self: Arc<Self>, req: Request) -> Outcome {
        info!(path = req.path(), "Creating new user");

        if req.body().is_empty() {
            error!(error = "empty request body", "Failed to create user");
            return Ok(Response::error(StatusCode::BAD_REQUEST, "Empty request body"));
        }

        let user = match self.validate_and_create(&req).await {
            Ok(user) => user,
            Err(rejection) => {
                error!(error = %rejection.message, status = rejection.status.as_u16(), "User creation failed");
                return Ok(Response::error(rejection.status, rejection.message));
            }
        };

        let res = UserResponse {
            status: "success".to_owned(),
            message: "User created successfully".to_owned(),
            user: Some(user),
            ..Default::default()
        };
        Response::json(StatusCode::CREATED, &res)
    }

    async fn validate_and_create(&self, req: &Request) -> Result<User, Rejection> {
        let input: CreateUser = serde_json::from_slice(req.body())
            .map_err(|e| Rejection::bad_request(format!("invalid request body: {e}")))?;

        if input.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(Rejection::bad_request("validation error: name must not be blank"));
        }
        if let Some(fault) = self.faults.decide(FaultSite::ValidateUser) {
            return Err(Rejection::bad_request(fault.to_string()));
        }

        if let Some(fault) = self.faults.decide(FaultSite::ProcessUser) {
            return Err(Rejection {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: format!("user processing failed: {fault}"),
            });
        }
        let delay = self.faults.latency(FaultSite::ProcessUser);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let name = input.name.map(|n| n.trim().to_owned()).unwrap_or_else(|| "New User".to_owned());
        Ok(User::new(3, name))
    }

    /// `GET /api/users/{id}`
    pub async fn get_user(self: Arc<Self>, req: Request) -> Outcome {
        let raw = req.param("id").unwrap_or_default();
        info!(id = raw, path = req.path(), "Getting user by ID");

        let id: i64 = match raw.parse() {
            Ok(id) => id,
            Err(e) => {
                error!(id = raw, error = %format!("invalid user ID: {raw} is not a valid integer ({e})"), "Invalid user ID");
                return Ok(Response::error(StatusCode::BAD_REQUEST, format!("Invalid user ID: {raw}")));
            }
        };
        if id <= 0 {
            error!(id, error = "invalid user ID: ID must be positive", "Invalid user ID value");
            return Ok(Response::error(StatusCode::BAD_REQUEST, format!("Invalid user ID: {id}")));
        }

        if let Some(fault) = self.faults.decide(FaultSite::QueryUser { id }) {
            error!(id, error = %fault, "Database query failed");
            return Ok(Response::error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to retrieve user data"));
        }

        if let Some(FaultOutcome::NotFound) = self.faults.decide(FaultSite::LookupUser { id }) {
            error!(id, error = %format!("user not found: ID {id}"), "User not found");
            return Ok(Response::error(StatusCode::NOT_FOUND, format!("User with ID {id} not found")));
        }

        let res = UserResponse {
            status: "success".to_owned(),
            user: Some(User::new(id, format!("User {id}"))),
            ..Default::default()
        };
        Response::json(StatusCode::OK, &res)
    }
}

/// A create request the API refuses, with the status to answer.
struct Rejection {
    status: StatusCode,
    message: String,
}

impl Rejection {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }
}

/// `GET /api/health`
pub async fn health(req: Request) -> Outcome {
    debug!(remote_addr = %req.remote_addr(), "Health check requested");
    Response::json(StatusCode::OK, &json!({"status": "healthy"}))
}

/// `GET /api/version`
pub async fn version(req: Request) -> Outcome {
    debug!(remote_addr = %req.remote_addr(), "Version information requested");
    Response::json(StatusCode::OK, &VersionInfo::current())
}

/// The full route table.
pub fn routes(api: Arc<Api>) -> Router {
    Router::new()
        .on(Method::GET, "/", bind(&api, Api::home))
        .on(Method::GET, "/{*rest}", bind(&api, Api::home))
        .on(Method::GET, "/api/health", health)
        .on(Method::GET, "/api/version", version)
        .on(Method::GET, "/api/users", bind(&api, Api::list_users))
        .on(Method::POST, "/api/users", bind(&api, Api::create_user))
        .on(Method::GET, "/api/users/{id}", bind(&api, Api::get_user))
}

/// Turns an `Api` method into a route handler that owns a handle to `api`.
fn bind<F, Fut>(api: &Arc<Api>, method: F) -> impl Handler + use<F, Fut>
where
    F: Fn(Arc<Api>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    let api = Arc::clone(api);
    move |req| method(Arc::clone(&api), req)
}
