//! Matchit routing configuration.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use hyper::body::{Body, Bytes};
use hyper::header::ORIGIN;
use hyper::{Method, Request, Response};
use matchit::Router as MatchitRouter;

use crate::handlers;
use crate::middleware::{self, Cors};
use missionpulse_core::aggregate::Aggregator;
use missionpulse_core::audit::AuditSink;
use missionpulse_core::auth::{Actor, AuthError, Authenticator};
use missionpulse_core::config::ServiceConfig;
use missionpulse_core::gateway::MutationGateway;
use missionpulse_core::schema::{SchemaRegistry, TableSchema};
use missionpulse_core::store::RowStore;
use missionpulse_core::{CoreError, StoreError};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Audit-logged write path
    pub gateway: Arc<MutationGateway>,
    /// Windowed statistics
    pub aggregator: Arc<Aggregator>,
    /// Read path for list/get routes
    pub store: Arc<dyn RowStore>,
    /// Read path for the audit log route
    pub audit: Arc<dyn AuditSink>,
    /// Tracked tables
    pub schemas: Arc<SchemaRegistry>,
    /// Caller identity
    pub auth: Arc<dyn Authenticator>,
    /// Service configuration
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    /// Wires the gateway and aggregator over the given collaborators, with
    /// the built-in tracked tables.
    pub fn new(
        store: Arc<dyn RowStore>,
        audit: Arc<dyn AuditSink>,
        auth: Arc<dyn Authenticator>,
        config: ServiceConfig,
    ) -> Self {
        let schemas = Arc::new(SchemaRegistry::with_builtin_tables());
        let store_timeout = config.store_timeout();
        Self {
            gateway: Arc::new(MutationGateway::new(
                store.clone(),
                audit.clone(),
                schemas.clone(),
                store_timeout,
            )),
            aggregator: Arc::new(Aggregator::new(store.clone(), store_timeout)),
            store,
            audit,
            schemas,
            auth,
            config: Arc::new(config),
        }
    }

    /// Resolves the caller from the request's bearer credential.
    pub async fn authenticate<T>(&self, req: &Request<T>) -> Result<Actor, RouterError> {
        let bearer = handlers::request_utils::bearer_token(req);
        Ok(self.auth.authenticate(bearer).await?)
    }

    /// Looks up a tracked table.
    pub fn schema(&self, table: &str) -> Result<&TableSchema, RouterError> {
        self.schemas
            .get(table)
            .ok_or_else(|| RouterError::NotFound(format!("Table '{}' is not tracked", table)))
    }

    /// Runs a read against a collaborator, bounded by the store timeout.
    pub async fn bounded_read<T, F>(&self, op: F) -> Result<T, RouterError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.config.store_timeout(), op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!("Store read failed: {}", e);
                Err(CoreError::Store(e).into())
            }
            Err(_) => {
                tracing::error!("Store read timed out");
                Err(RouterError::UpstreamTimeout)
            }
        }
    }
}

/// HTTP request router.
pub struct Router {
    inner: Arc<MatchitRouter<RouteHandler>>,
    cors: Cors,
    state: AppState,
}

impl Router {
    /// Creates a router with system routes plus collection and item routes
    /// for every tracked table.
    pub fn new(state: AppState) -> Self {
        let mut router = MatchitRouter::new();

        // System endpoints
        router
            .insert("/api/health", RouteHandler::Health)
            .expect("Failed to insert /api/health route");
        router
            .insert("/api/version", RouteHandler::Version)
            .expect("Failed to insert /api/version route");

        // Derived and read-only endpoints
        router
            .insert("/api/data/pipeline/stats", RouteHandler::PipelineStats)
            .expect("Failed to insert /api/data/pipeline/stats route");
        router
            .insert("/api/data/audit-logs", RouteHandler::AuditLogs)
            .expect("Failed to insert /api/data/audit-logs route");
        router
            .insert("/api/data/outlines/{id}/sections", RouteHandler::OutlineSections)
            .expect("Failed to insert /api/data/outlines/{id}/sections route");

        // Tracked table CRUD endpoints
        for schema in state.schemas.iter() {
            let collection = format!("/api/{}", schema.path);
            let item = format!("{}/{{id}}", collection);
            router
                .insert(collection.clone(), RouteHandler::Collection(schema.name.clone()))
                .unwrap_or_else(|e| panic!("Failed to insert {} route: {}", collection, e));
            router
                .insert(item.clone(), RouteHandler::Item(schema.name.clone()))
                .unwrap_or_else(|e| panic!("Failed to insert {} route: {}", item, e));
        }

        Self {
            inner: Arc::new(router),
            cors: Cors::new(&state.config.allowed_origins),
            state,
        }
    }

    /// Routes an incoming request to the appropriate handler.
    ///
    /// Never fails: errors are rendered as JSON envelopes. Every response
    /// carries CORS headers for allowed origins and `X-Process-Time`.
    pub async fn route<B>(&self, req: Request<B>) -> Response<Bytes>
    where
        B: Body,
        B::Error: Display,
    {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let origin = req
            .headers()
            .get(ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let result = if middleware::is_preflight(&req) {
            self.cors
                .preflight(origin.as_deref(), middleware::requested_headers(&req))
        } else {
            self.dispatch(req).await
        };

        let response = result.unwrap_or_else(|err| err.into_response(&path));
        let response = self.cors.apply(response, origin.as_deref());
        middleware::finish(response, &method, &path, started)
    }

    async fn dispatch<B>(&self, req: Request<B>) -> Result<Response<Bytes>, RouterError>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        let body = handlers::request_utils::read_body_with_timeout(
            body,
            self.state.config.request_timeout(),
        )
        .await?;
        let req = Request::from_parts(parts, body);

        let routes = Arc::clone(&self.inner);
        let state = self.state.clone();
        middleware::isolate(async move {
            let path = req.uri().path().to_string();
            match routes.at(&path) {
                Ok(matched) => matched.value.handle(req, matched.params, state).await,
                Err(_) => Err(RouterError::NotFound(format!("No route found for {}", path))),
            }
        })
        .await
    }
}

/// Route handler function.
enum RouteHandler {
    Health,
    Version,
    /// `/api/{path}` of a tracked table
    Collection(String),
    /// `/api/{path}/{id}` of a tracked table
    Item(String),
    OutlineSections,
    PipelineStats,
    AuditLogs,
}

impl RouteHandler {
    /// Handles a request with the given route parameters.
    async fn handle(
        &self,
        req: Request<Bytes>,
        params: matchit::Params<'_, '_>,
        state: AppState,
    ) -> Result<Response<Bytes>, RouterError> {
        let method = req.method().clone();
        match self {
            RouteHandler::Health if method == Method::GET => handlers::health(req, state).await,
            RouteHandler::Version if method == Method::GET => handlers::version(req, state).await,
            RouteHandler::Collection(table) => {
                if method == Method::GET {
                    handlers::list_records(req, table, state).await
                } else if method == Method::POST {
                    handlers::create_record(req, table, state).await
                } else {
                    Err(RouterError::MethodNotAllowed)
                }
            }
            RouteHandler::Item(table) => {
                let id = params.get("id").unwrap_or_default().to_string();
                if method == Method::GET {
                    handlers::read_record(req, table, &id, state).await
                } else if method == Method::PATCH {
                    handlers::update_record(req, table, &id, state).await
                } else if method == Method::DELETE {
                    handlers::delete_record(req, table, &id, state).await
                } else {
                    Err(RouterError::MethodNotAllowed)
                }
            }
            RouteHandler::OutlineSections if method == Method::GET => {
                let outline_id = params.get("id").unwrap_or_default().to_string();
                handlers::list_outline_sections(req, &outline_id, state).await
            }
            RouteHandler::PipelineStats if method == Method::GET => {
                handlers::pipeline_stats(req, state).await
            }
            RouteHandler::AuditLogs if method == Method::GET => {
                handlers::list_audit_logs(req, state).await
            }
            _ => Err(RouterError::MethodNotAllowed),
        }
    }
}

/// Router error type.
#[derive(Debug)]
pub enum RouterError {
    MethodNotAllowed,
    /// Detail is logged, never returned
    InternalError(String),
    /// Request body not received in time
    Timeout,
    /// Datastore did not answer in time
    UpstreamTimeout,
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Unprocessable(String),
}

impl std::fmt::Display for RouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterError::MethodNotAllowed => write!(f, "Method Not Allowed"),
            RouterError::InternalError(msg) => write!(f, "Internal Error: {}", msg),
            RouterError::Timeout => write!(f, "Request Timeout"),
            RouterError::UpstreamTimeout => write!(f, "Datastore request timed out"),
            RouterError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            RouterError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            RouterError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            RouterError::Unprocessable(msg) => write!(f, "Unprocessable: {}", msg),
        }
    }
}

impl std::error::Error for RouterError {}

impl From<CoreError> for RouterError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::EmptyChange => RouterError::BadRequest(e.to_string()),
            CoreError::Validation(msg) => RouterError::Unprocessable(msg),
            CoreError::UnknownTable { .. } => RouterError::NotFound(e.to_string()),
            CoreError::NotFound { .. } => RouterError::NotFound("Record not found".to_string()),
            CoreError::Store(StoreError::Timeout) => RouterError::UpstreamTimeout,
            CoreError::Store(store) => RouterError::InternalError(store.to_string()),
        }
    }
}

impl From<AuthError> for RouterError {
    fn from(e: AuthError) -> Self {
        RouterError::Unauthorized(e.to_string())
    }
}

impl RouterError {
    /// HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            RouterError::BadRequest(_) => 400,
            RouterError::Unauthorized(_) => 401,
            RouterError::NotFound(_) => 404,
            RouterError::MethodNotAllowed => 405,
            RouterError::Timeout => 408,
            RouterError::Unprocessable(_) => 422,
            RouterError::InternalError(_) => 500,
            RouterError::UpstreamTimeout => 504,
        }
    }

    /// Renders the `{error, status_code, path}` envelope.
    pub fn into_response(self, path: &str) -> Response<Bytes> {
        let status = self.status();
        let message = match &self {
            RouterError::MethodNotAllowed | RouterError::Timeout | RouterError::UpstreamTimeout => {
                self.to_string()
            }
            RouterError::InternalError(detail) => {
                tracing::error!("Internal error on {}: {}", path, detail);
                "Internal server error".to_string()
            }
            RouterError::BadRequest(msg)
            | RouterError::Unauthorized(msg)
            | RouterError::NotFound(msg)
            | RouterError::Unprocessable(msg) => msg.clone(),
        };

        let error_response = handlers::error_response(status, message, path);
        let body = serde_json::to_vec(&error_response).unwrap_or_else(|_| {
            format!(
                "{{\"error\":\"Internal server error\",\"status_code\":500,\"path\":{:?}}}",
                path
            )
            .into_bytes()
        });

        let mut builder = Response::builder()
            .status(status)
            .header(hyper::header::CONTENT_TYPE, "application/json");
        if status == 401 {
            builder = builder.header(hyper::header::WWW_AUTHENTICATE, "Bearer");
        }
        builder.body(Bytes::from(body)).unwrap_or_else(|_| {
            let mut fallback = Response::new(Bytes::from_static(b"Internal Server Error"));
            *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }
}
