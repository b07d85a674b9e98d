//! Cross-cutting request handling: CORS, timing, request logging, and
//! handler isolation.

use std::any::Any;
use std::future::Future;
use std::time::Instant;

use hyper::body::Bytes;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
    ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use hyper::{Method, Request, Response};

use crate::handlers::request_utils::build_empty_response;
use crate::router::RouterError;

/// Methods advertised to preflight requests.
const ALLOWED_METHODS: &str = "GET, POST, PATCH, DELETE, OPTIONS";
/// Headers advertised when the preflight names none.
const DEFAULT_ALLOWED_HEADERS: &str = "Authorization, Content-Type";
/// Response header carrying handler time in seconds.
pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// One configured origin.
#[derive(Debug, Clone, PartialEq, Eq)]
enum OriginPattern {
    Exact(String),
    /// `prefix*suffix`; the wildcard covers exactly one DNS label
    Wildcard { prefix: String, suffix: String },
}

impl OriginPattern {
    fn parse(origin: &str) -> Self {
        let origin = origin.trim().trim_end_matches('/');
        match origin.split_once('*') {
            Some((prefix, suffix)) if !suffix.contains('*') => OriginPattern::Wildcard {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            },
            _ => OriginPattern::Exact(origin.to_string()),
        }
    }

    fn matches(&self, origin: &str) -> bool {
        match self {
            OriginPattern::Exact(expected) => expected == origin,
            OriginPattern::Wildcard { prefix, suffix } => {
                let Some(label) = origin
                    .strip_prefix(prefix.as_str())
                    .and_then(|rest| rest.strip_suffix(suffix.as_str()))
                else {
                    return false;
                };
                !label.is_empty()
                    && label
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-')
            }
        }
    }
}

/// CORS policy over a list of allowed origins.
#[derive(Debug, Clone)]
pub struct Cors {
    origins: Vec<OriginPattern>,
}

impl Cors {
    pub fn new(origins: &[String]) -> Self {
        Self {
            origins: origins.iter().map(|o| OriginPattern::parse(o)).collect(),
        }
    }

    /// Returns true if `origin` is allowed.
    pub fn allows(&self, origin: &str) -> bool {
        self.origins.iter().any(|p| p.matches(origin))
    }

    /// Adds CORS headers for an allowed origin.
    pub fn apply(&self, mut response: Response<Bytes>, origin: Option<&str>) -> Response<Bytes> {
        let Some(origin) = origin.filter(|o| self.allows(o)) else {
            return response;
        };
        if let Ok(value) = HeaderValue::from_str(origin) {
            let headers = response.headers_mut();
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
            headers.insert(
                ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
            headers.append(VARY, HeaderValue::from_static("Origin"));
        }
        response
    }

    /// Answers a CORS preflight request.
    pub fn preflight(
        &self,
        origin: Option<&str>,
        requested_headers: Option<&str>,
    ) -> Result<Response<Bytes>, RouterError> {
        if !origin.is_some_and(|o| self.allows(o)) {
            return Err(RouterError::BadRequest("Disallowed CORS origin".to_string()));
        }

        let mut response = build_empty_response(204)?;
        let headers = response.headers_mut();
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        let allowed_headers = requested_headers
            .and_then(|h| HeaderValue::from_str(h).ok())
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOWED_HEADERS));
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, allowed_headers);
        headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("600"));
        Ok(response)
    }
}

/// Returns true for a CORS preflight: `OPTIONS` with `Origin` and
/// `Access-Control-Request-Method`.
pub fn is_preflight<T>(req: &Request<T>) -> bool {
    req.method() == Method::OPTIONS
        && req.headers().contains_key(ORIGIN)
        && req.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}

/// Requested headers of a preflight, if any.
pub fn requested_headers<T>(req: &Request<T>) -> Option<&str> {
    req.headers()
        .get(ACCESS_CONTROL_REQUEST_HEADERS)
        .and_then(|v| v.to_str().ok())
}

/// Stamps `X-Process-Time` and logs the completed request.
pub fn finish(
    mut response: Response<Bytes>,
    method: &Method,
    path: &str,
    started: Instant,
) -> Response<Bytes> {
    let elapsed = started.elapsed();
    if let Ok(value) = HeaderValue::from_str(&format!("{:.4}", elapsed.as_secs_f64())) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    tracing::info!(
        "{} {} -> {} ({:.1} ms)",
        method,
        path,
        response.status().as_u16(),
        elapsed.as_secs_f64() * 1000.0
    );
    response
}

/// Runs a handler on its own task.
///
/// A panic in the handler becomes a 500, and a client that disconnects
/// mid-request cannot cancel a mutation between its store write and its
/// audit write: dropping the join handle leaves the task running.
pub async fn isolate<F>(handler: F) -> Result<Response<Bytes>, RouterError>
where
    F: Future<Output = Result<Response<Bytes>, RouterError>> + Send + 'static,
{
    match tokio::spawn(handler).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(RouterError::InternalError(format!(
            "Handler panicked: {}",
            panic_message(e.into_panic())
        ))),
        Err(e) => Err(RouterError::InternalError(format!(
            "Handler task failed: {}",
            e
        ))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
