//! External RPC edges (C8): the axum HTTP router that fronts the VM pool.
//! The teacher has no HTTP front end of its own, so this module is grounded
//! on the broader pack's convention instead (`rexbrahh-plfm-vt` pins
//! `tower-http` with the `trace` feature for a `TraceLayer` on every route).

use crate::pool::VmPool;
use crate::registrar::ProxyRegistrar;
use crate::vm::VmLifecycle;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use shared::dto::{ByteBuf, HeaderPair, InvocationReply, ProgramContent, Scope, VmHash};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

pub struct AppState<V: VmLifecycle> {
    pub pool: Arc<VmPool<V>>,
    pub registrar: Arc<dyn ProxyRegistrar>,
    /// Looks up the `ProgramContent` a hash should boot with on a cache miss.
    /// A trait object because how programs are resolved (local store, remote
    /// registry) is outside this crate's concern.
    pub programs: Arc<dyn ProgramLookup>,
    /// How long a VM stays warm in the pool after a response, from
    /// `Settings::reuse_timeout_secs`.
    pub reuse_timeout: Duration,
}

#[async_trait::async_trait]
pub trait ProgramLookup: Send + Sync + 'static {
    async fn lookup(&self, vm_hash: &VmHash) -> Option<ProgramContent>;
}

pub fn router<V: VmLifecycle>(state: Arc<AppState<V>>) -> Router {
    Router::new()
        .route("/run/{hash}/{*path}", any(run_code_on_request::<V>))
        .route("/event/{hash}", any(run_code_on_event::<V>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
enum EdgeError {
    #[error("unknown vm hash")]
    UnknownHash,
    #[error("vm pool error: {0}")]
    Pool(#[from] crate::vm::Error),
    #[error("guest returned malformed response: {0}")]
    BadResponse(String),
}

impl IntoResponse for EdgeError {
    fn into_response(self) -> Response {
        let status = match &self {
            EdgeError::UnknownHash => StatusCode::NOT_FOUND,
            EdgeError::Pool(_) => StatusCode::BAD_GATEWAY,
            EdgeError::BadResponse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

fn scope_from_request(path: &str, query: &str, headers: &HeaderMap, body: Bytes) -> Scope {
    let header_pairs: Vec<HeaderPair> = headers
        .iter()
        .map(|(name, value)| {
            (
                ByteBuf(name.as_str().as_bytes().to_vec()),
                ByteBuf(value.as_bytes().to_vec()),
            )
        })
        .collect();

    Scope {
        method: String::new(),
        path: path.to_string(),
        query_string: query.as_bytes().to_vec(),
        headers: header_pairs,
        body: if body.is_empty() {
            None
        } else {
            Some(ByteBuf(body.to_vec()))
        },
    }
}

async fn run_code_on_request<V: VmLifecycle>(
    State(state): State<Arc<AppState<V>>>,
    Path((hash, path)): Path<(String, String)>,
    request: Request,
) -> Result<Response, EdgeError> {
    let vm_hash = VmHash::parse(hash).map_err(|_| EdgeError::UnknownHash)?;
    let program = state
        .programs
        .lookup(&vm_hash)
        .await
        .ok_or(EdgeError::UnknownHash)?;

    let method = request.method().to_string();
    let query = request.uri().query().unwrap_or("").to_string();
    let headers = request.headers().clone();
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| EdgeError::BadResponse(e.to_string()))?;

    let mut scope = scope_from_request(&format!("/{path}"), &query, &headers, body);
    scope.method = method;

    let vm = state.pool.get_or_create(&program, &vm_hash).await?;
    let reply = state.pool.invoke(&vm_hash, &vm, scope).await?;

    if let Ok(host) = state.registrar.register(&vm_hash, "127.0.0.1:8080").await {
        tracing::debug!(vm_hash = %vm_hash, %host, "route registered");
    }
    state
        .pool
        .keep_running(vm, program, state.reuse_timeout)
        .await;

    Ok(reply_to_response(reply))
}

async fn run_code_on_event<V: VmLifecycle>(
    State(state): State<Arc<AppState<V>>>,
    Path(hash): Path<String>,
    body: Bytes,
) -> Result<Response, EdgeError> {
    let vm_hash = VmHash::parse(hash).map_err(|_| EdgeError::UnknownHash)?;
    let program = state
        .programs
        .lookup(&vm_hash)
        .await
        .ok_or(EdgeError::UnknownHash)?;

    let scope = Scope {
        method: "EVENT".to_string(),
        path: "/event".to_string(),
        query_string: Vec::new(),
        headers: Vec::new(),
        body: if body.is_empty() {
            None
        } else {
            Some(ByteBuf(body.to_vec()))
        },
    };

    let vm = state.pool.get_or_create(&program, &vm_hash).await?;
    let reply = state.pool.invoke(&vm_hash, &vm, scope).await?;
    state
        .pool
        .keep_running(vm, program, state.reuse_timeout)
        .await;

    Ok(reply_to_response(reply))
}

fn reply_to_response(reply: InvocationReply) -> Response {
    match reply {
        InvocationReply::Ok(envelope) => {
            let status =
                StatusCode::from_u16(envelope.headers.status).unwrap_or(StatusCode::OK);
            let mut response = Response::builder().status(status);
            for (name, value) in envelope.headers.headers {
                if let (Ok(name), Ok(value)) = (
                    axum::http::HeaderName::from_bytes(&name.0),
                    axum::http::HeaderValue::from_bytes(&value.0),
                ) {
                    response = response.header(name, value);
                }
            }
            response
                .body(Body::from(envelope.body.body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        InvocationReply::Err(err) => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.traceback).into_response()
        }
    }
}
