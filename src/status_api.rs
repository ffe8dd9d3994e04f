use crate::domains::sessions::SlotCounts;
use crate::domains::settings::PortRange;
use crate::errors::{MaestroError, Result};
use crate::infrastructure::events::{emit_event, EventEmitter, MaestroEvent};
use crate::infrastructure::port::find_and_bind;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, info, warn};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusReport {
    pub version: &'static str,
    pub port: u16,
    pub slots: usize,
    pub launched: usize,
}

#[derive(Debug, Clone, Serialize)]
struct EndpointReadyPayload {
    port: u16,
    url: String,
}

/// Status endpoint whose socket is already bound.
///
/// The port is only known once the listener holds it, so no other process can
/// take it between discovery and serving.
pub struct StatusEndpoint {
    port: u16,
    listener: TcpListener,
}

impl StatusEndpoint {
    /// Claims the first bindable port in `range`. Must run inside a tokio runtime.
    pub fn bootstrap(range: PortRange) -> Result<Self> {
        let lease = find_and_bind(range.start, range.end).ok_or(MaestroError::NoPortAvailable {
            start: range.start,
            end: range.end,
        })?;
        let addr = lease.local_addr();
        let (port, listener) = lease
            .into_tokio()
            .map_err(|e| MaestroError::io("register status listener", addr, e))?;

        info!("Status endpoint bound to {addr}");
        Ok(Self { port, listener })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }

    /// Serves HTTP/1 on the bound socket until `shutdown` resolves.
    pub async fn serve<F>(
        self,
        counts: watch::Receiver<SlotCounts>,
        emitter: Arc<dyn EventEmitter>,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let port = self.port;
        emit_event(
            emitter.as_ref(),
            MaestroEvent::StatusEndpointReady,
            &EndpointReadyPayload {
                port,
                url: format!("http://{}", self.local_addr()),
            },
        );

        tokio::pin!(shutdown);
        let mut accept_failures: u32 = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Status endpoint on port {port} shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => {
                            accept_failures = 0;
                            conn
                        }
                        Err(e) => {
                            let delay = accept_backoff(accept_failures);
                            accept_failures = accept_failures.saturating_add(1);
                            warn!("Status endpoint failed to accept connection: {e}, retrying in {delay:?}");
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    };
                    debug!("Status request connection from {peer}");

                    let counts = counts.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req: Request<Incoming>| {
                            let current = *counts.borrow();
                            async move { Ok::<_, Infallible>(handle_status_request(&req, port, current)) }
                        });
                        if let Err(e) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            debug!("Status connection from {peer} ended with error: {e}");
                        }
                    });
                }
            }
        }
    }
}

/// Delay before the next accept after `failures` consecutive errors (fd exhaustion and the like).
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1u32 << failures.min(16))
        .min(ACCEPT_BACKOFF_MAX)
}

pub fn handle_status_request<B>(req: &Request<B>, port: u16, counts: SlotCounts) -> Response<String> {
    route(req.method(), req.uri().path(), port, counts)
}

fn route(method: &Method, path: &str, port: u16, counts: SlotCounts) -> Response<String> {
    if method != Method::GET {
        return method_not_allowed_response();
    }

    match path {
        "/health" => text_response(StatusCode::OK, "ok".to_string()),
        "/status" => {
            let report = StatusReport {
                version: VERSION,
                port,
                slots: counts.slots,
                launched: counts.launched,
            };
            match serde_json::to_string(&report) {
                Ok(json) => json_response(StatusCode::OK, json),
                Err(e) => json_error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to serialize status: {e}"),
                ),
            }
        }
        _ => not_found_response(),
    }
}

fn text_response(status: StatusCode, body: String) -> Response<String> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

fn json_response(status: StatusCode, json: String) -> Response<String> {
    let mut response = text_response(status, json);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn json_error_response(status: StatusCode, message: String) -> Response<String> {
    let body = serde_json::json!({ "error": message }).to_string();
    json_response(status, body)
}

fn not_found_response() -> Response<String> {
    json_error_response(StatusCode::NOT_FOUND, "Not Found".to_string())
}

fn method_not_allowed_response() -> Response<String> {
    let mut response =
        json_error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed".to_string());
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static("GET"));
    response
}
