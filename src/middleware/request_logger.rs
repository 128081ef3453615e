//! Access log for the import API, tagged with the calling tenant.

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::http::StatusCode;
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::ORG_ID_HEADER;

/// Wrap an `App` with `.wrap(RequestLogger)`.
pub struct RequestLogger;

pub struct RequestLoggerMiddleware<S> {
    inner: S,
}

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, ()>>;

    fn new_transform(&self, inner: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware { inner }))
    }
}

/// Severity a finished request is logged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Ok,
    Rejected,
    Failed,
}

impl Outcome {
    fn of(status: StatusCode) -> Self {
        if status.is_server_error() {
            Outcome::Failed
        } else if status.is_client_error() {
            Outcome::Rejected
        } else {
            Outcome::Ok
        }
    }
}

/// Fields captured on arrival and repeated on completion.
struct AccessEntry {
    method: String,
    path: String,
    org_id: String,
    started: Instant,
}

impl AccessEntry {
    fn begin(req: &ServiceRequest) -> Self {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let entry = Self {
            method: req.method().to_string(),
            path: req.path().to_string(),
            org_id: header(ORG_ID_HEADER).unwrap_or_else(|| "none".into()),
            started: Instant::now(),
        };

        let peer = req.connection_info().realip_remote_addr().map(str::to_string);
        info!(
            target: "api",
            method = %entry.method,
            path = %entry.path,
            query = req.query_string(),
            org_id = %entry.org_id,
            peer = peer.as_deref().unwrap_or("unknown"),
            agent = header("user-agent").as_deref().unwrap_or("unknown"),
            "request received"
        );
        entry
    }

    fn finish(self, status: StatusCode) {
        let status_code = status.as_u16();
        let duration_ms = self.started.elapsed().as_millis() as u64;
        let (method, path, org_id) = (&self.method, &self.path, &self.org_id);

        match Outcome::of(status) {
            Outcome::Ok => {
                info!(target: "api", %method, %path, %org_id, status_code, duration_ms, "request finished")
            }
            Outcome::Rejected => {
                warn!(target: "api", %method, %path, %org_id, status_code, duration_ms, "request rejected")
            }
            Outcome::Failed => {
                error!(target: "api", %method, %path, %org_id, status_code, duration_ms, "request failed")
            }
        }
    }
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(inner);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let entry = AccessEntry::begin(&req);
        let pending = self.inner.call(req);

        Box::pin(async move {
            let res = pending.await?;
            entry.finish(res.status());
            Ok(res)
        })
    }
}
