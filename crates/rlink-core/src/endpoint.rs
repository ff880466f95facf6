//! Loopback HTTP endpoint the interpreter calls back into.
//!
//! Listens on `127.0.0.1:0` (OS-assigned port) and exposes two verbs, both
//! addressed by key (`/<key>`):
//!
//! - `GET /<key>`: fetch a blob from the [`BlobStore`] (200 or 404)
//! - `PUT /<key>`: deliver the request body to a waiter in the
//!   [`RendezvousRegistry`] (200 once the waiter is done, 500 if nobody waits)
//!
//! Anything else, `HEAD` included, is answered with 405.
//!
//! # Shutdown
//!
//! [`EndpointHandle::shutdown`] stops accepting connections and lets in-flight
//! requests finish before the server task exits.

use crate::config::EndpointConfig;
use crate::rendezvous::RendezvousRegistry;
use crate::store::BlobStore;
use crate::{Result, RlinkError};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// State shared by the endpoint handlers.
#[derive(Clone)]
struct EndpointState {
    blobs: Arc<BlobStore>,
    rendezvous: Arc<RendezvousRegistry>,
}

/// Handle to a running transfer endpoint. Dropping it stops the server.
pub struct EndpointHandle {
    addr: SocketAddr,
    blobs: Arc<BlobStore>,
    rendezvous: Arc<RendezvousRegistry>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<std::io::Result<()>>>,
    stopped: Option<Result<()>>,
}

impl EndpointHandle {
    /// Address the endpoint is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// URL the interpreter uses to reach `key`.
    pub fn url_for(&self, key: &str) -> String {
        format!("http://{}:{}/{}", EndpointConfig::LOOPBACK_HOST, self.port(), key)
    }

    pub fn blobs(&self) -> &Arc<BlobStore> {
        &self.blobs
    }

    pub fn rendezvous(&self) -> &Arc<RendezvousRegistry> {
        &self.rendezvous
    }

    /// Shut the endpoint down gracefully.
    ///
    /// Idempotent: later calls return the outcome of the first one.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(outcome) = &self.stopped {
            return outcome.clone();
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let outcome = match self.task_handle.take() {
            Some(handle) => match handle.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(RlinkError::from(e)),
                Err(e) => Err(RlinkError::Other(format!(
                    "Transfer endpoint task failed: {}",
                    e
                ))),
            },
            None => Ok(()),
        };

        match &outcome {
            Ok(()) => info!("Transfer endpoint on {} stopped", self.addr),
            Err(e) => warn!("Transfer endpoint on {} stopped with error: {}", self.addr, e),
        }
        self.stopped = Some(outcome.clone());
        outcome
    }
}

impl Drop for EndpointHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Transfer endpoint server.
pub struct TransferEndpoint;

impl TransferEndpoint {
    /// Start the endpoint on a random loopback port with fresh stores.
    pub async fn start() -> Result<EndpointHandle> {
        Self::start_with(
            Arc::new(BlobStore::new()),
            Arc::new(RendezvousRegistry::new()),
        )
        .await
    }

    /// Start the endpoint over existing stores.
    pub async fn start_with(
        blobs: Arc<BlobStore>,
        rendezvous: Arc<RendezvousRegistry>,
    ) -> Result<EndpointHandle> {
        let bind_addr = format!("{}:0", EndpointConfig::LOOPBACK_HOST);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| RlinkError::Bind {
                addr: bind_addr.clone(),
                message: e.to_string(),
            })?;
        let addr = listener.local_addr()?;

        info!("Transfer endpoint listening on {}", addr);

        let app = Self::router(blobs.clone(), rendezvous.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task_handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                    debug!("Transfer endpoint draining");
                })
                .await
        });

        Ok(EndpointHandle {
            addr,
            blobs,
            rendezvous,
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
            stopped: None,
        })
    }

    /// Build the endpoint router over the given stores.
    pub fn router(blobs: Arc<BlobStore>, rendezvous: Arc<RendezvousRegistry>) -> Router {
        Router::new()
            .route("/*key", get(fetch).head(reject).put(deliver))
            .fallback(reject)
            .layer(TraceLayer::new_for_http())
            .with_state(EndpointState { blobs, rendezvous })
    }
}

async fn fetch(State(state): State<EndpointState>, Path(key): Path<String>) -> Response {
    match state.blobs.get(&key) {
        Some(bytes) => {
            debug!("Serving blob {} ({} bytes)", key, bytes.len());
            (StatusCode::OK, bytes).into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

async fn deliver(
    State(state): State<EndpointState>,
    Path(key): Path<String>,
    body: Body,
) -> StatusCode {
    if state.rendezvous.deliver(&key, body).await {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

async fn reject() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}
