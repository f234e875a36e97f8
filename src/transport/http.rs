//! HTTP adapter
//!
//! Routes:
//! - `POST /post/` decodes a JSON `Message` and hands it to the broker.
//! - `/events/` opens a streaming session; the response body is the
//!   session's stream of units and stays open until the client leaves.
//!
//! Request errors are answered here and never reach the broker loop.

use std::convert::Infallible;
use std::future::Future;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};

use crate::broker::{BrokerHandle, Message};
use crate::session::{ChannelSink, Session};
use crate::utils::HubError;

/// Units buffered between a session and its HTTP body.
pub const DEFAULT_STREAM_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct AppState {
    pub broker: BrokerHandle,
    pub stream_buffer: usize,
}

impl AppState {
    pub fn new(broker: BrokerHandle) -> Self {
        Self {
            broker,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/post/", any(post_message))
        .route("/events/", any(stream_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router(state)` on `listener` until `shutdown` resolves.
///
/// On shutdown the broker is closed first so that open event streams end
/// and the server can drain its connections.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), HubError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let broker = state.broker.clone();
    let addr = listener.local_addr()?;
    info!(%addr, broker = %broker.name(), "Starting http server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutdown signal received");
            broker.shutdown();
        })
        .await?;

    info!("Closed http server");
    Ok(())
}

async fn post_message(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, HubError> {
    if method != Method::POST {
        return Err(HubError::InvalidRequest(format!(
            "method {method} not allowed"
        )));
    }
    if !is_json(&headers) {
        return Err(HubError::InvalidRequest(
            "expected Content-Type: application/json".to_string(),
        ));
    }

    let message: Message =
        serde_json::from_slice(&body).map_err(|e| HubError::InvalidRequest(e.to_string()))?;
    state.broker.publish(message)?;
    Ok("ok")
}

async fn stream_events(State(state): State<AppState>) -> Result<Response, HubError> {
    let (sink, units) = ChannelSink::new(state.stream_buffer);
    let session = Session::open(&state.broker, sink).await?;

    let span = info_span!("session", subscriber = %session.id());
    tokio::spawn(
        async move {
            session.run().await;
        }
        .instrument(span),
    );

    let body = Body::from_stream(ReceiverStream::new(units).map(Ok::<_, Infallible>));
    let headers = [
        (CONTENT_TYPE, "text/event-stream"),
        (CACHE_CONTROL, "no-cache"),
        (CONNECTION, "keep-alive"),
    ];
    Ok((headers, body).into_response())
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = match &self {
            HubError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            HubError::SubscriberLimit { .. } | HubError::BrokerClosed => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            HubError::StreamingUnsupported
            | HubError::TransportClosed
            | HubError::Encode(_)
            | HubError::Config(_)
            | HubError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self, %status, "Request failed");
        }
        (status, self.to_string()).into_response()
    }
}
