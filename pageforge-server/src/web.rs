//! HTTP intake: `POST /api/build`.
//!
//! The handler checks the shared secret and answers right away. The round
//! itself is started in the background and held back until the response
//! body has been handed off, so the caller always hears back before any
//! generation or publishing begins.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

use crate::error::BuildError;
use crate::model::{BuildRequest, IntakeReply};
use crate::orchestrator::Orchestrator;

/// Shared state for the intake.
pub struct AppState {
    pub secret: String,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/build", post(build))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler for `POST /api/build`.
pub async fn build(State(state): State<Arc<AppState>>, Json(req): Json<BuildRequest>) -> Response {
    let stats = state.orchestrator.stats();
    if req.secret != state.secret {
        stats.record_rejected();
        tracing::warn!(task = %req.task, round = req.round.number(), "Rejected build request: bad secret");
        let reply = IntakeReply {
            message: None,
            error: Some(BuildError::Unauthorized.to_string()),
        };
        return (StatusCode::FORBIDDEN, Json(reply)).into_response();
    }

    stats.record_accepted();
    tracing::info!(task = %req.task, round = req.round.number(), "Accepted build request");

    let reply = IntakeReply {
        message: Some(format!(
            "Accepted task {} round {}; a notification will follow",
            req.task,
            req.round.number()
        )),
        error: None,
    };
    let (release, started) = oneshot::channel::<()>();
    state.orchestrator.spawn(req, async move {
        // Fires when the body is dropped, sent or not.
        let _ = started.await;
    });

    ack_response(&reply, release)
}

/// JSON 200 whose body releases `release` once the server is done with it.
fn ack_response(reply: &IntakeReply, release: oneshot::Sender<()>) -> Response {
    let bytes = match serde_json::to_vec(reply) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode acknowledgement");
            b"{}".to_vec()
        }
    };
    let body = AckBody {
        chunk: Some(bytes),
        _release: release,
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(body),
    )
        .into_response()
}

/// Single-chunk body holding a oneshot sender. Dropping the body drops the
/// sender, which wakes the waiting round.
struct AckBody {
    chunk: Option<Vec<u8>>,
    _release: oneshot::Sender<()>,
}

impl futures::Stream for AckBody {
    type Item = Result<Vec<u8>, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.chunk.take().map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ack_body_releases_only_after_being_consumed() {
        let (release, mut started) = oneshot::channel::<()>();
        let reply = IntakeReply {
            message: Some("ok".into()),
            error: None,
        };
        let resp = ack_response(&reply, release);
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(matches!(
            started.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        ));

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], br#"{"message":"ok"}"#);
        assert!(matches!(
            started.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }
}
