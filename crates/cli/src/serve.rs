//! HTTP endpoints that push decisions into the resume worker.
//!
//! Handlers only parse and enqueue; the worker in `main` applies each
//! decision to its checkpoint and continues the run.

use approval::{Decision, FunctionCall};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::mpsc;

#[derive(Clone)]
struct WebhookState {
    decisions: mpsc::UnboundedSender<Decision>,
}

pub fn build_router(decisions: mpsc::UnboundedSender<Decision>) -> Router {
    Router::new()
        .route("/decisions", post(handle_decision))
        .route("/webhooks/function_call", post(handle_function_call))
        .with_state(WebhookState { decisions })
}

async fn handle_decision(
    State(state): State<WebhookState>,
    Json(decision): Json<Decision>,
) -> (StatusCode, Json<Value>) {
    enqueue(&state, decision)
}

async fn handle_function_call(
    State(state): State<WebhookState>,
    Json(call): Json<FunctionCall>,
) -> (StatusCode, Json<Value>) {
    match call.decision() {
        Some(decision) => enqueue(&state, decision),
        // Status updates without a verdict yet.
        None => (
            StatusCode::ACCEPTED,
            Json(json!({ "queued": false, "msg": "no decision yet" })),
        ),
    }
}

fn enqueue(state: &WebhookState, decision: Decision) -> (StatusCode, Json<Value>) {
    if decision.correlation.is_none() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "queued": false,
                "msg": format!("decision {} carries no checkpoint id", decision.approval_request_id),
            })),
        );
    }

    let id = decision.approval_request_id.to_string();
    if state.decisions.send(decision).is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "queued": false, "msg": "resume worker stopped" })),
        );
    }
    tracing::debug!(approval_request_id = %id, "decision queued");
    (
        StatusCode::ACCEPTED,
        Json(json!({ "queued": true, "approval_request_id": id })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn post_json(uri: &str, payload: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request should build")
    }

    #[tokio::test]
    async fn decision_is_queued() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let payload = json!({
            "approval_request_id": "req-1",
            "approved": false,
            "feedback": "not today",
            "correlation": "cp-1"
        });

        let response = build_router(sender)
            .oneshot(post_json("/decisions", payload))
            .await
            .expect("router should accept decision");
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let decision = receiver.try_recv().expect("decision should be queued");
        assert_eq!(
            decision,
            Decision::reject("req-1")
                .with_feedback("not today")
                .with_correlation("cp-1")
        );
    }

    #[tokio::test]
    async fn function_call_webhook_carries_checkpoint() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let payload = json!({
            "run_id": "lockkeeper",
            "call_id": "fc-9",
            "spec": {
                "fn": "changeWeather",
                "kwargs": {"city": "Paris"},
                "state": {"checkpoint_id": "cp-9"}
            },
            "status": {"approved": true}
        });

        let response = build_router(sender)
            .oneshot(post_json("/webhooks/function_call", payload))
            .await
            .expect("router should accept webhook");
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let decision = receiver.try_recv().expect("decision should be queued");
        assert_eq!(decision, Decision::approve("fc-9").with_correlation("cp-9"));
    }

    #[tokio::test]
    async fn undecided_function_call_is_not_queued() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let payload = json!({
            "run_id": "lockkeeper",
            "call_id": "fc-1",
            "spec": {"fn": "changeWeather", "kwargs": {}},
            "status": {"approved": null}
        });

        let response = build_router(sender)
            .oneshot(post_json("/webhooks/function_call", payload))
            .await
            .expect("router should accept webhook");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn uncorrelated_decision_is_refused() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let payload = json!({ "approval_request_id": "req-2", "approved": true });

        let response = build_router(sender)
            .oneshot(post_json("/decisions", payload))
            .await
            .expect("router should answer");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn stopped_worker_is_reported() {
        let (sender, receiver) = mpsc::unbounded_channel();
        drop(receiver);
        let payload = json!({
            "approval_request_id": "req-3",
            "approved": true,
            "correlation": "cp-3"
        });

        let response = build_router(sender)
            .oneshot(post_json("/decisions", payload))
            .await
            .expect("router should answer");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
