//! HTTP request handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{StatusCode, header},
    response::Response,
    routing::get,
};
use comet_core::{CONTENT_TYPE_JS, DEFAULT_JSONP_CALLBACK, Reply, SubOutcome, SubRequest};

use crate::body::ParkedBody;
use crate::query::Params;
use crate::state::RelayState;

/// Build the relay router. Every endpoint is GET; other methods get axum's
/// native 405.
#[must_use]
pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/sub", get(sub))
        .route("/pub", get(publish))
        .route("/sign", get(sign))
        .route("/close", get(close))
        .route("/ping", get(ping))
        .route("/info", get(info))
        .route("/check", get(check))
        .with_state(state)
}

fn respond(reply: Reply) -> Response {
    Response::builder()
        .status(reply.status)
        .header(header::CONTENT_TYPE, reply.content_type)
        .body(Body::from(reply.body))
        .expect("static response headers")
}

/// As [`respond`], plus the no-cache headers the `ping` probe carries.
fn respond_no_cache(reply: Reply) -> Response {
    Response::builder()
        .status(reply.status)
        .header(header::CONTENT_TYPE, reply.content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::EXPIRES, "0")
        .body(Body::from(reply.body))
        .expect("static response headers")
}

async fn sub(
    State(state): State<Arc<RelayState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let q = Params::new(params);
    let request = SubRequest {
        cid: q.get_i64("cid", -1),
        seq: q.get_u32("seq", 0),
        noop: q.get_u32("noop", 0),
        callback: q.get_str("cb", DEFAULT_JSONP_CALLBACK),
        token: q.get_str("token", ""),
    };

    let outcome = state.engine().sub(request);
    match outcome {
        SubOutcome::Reply(reply) => respond(reply),
        SubOutcome::Parked(parked) => {
            let body = Body::from_stream(ParkedBody::new(state.clone(), parked));
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, CONTENT_TYPE_JS)
                .header(header::CONNECTION, "keep-alive")
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::EXPIRES, "0")
                .body(body)
                .expect("static response headers")
        }
    }
}

async fn publish(
    State(state): State<Arc<RelayState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let q = Params::new(params);
    let reply = state.engine().publish(
        q.get_i64("cid", -1),
        &q.get_str("cname", ""),
        &q.get_str("content", ""),
        q.get_opt("cb"),
    );
    respond(reply)
}

async fn sign(
    State(state): State<Arc<RelayState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let q = Params::new(params);
    let reply = state
        .engine()
        .sign(&q.get_str("cname", ""), q.get_i64("expires", -1), q.get_opt("cb"));
    respond(reply)
}

async fn close(
    State(state): State<Arc<RelayState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let q = Params::new(params);
    let reply = state
        .engine()
        .close(&q.get_str("cname", ""), &q.get_str("content", ""));
    respond(reply)
}

async fn ping(
    State(state): State<Arc<RelayState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let q = Params::new(params);
    let reply = state.engine().ping(&q.get_str("cb", DEFAULT_JSONP_CALLBACK));
    respond_no_cache(reply)
}

async fn info(
    State(state): State<Arc<RelayState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let q = Params::new(params);
    let reply = state.engine().info(&q.get_str("cname", ""));
    respond(reply)
}

async fn check(
    State(state): State<Arc<RelayState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let q = Params::new(params);
    let reply = state.engine().check(&q.get_str("cname", ""));
    respond(reply)
}
