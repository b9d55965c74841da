//! HTTP bridge listener.
//!
//! `GET /<protocol>/<target>/<operation>[/<args>]` is relayed through the
//! bridge adapter. Results are returned as plain text, or wrapped as a script
//! body when a `callback` query parameter is present. Resolution and
//! delivery failures answer `400 Bad Request`.

use std::net::TcpListener;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use lfosc_config::ListenerMode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{
    LISTENER_TARGET, ListenerContext, ListenerEndpoint, ListenerError, ListenerHandle,
    ListenerSettings, resolve_addr, spawn_worker,
};
use crate::adapters::BRIDGE_TAG;
use crate::daemon::CancelObserver;
use crate::protocol::{ProtocolError, ProtocolRegistry, RawInput};

const SCRIPT_CONTENT_TYPE: &str = "application/javascript";

#[derive(Debug, Default, Deserialize)]
struct BridgeQuery {
    callback: Option<String>,
}

pub(super) fn launch(
    settings: &ListenerSettings,
    context: ListenerContext,
) -> Result<ListenerHandle, ListenerError> {
    let runtime = context
        .runtime
        .clone()
        .ok_or(ListenerError::RuntimeUnavailable)?;
    let addr = resolve_addr(&settings.bind_address, settings.http_port)?;
    let listener =
        TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| ListenerError::Configure { source })?;
    let local = listener
        .local_addr()
        .map_err(|source| ListenerError::Configure { source })?;
    let app = bridge_router(Arc::clone(&context.registry));
    let worker = spawn_worker(ListenerMode::Http, move || {
        let served = runtime.block_on(serve(listener, app, context.cancel.observer()));
        if let Err(error) = served {
            context.fail(ListenerMode::Http, &error);
        }
    })?;
    Ok(ListenerHandle::new(
        ListenerMode::Http,
        ListenerEndpoint::Socket(local),
        worker,
    ))
}

async fn serve(
    listener: TcpListener,
    app: Router,
    cancel: CancelObserver,
) -> Result<(), ListenerError> {
    let listener = tokio::net::TcpListener::from_std(listener)
        .map_err(|source| ListenerError::Configure { source })?;
    info!(
        target: LISTENER_TARGET,
        endpoint = ?listener.local_addr().ok(),
        "http bridge active"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled())
        .await
        .map_err(|source| ListenerError::Serve { source })?;
    info!(target: LISTENER_TARGET, "http bridge stopped");
    Ok(())
}

/// Router relaying every request path through `registry`.
fn bridge_router(registry: Arc<ProtocolRegistry>) -> Router {
    Router::new()
        .route("/*path", get(bridge_request))
        .with_state(registry)
}

async fn bridge_request(
    State(registry): State<Arc<ProtocolRegistry>>,
    uri: Uri,
    Query(query): Query<BridgeQuery>,
) -> Response {
    let path = uri.path().to_owned();
    debug!(target: LISTENER_TARGET, path = %path, "bridge request");
    let outcome = tokio::task::spawn_blocking(move || relay(&registry, &path))
        .await
        .unwrap_or_else(|error| {
            Err(ProtocolError::Worker {
                message: error.to_string(),
            })
        });
    render(outcome, query.callback.as_deref())
}

/// Resolves `path` with the bridge grammar and relays it.
fn relay(registry: &ProtocolRegistry, path: &str) -> Result<String, ProtocolError> {
    let data = registry.resolve_with(BRIDGE_TAG, &RawInput::Text(path))?;
    let bridge = registry
        .get(BRIDGE_TAG)
        .ok_or_else(|| ProtocolError::UnknownProtocol {
            protocol: BRIDGE_TAG.to_owned(),
        })?;
    bridge.process(&data, registry)
}

fn render(outcome: Result<String, ProtocolError>, callback: Option<&str>) -> Response {
    let Some(callback) = callback else {
        return match outcome {
            Ok(result) if result.is_empty() => StatusCode::NO_CONTENT.into_response(),
            Ok(result) => (StatusCode::OK, result).into_response(),
            Err(error) => (StatusCode::BAD_REQUEST, error.report()).into_response(),
        };
    };
    if !is_callback_name(callback) {
        return (StatusCode::BAD_REQUEST, "invalid callback name").into_response();
    }
    let (status, payload) = match outcome {
        Ok(result) => (StatusCode::OK, json!({ "data": result })),
        Err(error) => (StatusCode::BAD_REQUEST, json!({ "error": error.report() })),
    };
    (
        status,
        [(header::CONTENT_TYPE, SCRIPT_CONTENT_TYPE)],
        format!("{callback}({payload});"),
    )
        .into_response()
}

fn is_callback_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '$' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterSettings, builtin_registry, midi::VirtualMidiDriver};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use rstest::rstest;
    use std::net::UdpSocket;
    use std::path::PathBuf;
    use std::time::Duration;
    use tower::ServiceExt;

    fn router() -> Router {
        let settings = AdapterSettings {
            console_timeout: Duration::from_millis(200),
            midi_driver: Arc::new(VirtualMidiDriver::new()),
            midi_bindings: PathBuf::from("unused.json"),
        };
        bridge_router(Arc::new(builtin_registry(&settings).expect("registry")))
    }

    async fn get_path(uri: &str) -> (StatusCode, Option<String>, String) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        let response = router().oneshot(request).await.expect("response");
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (
            status,
            content_type,
            String::from_utf8(body.to_vec()).expect("utf-8 body"),
        )
    }

    #[tokio::test]
    async fn midi_paths_confirm_the_note() {
        let (status, _, body) = get_path("/midi/loopMIDI%20Port/1:1:1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "note (1,1,1) sent to device 'loopMIDI Port'");
    }

    #[tokio::test]
    async fn callbacks_wrap_results_as_scripts() {
        let (status, content_type, body) = get_path("/midi/default/2:3:0?callback=show").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(SCRIPT_CONTENT_TYPE));
        assert_eq!(
            body,
            r#"show({"data":"note (2,3,0) sent to device 'loopMIDI Port'"});"#
        );
    }

    #[tokio::test]
    async fn callbacks_wrap_failures_as_scripts() {
        let (status, _, body) = get_path("/nope/h:1/op?callback=cb").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, r#"cb({"error":"unknown protocol 'nope'"});"#);
    }

    #[rstest]
    #[case("/http/h:1/op", "protocol 'http' cannot relay to itself")]
    #[case("/nope/h:1/op", "unknown protocol 'nope'")]
    #[case("/midi/default/loud", "invalid note 'loud', expected <key>:<velocity>:<duration>")]
    #[tokio::test]
    async fn failures_are_bad_requests(#[case] uri: &str, #[case] expected: &str) {
        let (status, _, body) = get_path(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn empty_results_have_no_content() {
        let sink = UdpSocket::bind("127.0.0.1:0").expect("bind sink");
        let target = sink.local_addr().expect("sink address");
        let (status, _, body) = get_path(&format!("/osc/{target}/cue/go")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn unsafe_callbacks_are_refused() {
        let (status, _, _) = get_path("/midi/default/1:1:0?callback=alert(1)").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
