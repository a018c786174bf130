//! Dispatch pipeline integration tests.
//!
//! These exercise a built [`Server`] through its endpoints, without a
//! listener:
//!
//! 1. Coercion and the response envelope
//! 2. Validation errors short-circuiting before the target
//! 3. Worker pool offload not blocking async targets
//! 4. Trace context isolation between concurrent requests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::StatusCode;
use janus_coerce::{ParamType, Signature};
use janus_core::{HttpRequest, HttpVerb, JanusError, Kwargs, KwargsExt, TraceContext};
use janus_render::request_render;
use janus_server::{MethodDef, Server, ServerSettings, Service};
use proptest::prelude::*;
use serde_json::json;

fn settings(worker_count: usize) -> ServerSettings {
    ServerSettings {
        host: "127.0.0.1".to_string(),
        port: 0,
        worker_count,
        ..ServerSettings::default()
    }
}

fn get(uri: &str) -> HttpRequest {
    HttpRequest::builder().uri(uri).build()
}

/// A math service counting target invocations.
struct Math {
    calls: Arc<AtomicUsize>,
}

impl Service for Math {
    fn name(&self) -> &str {
        "math"
    }

    fn methods(self: Arc<Self>) -> Vec<MethodDef> {
        let calls = Arc::clone(&self.calls);
        vec![MethodDef::blocking(
            "add",
            Signature::new().param("a", ParamType::Int).param("b", ParamType::Int),
            move |kwargs: Kwargs| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, JanusError>(kwargs.arg::<i64>("a")? + kwargs.arg::<i64>("b")?)
            },
        )
        .doc("Adds two integers.\n\nHTTP: /math/add get")]
    }
}

fn math_server() -> (Server, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut server = Server::new(settings(2));
    server
        .register_service(Math {
            calls: Arc::clone(&calls),
        })
        .unwrap();
    server.build().unwrap();
    (server, calls)
}

// =============================================================================
// Coercion and envelopes
// =============================================================================

#[tokio::test]
async fn test_add_returns_enveloped_sum() {
    let (server, calls) = math_server();
    let reply = server
        .endpoint(HttpVerb::Get, "/math/add")
        .unwrap()
        .handle(get("/math/add?a=2&b=3"))
        .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.json_body().unwrap(),
        json!({"code": 0, "msg": "ok", "data": {"data": 5}})
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_field_skips_target() {
    let (server, calls) = math_server();
    let reply = server
        .endpoint(HttpVerb::Get, "/math/add")
        .unwrap()
        .handle(get("/math/add?a=2"))
        .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        reply.json_body().unwrap(),
        json!({"code": 100_101, "msg": "field `b` must be assiged"})
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unexpected_field_skips_target() {
    let (server, calls) = math_server();
    let reply = server
        .endpoint(HttpVerb::Get, "/math/add")
        .unwrap()
        .handle(get("/math/add?a=2&b=3&c=9"))
        .await;

    assert_eq!(reply.json_body().unwrap()["code"], json!(100_102));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_uncastable_field() {
    let (server, _) = math_server();
    let reply = server
        .endpoint(HttpVerb::Get, "/math/add")
        .unwrap()
        .handle(get("/math/add?a=2&b=three"))
        .await;

    assert_eq!(
        reply.json_body().unwrap(),
        json!({"code": 100_102, "msg": "field `b` with value `three` cannot be converted to int"})
    );
}

#[tokio::test]
async fn test_invalid_json_body() {
    let mut server = Server::new(settings(0));
    server
        .register_function(
            MethodDef::asynchronous("create", Signature::new().untyped("name"), |kwargs: Kwargs| async move {
                Ok::<_, JanusError>(kwargs)
            })
            .verbs(["post"])
            .request_render("json"),
        )
        .unwrap();
    server.build().unwrap();

    let request = HttpRequest::builder()
        .method(http::Method::POST)
        .uri("/create")
        .header("content-type", "application/json")
        .body("{not json")
        .build();
    let reply = server.endpoint(HttpVerb::Post, "/create").unwrap().handle(request).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json_body().unwrap()["code"], json!(100_103));
}

#[tokio::test]
async fn test_target_error_is_generic_internal() {
    let mut server = Server::new(settings(0));
    server
        .register_function(MethodDef::blocking("fail", Signature::new(), |_| {
            Err::<(), _>(anyhow::anyhow!("database unreachable"))
        }))
        .unwrap();
    server
        .register_function(MethodDef::blocking("deny", Signature::new(), |_| {
            Err::<(), _>(JanusError::application(403_001, "not yours").with_status(StatusCode::FORBIDDEN))
        }))
        .unwrap();
    server.build().unwrap();

    let reply = server.endpoint(HttpVerb::Get, "/fail").unwrap().handle(get("/fail")).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.json_body().unwrap()["code"], json!(100_000));

    let reply = server.endpoint(HttpVerb::Get, "/deny").unwrap().handle(get("/deny")).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(
        reply.json_body().unwrap(),
        json!({"code": 403_001, "msg": "not yours"})
    );
}

#[tokio::test]
async fn test_custom_render_and_type() {
    let mut server = Server::new(settings(0));
    server
        .register_type("cents", |text| {
            let (units, cents) = text.split_once('.').unwrap_or((text, "0"));
            let units: i64 = units.parse().map_err(|_| format!("`{text}` is not an amount"))?;
            let cents: i64 = cents.parse().map_err(|_| format!("`{text}` is not an amount"))?;
            Ok(json!(units * 100 + cents))
        })
        .unwrap();
    server
        .renders_mut()
        .unwrap()
        .request
        .register(
            "headers",
            request_render(|request: Arc<HttpRequest>| async move {
                let mut kwargs = Kwargs::new();
                if let Some(amount) = request.header("x-amount") {
                    kwargs.insert("amount".into(), json!(amount));
                }
                Ok(kwargs)
            }),
        )
        .unwrap();
    server
        .register_function(
            MethodDef::blocking(
                "charge",
                Signature::new().param("amount", ParamType::custom("cents")),
                |kwargs: Kwargs| Ok::<_, JanusError>(kwargs.arg::<i64>("amount")?),
            )
            .request_render("headers"),
        )
        .unwrap();
    server.build().unwrap();

    let request = HttpRequest::builder()
        .uri("/charge")
        .header("x-amount", "12.5")
        .build();
    let reply = server.endpoint(HttpVerb::Get, "/charge").unwrap().handle(request).await;
    assert_eq!(reply.json_body().unwrap()["data"], json!({"data": 1205}));
}

// =============================================================================
// Worker pool offload
// =============================================================================

#[tokio::test]
async fn test_blocking_target_does_not_delay_async_target() {
    let mut server = Server::new(settings(1));
    server
        .register_function(MethodDef::blocking("slow", Signature::new(), |_| {
            std::thread::sleep(Duration::from_millis(300));
            Ok::<_, JanusError>("slow")
        }))
        .unwrap();
    server
        .register_function(MethodDef::asynchronous("fast", Signature::new(), |_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, JanusError>("fast")
        }))
        .unwrap();
    server.build().unwrap();

    let order = Mutex::new(Vec::new());
    let slow = server.endpoint(HttpVerb::Get, "/slow").unwrap();
    let fast = server.endpoint(HttpVerb::Get, "/fast").unwrap();

    tokio::join!(
        async {
            slow.handle(get("/slow")).await;
            order.lock().unwrap().push("slow");
        },
        async {
            // submitted after the blocking call has started
            tokio::time::sleep(Duration::from_millis(20)).await;
            fast.handle(get("/fast")).await;
            order.lock().unwrap().push("fast");
        },
    );

    assert_eq!(*order.lock().unwrap(), vec!["fast", "slow"]);
}

// =============================================================================
// Trace context isolation
// =============================================================================

fn trace_server() -> Server {
    let mut server = Server::new(settings(2));
    server
        .register_function(MethodDef::asynchronous(
            "trace",
            Signature::new()
                .param("expect", ParamType::Str)
                .param("pause", ParamType::Int),
            |kwargs: Kwargs| async move {
                let expect: String = kwargs.arg("expect")?;
                let pause: u64 = kwargs.arg("pause")?;
                let mut consistent = true;
                for _ in 0..3 {
                    let seen = TraceContext::current().map(|c| c.request_id().to_string());
                    consistent &= seen.as_deref() == Some(expect.as_str());
                    tokio::time::sleep(Duration::from_millis(pause)).await;
                }
                Ok::<_, JanusError>(consistent)
            },
        ))
        .unwrap();
    server
        .register_function(MethodDef::blocking(
            "trace_blocking",
            Signature::new().param("expect", ParamType::Str),
            |kwargs: Kwargs| {
                let expect: String = kwargs.arg("expect")?;
                let seen = TraceContext::current().map(|c| c.request_id().to_string());
                Ok::<_, JanusError>(seen.as_deref() == Some(expect.as_str()))
            },
        ))
        .unwrap();
    server.build().unwrap();
    server
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_concurrent_requests_see_only_their_trace(
        pauses in proptest::collection::vec(0u64..4, 2..6)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let server = trace_server();
        let endpoint = server.endpoint(HttpVerb::Get, "/trace").unwrap();
        let blocking = server.endpoint(HttpVerb::Get, "/trace_blocking").unwrap();

        let replies = runtime.block_on(futures_util::future::join_all(
            pauses.iter().enumerate().map(|(i, pause)| {
                let id = format!("req-{i}");
                let request = HttpRequest::builder()
                    .uri(&format!("/trace?expect={id}&pause={pause}"))
                    .header("x-request-id", &id)
                    .build();
                let blocking_request = HttpRequest::builder()
                    .uri(&format!("/trace_blocking?expect={id}"))
                    .header("x-request-id", &id)
                    .build();
                async move {
                    let (a, b) = tokio::join!(endpoint.handle(request), blocking.handle(blocking_request));
                    (id, a, b)
                }
            }),
        ));

        for (id, reply, blocking_reply) in replies {
            prop_assert_eq!(reply.header("x-request-id"), Some(id.as_str()));
            prop_assert_eq!(&reply.json_body().unwrap()["data"], &json!({"data": true}));
            prop_assert_eq!(&blocking_reply.json_body().unwrap()["data"], &json!({"data": true}));
        }
        prop_assert!(TraceContext::current().is_none());
    }
}
