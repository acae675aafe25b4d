//! End-to-end dispatch tests over a real listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Value};
use switchyard::http::middleware::{cost, recovery};
use switchyard::{from_fn, Context, Error, Router};

mod common;

fn demo_router() -> Router {
    let mut router = Router::new();
    router.use_middleware([cost()]);

    router
        .get(
            "/book/:id/page/:num",
            [from_fn(|ctx: Context| async move {
                let (id, _) = ctx.param_int64("id", 0);
                let (num, _) = ctx.param_int("num", 0);
                ctx.json(StatusCode::OK, &json!({ "id": id, "num": num }))
            })],
        )
        .unwrap();
    {
        let mut subject = router.group("/subject");
        subject
            .get(
                "/:id",
                [from_fn(|ctx: Context| async move {
                    let id = ctx.param("id").unwrap_or_default().to_string();
                    ctx.json(StatusCode::OK, &json!({ "kind": "wildcard", "id": id }))
                })],
            )
            .unwrap();
        subject
            .get(
                "/list",
                [from_fn(|ctx: Context| async move {
                    ctx.json(StatusCode::OK, &json!({ "kind": "literal" }))
                })],
            )
            .unwrap();
    }
    router
        .get(
            "/panic",
            [from_fn(|_ctx: Context| async move {
                if true {
                    panic!("panic test");
                }
                Ok::<(), Error>(())
            })],
        )
        .unwrap();
    router
        .get("/recovered", [recovery(), from_fn(|_ctx: Context| async move {
            if true {
                panic!("recovered panic");
            }
            Ok::<(), Error>(())
        })])
        .unwrap();
    router
        .get(
            "/slow",
            [from_fn(|ctx: Context| async move {
                tokio::time::sleep(Duration::from_millis(400)).await;
                ctx.text(StatusCode::OK, "late")
            })],
        )
        .unwrap();
    router
        .get(
            "/wait",
            [from_fn(|ctx: Context| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ctx.text(StatusCode::OK, "waited")
            })],
        )
        .unwrap();
    router
        .get(
            "/whoami",
            [from_fn(|ctx: Context| async move {
                let ip = ctx.client_ip().map(|ip| ip.to_string()).unwrap_or_default();
                ctx.text(StatusCode::OK, ip)
            })],
        )
        .unwrap();
    router
}

#[tokio::test]
async fn test_params_and_literal_precedence() {
    let server = common::start_server(demo_router(), 500).await;
    let client = common::client();

    let res = client.get(server.url("/book/42/page/7")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "id": 42, "num": 7 }));

    let literal: Value = client
        .get(server.url("/subject/list"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(literal["kind"], "literal");

    let wildcard: Value = client
        .get(server.url("/SUBJECT/9"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(wildcard, json!({ "kind": "wildcard", "id": "9" }));

    let encoded: Value = client
        .get(server.url("/subject/hello%20world"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(encoded["id"], "hello world");

    server.stop().await;
}

#[tokio::test]
async fn test_not_found() {
    let server = common::start_server(demo_router(), 500).await;
    let client = common::client();

    let res = client.get(server.url("/nowhere")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not found");

    let res = client.post(server.url("/book/1/page/2")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_panic_isolated_from_concurrent_request() {
    let server = common::start_server(demo_router(), 1_000).await;
    let client = common::client();

    let (panicked, healthy) = tokio::join!(
        client.get(server.url("/panic")).send(),
        client.get(server.url("/wait")).send(),
    );

    let panicked = panicked.unwrap();
    assert_eq!(panicked.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = panicked.json().await.unwrap();
    assert_eq!(body["error"], "panic test");

    let healthy = healthy.unwrap();
    assert_eq!(healthy.status(), StatusCode::OK);
    assert_eq!(healthy.text().await.unwrap(), "waited");

    // the server keeps serving after a fault
    let again = client.get(server.url("/wait")).send().await.unwrap();
    assert_eq!(again.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn test_recovery_middleware() {
    let server = common::start_server(demo_router(), 500).await;
    let res = common::client().get(server.url("/recovered")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!("recovered panic"));

    server.stop().await;
}

#[tokio::test]
async fn test_timeout_single_response() {
    let server = common::start_server(demo_router(), 100).await;
    let client = common::client();

    let res = client.get(server.url("/slow")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "time out");

    // let the detached handler finish; its write must not surface anywhere
    tokio::time::sleep(Duration::from_millis(400)).await;
    let res = client.get(server.url("/wait")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "waited");

    server.stop().await;
}

#[tokio::test]
async fn test_first_write_wins_across_chain() {
    let late_write_rejected = Arc::new(AtomicBool::new(false));
    let flag = late_write_rejected.clone();

    let mut router = Router::new();
    let outer = from_fn(move |ctx: Context| {
        let flag = flag.clone();
        async move {
            ctx.next().await?;
            let late = ctx.text(StatusCode::OK, "outer");
            flag.store(matches!(late, Err(Error::AlreadyResponded)), Ordering::SeqCst);
            Ok::<(), Error>(())
        }
    });
    let inner = from_fn(|ctx: Context| async move { ctx.text(StatusCode::CREATED, "inner") });
    router.get("/chain", [outer, inner]).unwrap();

    let server = common::start_server(router, 500).await;
    let res = common::client().get(server.url("/chain")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.text().await.unwrap(), "inner");
    assert!(late_write_rejected.load(Ordering::SeqCst));

    server.stop().await;
}

#[tokio::test]
async fn test_client_ip_from_peer() {
    let server = common::start_server(demo_router(), 500).await;
    let res = common::client().get(server.url("/whoami")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "127.0.0.1");
    server.stop().await;
}

#[tokio::test]
async fn test_multipart_upload() {
    let mut router = Router::new();
    router
        .post(
            "/upload",
            [from_fn(|ctx: Context| async move {
                let file = ctx.form_file("doc").await?;
                ctx.json(
                    StatusCode::OK,
                    &json!({ "name": file.file_name, "size": file.size }),
                )
            })],
        )
        .unwrap();
    let server = common::start_server(router, 500).await;

    let body = "--b0und\r\n\
        Content-Disposition: form-data; name=\"doc\"; filename=\"notes.txt\"\r\n\
        Content-Type: text/plain\r\n\r\n\
        twelve bytes\r\n\
        --b0und--\r\n";
    let res = common::client()
        .post(server.url("/upload"))
        .header("content-type", "multipart/form-data; boundary=b0und")
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let value: Value = res.json().await.unwrap();
    assert_eq!(value, json!({ "name": "notes.txt", "size": 12 }));

    // missing field is a chain error
    let res = common::client()
        .post(server.url("/upload"))
        .header("content-type", "text/plain")
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let value: Value = res.json().await.unwrap();
    assert_eq!(value["error"], "inner error");

    server.stop().await;
}
