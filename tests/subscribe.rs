//! Subscription streams over a real connection

mod common;

use std::time::Duration;

use bytes::Bytes;
use serde_json::json;

use braid_mock_server::patch::{apply, PatchOp};
use braid_mock_server::protocol::{encode, FramePayload, UpdateFrame};
use braid_mock_server::resource::ResourceId;
use braid_mock_server::version::Version;

use common::TestApp;

#[tokio::test]
async fn test_subscribe_confirms_and_sends_full_body() {
    let app = TestApp::spawn().await;
    app.write("/user/me", r#"{"a":1}"#);

    let mut subscriber = app.subscribe("/user/me").await;

    assert_eq!(subscriber.response_status, 209);
    let headers = &subscriber.response_headers;
    assert_eq!(headers["subscribe"], "true");
    assert_eq!(headers["cache-control"], "no-cache, no-transform");
    assert_eq!(headers["x-accel-buffering"], "no");
    assert_eq!(headers["range-request-allow-methods"], "PATCH, PUT");
    assert_eq!(headers["range-request-allow-units"], "json");
    assert_eq!(headers["content-type"], "application/json");

    let frame = subscriber.next_frame().await;
    assert_eq!(
        frame,
        UpdateFrame::full(Version::from(0x561bacaf), Bytes::from_static(br#"{"a":1}"#))
    );
    assert!(subscriber.raw.starts_with(
        b"Version: \"561bacaf\"\r\nParents: \r\nContent-Length: 7\r\n\r\n{\"a\":1}\r\n\r\n\r\n\r\n\r\n"
    ));

    assert_eq!(
        app.state
            .registry()
            .subscriber_count(&ResourceId::new("/user/me")),
        1
    );
}

#[tokio::test]
async fn test_file_change_sends_patch_against_previous_version() {
    let app = TestApp::spawn().await;
    app.write("/user/me", r#"{"a":1}"#);
    let mut subscriber = app.subscribe("/user/me").await;
    subscriber.next_frame().await;

    app.change("/user/me", r#"{"a":2}"#).await;

    let frame = subscriber.next_frame().await;
    assert_eq!(
        frame,
        UpdateFrame::patch(
            Version::of(br#"{"a":2}"#),
            Version::of(br#"{"a":1}"#),
            vec![PatchOp::replace("/a", json!(2))],
        )
    );
    assert!(subscriber.raw.ends_with(
        b"Version: \"7d36ff6c\"\r\nParents: \"561bacaf\"\r\nContent-Length: 1\r\nContent-Range: replace /a\r\n\r\n2\r\n\r\n\r\n\r\n\r\n"
    ));
}

#[tokio::test]
async fn test_subscribers_share_patches_and_survive_each_other() {
    let app = TestApp::spawn().await;
    app.write("/doc", r#"{"title":"draft","tags":[]}"#);

    let mut a = app.subscribe("/doc").await;
    let mut b = app.subscribe("/doc").await;
    a.next_frame().await;
    b.next_frame().await;

    app.change("/doc", r#"{"title":"final","tags":["x"]}"#).await;

    let frame_a = a.next_frame().await;
    let frame_b = b.next_frame().await;
    assert!(frame_a.is_patch());
    assert_eq!(encode(&frame_a), encode(&frame_b));

    drop(a);

    app.change("/doc", r#"{"title":"final","tags":["x","y"]}"#).await;

    let frame = b.next_frame().await;
    assert_eq!(frame.parents, vec![frame_b.version]);
    assert_eq!(
        frame.payload,
        FramePayload::Patches(vec![PatchOp::add("/tags/1", json!("y"))])
    );
}

#[tokio::test]
async fn test_patches_reconstruct_the_file() {
    let app = TestApp::spawn().await;
    app.write("/settings", r#"{"theme":"dark","fonts":{"size":12},"recent":["a","b","c"]}"#);

    let mut subscriber = app.subscribe("/settings").await;
    let mut state = match subscriber.next_frame().await.payload {
        FramePayload::Body(body) => serde_json::from_slice::<serde_json::Value>(&body).unwrap(),
        FramePayload::Patches(_) => panic!("first frame must be a full body"),
    };

    let revisions = [
        r#"{"theme":"light","fonts":{"size":12},"recent":["a","b","c"]}"#,
        r#"{"theme":"light","fonts":{"size":14,"family":"mono"},"recent":["a"]}"#,
        r#"{"theme":"light","recent":[]}"#,
    ];

    for revision in revisions {
        app.change("/settings", revision).await;
        match subscriber.next_frame().await.payload {
            FramePayload::Patches(ops) => {
                apply(&mut state, &ops).unwrap();
            }
            FramePayload::Body(body) => {
                state = serde_json::from_slice(&body).unwrap();
            }
        }
        assert_eq!(state, serde_json::from_str::<serde_json::Value>(revision).unwrap());
    }
}

#[tokio::test]
async fn test_unchanged_write_sends_nothing() {
    let app = TestApp::spawn().await;
    app.write("/doc", r#"{"n":1}"#);
    let mut subscriber = app.subscribe("/doc").await;
    subscriber.next_frame().await;

    // Same bytes rewritten, then a real change; only the real change arrives.
    app.change("/doc", r#"{"n":1}"#).await;
    app.change("/doc", r#"{"n":2}"#).await;

    let frame = subscriber.next_frame().await;
    assert_eq!(frame.parents, vec![Version::of(br#"{"n":1}"#)]);
    assert_eq!(frame.version, Version::of(br#"{"n":2}"#));
}

#[tokio::test]
async fn test_non_json_change_falls_back_to_full_body() {
    let app = TestApp::spawn().await;
    app.write("/raw", "plain text");
    let mut subscriber = app.subscribe("/raw").await;
    subscriber.next_frame().await;

    app.change("/raw", "more plain text").await;

    let frame = subscriber.next_frame().await;
    assert_eq!(
        frame,
        UpdateFrame::full(
            Version::of(b"more plain text"),
            Bytes::from_static(b"more plain text")
        )
    );
}

#[tokio::test]
async fn test_changes_to_other_resources_are_not_delivered() {
    let app = TestApp::spawn().await;
    app.write("/a", r#"{"v":1}"#);
    app.write("/b", r#"{"v":1}"#);
    let mut subscriber = app.subscribe("/a").await;
    subscriber.next_frame().await;

    app.change("/b", r#"{"v":2}"#).await;
    app.change("/a", r#"{"v":3}"#).await;

    let frame = subscriber.next_frame().await;
    assert_eq!(frame.version, Version::of(br#"{"v":3}"#));
}

#[tokio::test]
async fn test_shutdown_ends_subscription_streams() {
    let app = TestApp::spawn().await;
    app.write("/doc", r#"{"n":1}"#);
    let mut subscriber = app.subscribe("/doc").await;
    subscriber.next_frame().await;

    app.state.shutdown();

    subscriber.wait_closed().await;
}

#[tokio::test]
async fn test_change_during_subscribe_is_not_lost() {
    let app = TestApp::spawn().await;
    app.write("/doc", r#"{"n":1}"#);

    // Keep change handling out while the subscription is being opened.
    let held = app.state.change_gate().enter().await;
    let url = app.url("/doc");
    let pending = tokio::spawn(async move { common::Subscriber::connect(&url).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        app.state.registry().subscriber_count(&ResourceId::new("/doc")),
        0
    );

    app.change("/doc", r#"{"n":2}"#).await;
    drop(held);

    let mut subscriber = pending.await.unwrap();
    let first = subscriber.next_frame().await;
    assert_eq!(
        first,
        UpdateFrame::full(Version::of(br#"{"n":2}"#), Bytes::from_static(br#"{"n":2}"#))
    );

    // The change itself is not sent again once the subscriber has it.
    app.change("/doc", r#"{"n":3}"#).await;
    let next = subscriber.next_frame().await;
    assert_eq!(next.parents, vec![Version::of(br#"{"n":2}"#)]);
}
