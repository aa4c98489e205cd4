//! Session correlation, dispatch and shutdown against a scripted endpoint.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use serde_json::json;

use cdp_pilot::{Error, Event, SessionOptions, TargetId};

use common::{MockBrowser, Reply, eventually};

// ============================================================================
// Correlation
// ============================================================================

#[tokio::test]
async fn test_concurrent_sends_pair_with_their_responses() -> Result<()> {
    common::init_tracing();

    // Later requests answer first.
    let mock = MockBrowser::start(|cmd| {
        let n = cmd.params["n"].as_u64().unwrap_or(0);
        Reply::Delayed(Duration::from_millis(200 - n * 15), json!({"n": n}))
    })
    .await?;
    let session = mock.connect().await?;

    let calls = (0..10u64).map(|n| {
        let session = session.clone();
        async move { session.send("Test.echo", json!({"n": n})).await }
    });
    let results = futures_util::future::join_all(calls).await;

    for (n, result) in results.into_iter().enumerate() {
        assert_eq!(result?["n"], json!(n));
    }

    let ids: HashSet<u64> = mock.recorded().iter().map(|r| r.id).collect();
    assert_eq!(ids.len(), 10);
    assert_eq!(session.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_protocol_error_stays_with_its_caller() -> Result<()> {
    let mock = MockBrowser::start(|cmd| match cmd.method.as_str() {
        "Bad.method" => Reply::Error(-32601, "'Bad.method' wasn't found".to_string()),
        _ => Reply::Delayed(Duration::from_millis(50), json!({"ok": true})),
    })
    .await?;
    let session = mock.connect().await?;

    let (good, bad) = tokio::join!(
        session.send("Good.method", json!({})),
        session.send("Bad.method", json!({})),
    );

    assert_eq!(good?["ok"], json!(true));
    match bad {
        Err(Error::CommandFailed { method, code, .. }) => {
            assert_eq!(method, "Bad.method");
            assert_eq!(code, -32601);
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }
    assert!(!session.is_closed());
    Ok(())
}

#[tokio::test]
async fn test_request_timeout_clears_pending_entry() -> Result<()> {
    let mock = MockBrowser::start(|_| Reply::Silent).await?;
    let session = mock.connect().await?;

    let err = session
        .send_with_timeout("Slow.method", json!({}), Duration::from_millis(100))
        .await
        .expect_err("no reply");

    assert!(matches!(err, Error::RequestTimeout { .. }));
    assert!(err.is_timeout());
    assert!(eventually(Duration::from_secs(1), || session.pending_count() == 0).await);
    Ok(())
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() -> Result<()> {
    let mock = MockBrowser::echo().await?;
    let session = mock.connect().await?;

    mock.push_raw("this is not json");
    mock.push_raw(r#"{"neither": "response nor event"}"#);
    mock.push_raw(r#"{"id": 999999, "result": {}}"#);

    let result = session.send("Still.works", json!({})).await?;
    assert_eq!(result, json!({}));
    Ok(())
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_close_rejects_every_pending_request() -> Result<()> {
    let mock = MockBrowser::start(|_| Reply::Silent).await?;
    let session = mock.connect().await?;

    let mut calls = Vec::new();
    for n in 0..5 {
        let session = session.clone();
        calls.push(tokio::spawn(async move {
            session.send("Never.answered", json!({"n": n})).await
        }));
    }
    assert!(mock.wait_for("Never.answered", 5).await);
    assert_eq!(session.pending_count(), 5);

    session.close().await;

    for call in calls {
        assert!(matches!(call.await?, Err(Error::ConnectionClosed)));
    }
    assert_eq!(session.pending_count(), 0);
    assert!(session.is_closed());

    let after = session.send("Too.late", json!({})).await;
    assert!(matches!(after, Err(Error::ConnectionClosed)));
    Ok(())
}

#[tokio::test]
async fn test_remote_close_rejects_pending_and_children() -> Result<()> {
    let mock = MockBrowser::start(|_| Reply::Silent).await?;
    let session = mock.connect().await?;
    let child = session.child("S1");

    let pending = tokio::spawn({
        let child = child.clone();
        async move { child.send("Never.answered", json!({})).await }
    });
    assert!(mock.wait_for("Never.answered", 1).await);

    mock.close();

    assert!(matches!(pending.await?, Err(Error::ConnectionClosed)));
    assert!(eventually(Duration::from_secs(2), || child.is_closed()).await);
    assert!(session.is_closed());
    Ok(())
}

#[tokio::test]
async fn test_pending_cap() -> Result<()> {
    let mock = MockBrowser::start(|_| Reply::Silent).await?;
    let session = mock
        .connect_with(
            SessionOptions::new()
                .with_max_pending(1)
                .with_command_timeout(Duration::from_secs(5)),
        )
        .await?;

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.send("Hold.on", json!({})).await }
    });
    assert!(mock.wait_for("Hold.on", 1).await);

    let second = session.send("One.more", json!({})).await;
    assert!(second.is_err());

    session.close().await;
    assert!(first.await?.is_err());
    Ok(())
}

// ============================================================================
// Flatten Mode
// ============================================================================

#[tokio::test]
async fn test_child_session_stamps_session_id() -> Result<()> {
    let mock = MockBrowser::echo().await?;
    let session = mock.connect().await?;

    session.send("Root.call", json!({})).await?;
    session.child("S1").send("Child.call", json!({})).await?;

    assert_eq!(mock.find("Root.call")[0].session_id, None);
    assert_eq!(mock.find("Child.call")[0].session_id.as_deref(), Some("S1"));
    Ok(())
}

#[tokio::test]
async fn test_attach_uses_flatten_mode() -> Result<()> {
    let mock = MockBrowser::start(|cmd| match cmd.method.as_str() {
        "Target.getTargets" => Reply::Result(json!({"targetInfos": [
            {"targetId": "T1", "type": "page", "title": "Example", "url": "https://example.com", "attached": false}
        ]})),
        "Target.attachToTarget" => Reply::Result(json!({"sessionId": "S7"})),
        _ => Reply::Result(json!({})),
    })
    .await?;
    let browser = mock.connect().await?;

    let targets = browser.targets().await?;
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].target_type, "page");

    let tab = browser.attach(&TargetId::new("T1")).await?;
    assert_eq!(tab.session_id().map(|s| s.as_str()), Some("S7"));

    let attach = &mock.find("Target.attachToTarget")[0];
    assert_eq!(attach.params["targetId"], json!("T1"));
    assert_eq!(attach.params["flatten"], json!(true));
    assert_eq!(attach.session_id, None);
    Ok(())
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_scoped_and_global_delivery() -> Result<()> {
    let mock = MockBrowser::echo().await?;
    let session = mock.connect().await?;

    let global = Arc::new(AtomicUsize::new(0));
    let scoped = Arc::new(AtomicUsize::new(0));

    session.on("Test.ping", {
        let global = Arc::clone(&global);
        move |_: &Event| {
            global.fetch_add(1, Ordering::SeqCst);
        }
    });
    session.child("S1").on("Test.ping", {
        let scoped = Arc::clone(&scoped);
        move |_: &Event| {
            scoped.fetch_add(1, Ordering::SeqCst);
        }
    });

    mock.push_event("Test.ping", json!({}), Some("S1"));
    mock.push_event("Test.ping", json!({}), Some("S2"));
    mock.push_event("Test.ping", json!({}), None);

    assert!(eventually(Duration::from_secs(2), || global.load(Ordering::SeqCst) == 3).await);
    assert_eq!(scoped.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_panicking_handler_does_not_stop_delivery() -> Result<()> {
    let mock = MockBrowser::echo().await?;
    let session = mock.connect().await?;
    let seen = Arc::new(AtomicUsize::new(0));

    session.on("Test.boom", |_: &Event| panic!("handler failure"));
    session.on("Test.boom", {
        let seen = Arc::clone(&seen);
        move |_: &Event| {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    });

    mock.push_event("Test.boom", json!({}), None);
    mock.push_event("Test.boom", json!({}), None);

    assert!(eventually(Duration::from_secs(2), || seen.load(Ordering::SeqCst) == 2).await);

    // Bookkeeping survived.
    assert_eq!(session.send("After.panic", json!({})).await?, json!({}));
    Ok(())
}

#[tokio::test]
async fn test_off_removes_only_that_handler() -> Result<()> {
    let mock = MockBrowser::echo().await?;
    let session = mock.connect().await?;
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let id = session.on("Test.tick", {
        let first = Arc::clone(&first);
        move |_: &Event| {
            first.fetch_add(1, Ordering::SeqCst);
        }
    });
    session.on("Test.tick", {
        let second = Arc::clone(&second);
        move |_: &Event| {
            second.fetch_add(1, Ordering::SeqCst);
        }
    });

    assert!(session.off("Test.tick", id));
    assert!(!session.off("Test.tick", id));

    mock.push_event("Test.tick", json!({}), None);
    assert!(eventually(Duration::from_secs(2), || second.load(Ordering::SeqCst) == 1).await);
    assert_eq!(first.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_detached_session_loses_scoped_handlers() -> Result<()> {
    let mock = MockBrowser::echo().await?;
    let session = mock.connect().await?;
    let seen = Arc::new(AtomicUsize::new(0));

    session.child("S1").on("Test.ping", {
        let seen = Arc::clone(&seen);
        move |_: &Event| {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    });

    mock.push_event("Target.detachedFromTarget", json!({"sessionId": "S1"}), None);
    mock.push_event("Test.ping", json!({}), Some("S1"));

    // Frames are handled in order; a round trip after them flushes both.
    session.send("Test.flush", json!({})).await?;
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_wait_for_event() -> Result<()> {
    let mock = MockBrowser::echo().await?;
    let session = mock.connect().await?;

    let waiter = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .wait_for_event("Page.loadEventFired", Duration::from_secs(2))
                .await
        }
    });

    // Give the waiter a moment to subscribe.
    tokio::time::sleep(Duration::from_millis(50)).await;
    mock.push_event("Page.loadEventFired", json!({"timestamp": 1.0}), None);

    let event = waiter.await??.expect("event arrives");
    assert_eq!(event.params["timestamp"], json!(1.0));

    let none = session
        .wait_for_event("Page.loadEventFired", Duration::from_millis(50))
        .await?;
    assert!(none.is_none());
    Ok(())
}
