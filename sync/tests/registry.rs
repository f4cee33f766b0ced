//! Shared connections through the channel registry.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::TestServer;
use livedesk_sync::channel::{ChannelConfig, ChannelState, Topic};
use livedesk_sync::events::{ChatEvent, ChatEventKind};
use livedesk_sync::ChannelRegistry;

#[tokio::test]
async fn test_two_consumers_share_one_transport() {
    let mut server = TestServer::start().await;
    let registry =
        ChannelRegistry::<ChatEvent>::new(ChannelConfig::new(&server.base_url)).expect("registry");
    let topic = Topic::chat("acc-1");

    let first = registry.acquire(topic.clone(), "first-token").expect("acquire");
    let second = registry.acquire(topic.clone(), "second-token").expect("acquire");

    let session = server.next_session().await;
    assert_eq!(session.uri, "/ws/chat/acc-1/?token=first-token");
    assert!(server.try_next_session(Duration::from_millis(300)).await.is_none());

    let typing = Arc::new(AtomicUsize::new(0));
    let subs: Vec<_> = [&first, &second]
        .iter()
        .map(|lease| {
            let typing = Arc::clone(&typing);
            lease.on(ChatEventKind::Typing, move |_| {
                typing.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .collect();
    assert_eq!(subs.len(), 2);

    let mut status = first.status();
    tokio::time::timeout(common::WAIT, status.wait_for(|s| s.state == ChannelState::Open))
        .await
        .expect("timed out")
        .expect("status");

    session.send_text(r#"{"type":"typing","phone_number":"5511","is_typing":true}"#);
    tokio::time::timeout(common::WAIT, async {
        while typing.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("both handlers called");
}

#[tokio::test]
async fn test_last_release_closes_transport() {
    let mut server = TestServer::start().await;
    let registry =
        ChannelRegistry::<ChatEvent>::new(ChannelConfig::new(&server.base_url)).expect("registry");
    let topic = Topic::chat("acc-2");

    let first = registry.acquire(topic.clone(), "t").expect("acquire");
    let second = registry.acquire(topic.clone(), "t").expect("acquire");
    let mut session = server.next_session().await;
    let status = first.status();

    drop(first);
    assert_eq!(registry.ref_count(&topic), 1);
    assert_ne!(status.borrow().state, ChannelState::Closed);

    second.release();
    assert!(registry.active_topics().is_empty());
    assert_eq!(status.borrow().state, ChannelState::Closed);
    assert!(session.recv_non_ping().await.is_none());
}

#[tokio::test]
async fn test_remaining_consumer_keeps_receiving_after_release() {
    let mut server = TestServer::start().await;
    let registry =
        ChannelRegistry::<ChatEvent>::new(ChannelConfig::new(&server.base_url)).expect("registry");
    let topic = Topic::chat("acc-3");

    let first = registry.acquire(topic.clone(), "t").expect("acquire");
    let second = registry.acquire(topic.clone(), "t").expect("acquire");
    let session = server.next_session().await;

    let typing = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&typing);
    let _sub = second.on(ChatEventKind::Typing, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let mut status = second.status();
    tokio::time::timeout(common::WAIT, status.wait_for(|s| s.state == ChannelState::Open))
        .await
        .expect("timed out")
        .expect("status");

    first.release();
    assert_eq!(second.state(), ChannelState::Open);

    session.send_text(r#"{"type":"typing","phone_number":"5511","is_typing":false}"#);
    tokio::time::timeout(common::WAIT, async {
        while typing.load(Ordering::SeqCst) < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("handler called after the other lease left");
    assert_eq!(server.peak_connections(), 1);
}

#[tokio::test]
async fn test_reacquire_waits_for_old_transport() {
    let mut server = TestServer::start().await;
    let registry =
        ChannelRegistry::<ChatEvent>::new(ChannelConfig::new(&server.base_url)).expect("registry");
    let topic = Topic::chat("acc-4");

    let lease = registry.acquire(topic.clone(), "t").expect("acquire");
    let mut old = server.next_session().await;
    let mut status = lease.status();
    tokio::time::timeout(common::WAIT, status.wait_for(|s| s.state == ChannelState::Open))
        .await
        .expect("timed out")
        .expect("status");

    drop(lease);
    let lease = registry.acquire(topic.clone(), "t").expect("acquire");

    let _new = server.next_session().await;
    let mut status = lease.status();
    tokio::time::timeout(common::WAIT, status.wait_for(|s| s.state == ChannelState::Open))
        .await
        .expect("timed out")
        .expect("status");
    assert!(old.recv_non_ping().await.is_none());
    assert_eq!(server.peak_connections(), 1);
    assert_eq!(registry.ref_count(&topic), 1);
}
