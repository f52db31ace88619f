//! Connection supervisor behavior against a scripted transport: refresh on
//! auth failure, fixed-delay reconnect, token rotation rebinds, logout
//! teardown, exactly-once event application.

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use chorus_client::auth::AuthManager;
use chorus_client::cache::ChatCache;
use chorus_client::events::EventHub;
use chorus_client::realtime::{spawn_supervisor, ConnectionState, RealtimeHandle, RealtimeOptions};
use chorus_client::tokens::TokenStore;
use chorus_shared::protocol::{ClientFrame, ServerFrame};
use chorus_shared::types::{ConversationId, Message, MessageId, MessageKind, Session, UserId};

use support::{wait_until, FakeAuthApi, FakeTransport, ScriptedConnect};

struct Rig {
    api: Arc<FakeAuthApi>,
    tokens: Arc<TokenStore>,
    cache: Arc<ChatCache>,
    transport: Arc<FakeTransport>,
    handle: RealtimeHandle,
}

fn rig() -> Rig {
    let api = Arc::new(FakeAuthApi::new());
    let tokens = Arc::new(TokenStore::new(None));
    let events = EventHub::new();
    let auth = Arc::new(AuthManager::new(api.clone(), tokens.clone(), events.clone()));
    let cache = Arc::new(ChatCache::new());
    let transport = Arc::new(FakeTransport::new());

    let handle = spawn_supervisor(
        RealtimeOptions {
            socket_url: "ws://test/socket".into(),
            reconnect_delay: Duration::from_millis(50),
        },
        transport.clone(),
        auth,
        tokens.clone(),
        cache.clone(),
        events,
    );

    Rig {
        api,
        tokens,
        cache,
        transport,
        handle,
    }
}

fn session(token: &str) -> Session {
    Session {
        access_token: token.into(),
        refresh_token: format!("{token}-refresh"),
    }
}

fn push_message(conversation: ConversationId, sender: UserId, content: &str) -> ServerFrame {
    ServerFrame::NewMessage {
        message: Message {
            id: MessageId::new(),
            conversation_id: conversation,
            sender,
            kind: MessageKind::Text,
            content: content.into(),
            reply_to: None,
            created_at: Utc::now(),
            edited_at: None,
            deleted: false,
            pinned: false,
        },
    }
}

#[tokio::test(start_paused = true)]
async fn connect_without_a_session_stays_disconnected() {
    let rig = rig();

    assert!(rig.handle.connect().await.is_err());
    assert_eq!(rig.handle.state(), ConnectionState::Disconnected);
    assert_eq!(rig.transport.connect_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn connect_uses_the_current_access_token() {
    let rig = rig();
    rig.tokens.set(session("tok-1"));

    rig.handle.connect().await.unwrap();

    assert_eq!(rig.handle.state(), ConnectionState::Connected);
    assert_eq!(rig.transport.connect_tokens(), vec!["tok-1".to_string()]);
    assert_eq!(rig.transport.live.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn auth_rejection_refreshes_and_retries_once() {
    let rig = rig();
    rig.tokens.set(session("stale"));
    rig.transport.script(&[ScriptedConnect::RejectAuth]);

    rig.handle.connect().await.unwrap();

    assert_eq!(rig.handle.state(), ConnectionState::Connected);
    assert_eq!(rig.api.refresh_calls.load(Ordering::SeqCst), 1);
    // First attempt with the stale token, second with the refreshed one.
    assert_eq!(
        rig.transport.connect_tokens(),
        vec!["stale".to_string(), "access-r1".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn auth_rejection_with_failing_refresh_forces_logout() {
    let rig = rig();
    rig.tokens.set(session("stale"));
    rig.api.fail_refresh.store(true, Ordering::SeqCst);
    rig.transport.script(&[ScriptedConnect::RejectAuth]);

    assert!(rig.handle.connect().await.is_err());

    assert_eq!(rig.handle.state(), ConnectionState::Disconnected);
    assert!(rig.tokens.get().is_none());
    assert_eq!(rig.transport.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn unexpected_drop_reconnects_after_the_fixed_delay() {
    let rig = rig();
    rig.tokens.set(session("tok-1"));
    rig.handle.connect().await.unwrap();

    rig.transport.drop_connection();

    let handle = &rig.handle;
    wait_until("reconnecting state", || {
        handle.state() == ConnectionState::Reconnecting
    })
    .await;

    wait_until("reconnect", || handle.state() == ConnectionState::Connected).await;
    assert_eq!(rig.transport.connect_count(), 2);

    let transport = &rig.transport;
    wait_until("single live handle", || {
        transport.live.load(Ordering::SeqCst) == 1
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_keeps_retrying_at_the_fixed_cadence() {
    let rig = rig();
    rig.tokens.set(session("tok-1"));
    rig.handle.connect().await.unwrap();

    // Two attempts fail before one succeeds.
    rig.transport
        .script(&[ScriptedConnect::Fail, ScriptedConnect::Fail]);
    rig.transport.drop_connection();

    let handle = &rig.handle;
    wait_until("reconnect", || handle.state() == ConnectionState::Connected).await;
    // Initial connect + two failed retries + the successful one.
    assert_eq!(rig.transport.connect_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn token_rotation_rebinds_the_live_connection() {
    let rig = rig();
    rig.tokens.set(session("tok-1"));
    rig.handle.connect().await.unwrap();

    rig.tokens.set(session("tok-2"));

    let transport = &rig.transport;
    wait_until("rebind with rotated token", || {
        transport.connect_tokens().last() == Some(&"tok-2".to_string())
    })
    .await;
    let handle = &rig.handle;
    wait_until("connected", || handle.state() == ConnectionState::Connected).await;
    wait_until("single live handle", || {
        transport.live.load(Ordering::SeqCst) == 1
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn drop_then_rotation_converges_on_the_rotated_token() {
    let rig = rig();
    rig.tokens.set(session("tok-1"));
    rig.handle.connect().await.unwrap();

    // Channel drops, then the token rotates while we are waiting to retry.
    rig.transport.drop_connection();
    let handle = &rig.handle;
    wait_until("reconnecting state", || {
        handle.state() == ConnectionState::Reconnecting
    })
    .await;
    rig.tokens.set(session("tok-2"));

    wait_until("reconnect", || handle.state() == ConnectionState::Connected).await;
    assert_eq!(
        rig.transport.connect_tokens().last(),
        Some(&"tok-2".to_string())
    );
    let transport = &rig.transport;
    wait_until("single live handle", || {
        transport.live.load(Ordering::SeqCst) == 1
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn rotation_to_the_same_token_does_not_rebind() {
    let rig = rig();
    rig.tokens.set(session("tok-1"));
    rig.handle.connect().await.unwrap();

    rig.tokens.set(session("tok-1"));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(rig.transport.connect_count(), 1);
    assert_eq!(rig.handle.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn token_clear_disconnects_without_reconnecting() {
    let rig = rig();
    rig.tokens.set(session("tok-1"));
    rig.handle.connect().await.unwrap();

    rig.tokens.clear();

    let handle = &rig.handle;
    wait_until("disconnected", || {
        handle.state() == ConnectionState::Disconnected
    })
    .await;

    // No auto-reconnect follows a logout.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(rig.transport.connect_count(), 1);
    assert_eq!(rig.transport.live.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_idempotent_from_any_state() {
    let rig = rig();

    // Disconnected already: a no-op.
    rig.handle.disconnect().await.unwrap();
    assert_eq!(rig.handle.state(), ConnectionState::Disconnected);

    rig.tokens.set(session("tok-1"));
    rig.handle.connect().await.unwrap();

    rig.handle.disconnect().await.unwrap();
    rig.handle.disconnect().await.unwrap();

    let handle = &rig.handle;
    wait_until("disconnected", || {
        handle.state() == ConnectionState::Disconnected
    })
    .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    // A deliberate disconnect never reconnects.
    assert_eq!(rig.transport.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn redelivered_push_event_applies_once() {
    let rig = rig();
    rig.tokens.set(session("tok-1"));
    rig.handle.connect().await.unwrap();

    let conversation = ConversationId::new();
    let frame = push_message(conversation, UserId::new(), "hello");

    rig.transport.push_frame(frame.clone());
    // Same event redelivered after a simulated resync.
    rig.transport.push_frame(frame);

    let cache = &rig.cache;
    wait_until("message applied", || !cache.messages(conversation).is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.messages(conversation).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn optimistic_send_collapses_with_the_echo_after_reconnect() {
    let rig = rig();
    rig.tokens.set(session("tok-1"));
    rig.handle.connect().await.unwrap();

    let conversation = ConversationId::new();
    let sender = UserId::new();

    // The channel drops; the user sends while offline.
    rig.transport.drop_connection();
    let handle = &rig.handle;
    wait_until("reconnecting state", || {
        handle.state() == ConnectionState::Reconnecting
    })
    .await;

    let local = Message {
        id: MessageId::new(),
        conversation_id: conversation,
        sender,
        kind: MessageKind::Text,
        content: "sent while offline".into(),
        reply_to: None,
        created_at: Utc::now(),
        edited_at: None,
        deleted: false,
        pinned: false,
    };
    rig.cache.insert_optimistic(local.clone());
    rig.handle
        .send_frame(ClientFrame::SendMessage {
            conversation_id: conversation,
            message_id: local.id,
            kind: local.kind,
            content: local.content.clone(),
            reply_to: None,
            created_at: local.created_at,
        })
        .await
        .unwrap();

    wait_until("reconnect", || handle.state() == ConnectionState::Connected).await;

    // The buffered frame was flushed on the new connection.
    let transport = &rig.transport;
    wait_until("queued frame flushed", || {
        transport
            .sent_frames()
            .iter()
            .any(|f| matches!(f, ClientFrame::SendMessage { message_id, .. } if *message_id == local.id))
    })
    .await;

    // Server echo: real id, same sender/kind, within the proximity window.
    let mut echoed = local.clone();
    echoed.id = MessageId::new();
    echoed.created_at = local.created_at + chrono::Duration::milliseconds(900);
    rig.transport.push_frame(ServerFrame::NewMessage {
        message: echoed.clone(),
    });

    let cache = &rig.cache;
    wait_until("echo reconciled", || {
        let messages = cache.messages(conversation);
        messages.len() == 1 && messages[0].id == echoed.id
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn joined_conversations_are_rejoined_after_reconnect() {
    let rig = rig();
    rig.tokens.set(session("tok-1"));
    rig.handle.connect().await.unwrap();

    let conversation = ConversationId::new();
    rig.handle.join_conversation(conversation).await.unwrap();

    let transport = &rig.transport;
    wait_until("join sent", || {
        transport
            .sent_frames()
            .iter()
            .filter(|f| matches!(f, ClientFrame::JoinConversation { conversation_id } if *conversation_id == conversation))
            .count()
            == 1
    })
    .await;

    rig.transport.drop_connection();
    let handle = &rig.handle;
    wait_until("reconnect", || handle.state() == ConnectionState::Connected).await;

    wait_until("rejoined", || {
        transport
            .sent_frames()
            .iter()
            .filter(|f| matches!(f, ClientFrame::JoinConversation { conversation_id } if *conversation_id == conversation))
            .count()
            == 2
    })
    .await;
}
