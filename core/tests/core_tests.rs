/// Core chat tests
/// Integration tests for the presence registry, friend request engine,
/// conversation store, and the socket-level session lifecycle

extern crate chatlink_core;

use chatlink_core::dispatch::EventDispatcher;
use chatlink_core::friends::FriendRequestEngine;
use chatlink_core::presence::{ConnectionHandle, PresenceRegistry};
use chatlink_core::protocol::{read_frame, write_event, ClientEvent, ReplyData, ServerEvent};
use chatlink_core::store::{ConversationStore, RequestStore, UserStore};
use chatlink_core::types::{MessageKind, PresenceStatus, UserRecord};
use chatlink_core::{Config, Hub};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

const MAX_FRAME: usize = 256 * 1024;

fn fixtures(dir: &TempDir) -> (UserStore, RequestStore, ConversationStore) {
    let users = UserStore::new(dir.path()).unwrap();
    let requests = RequestStore::new(dir.path()).unwrap();
    let conversations = ConversationStore::new(dir.path()).unwrap();

    users.upsert(&UserRecord::new("u1", "Ada", "Lovelace")).unwrap();
    users.upsert(&UserRecord::new("u2", "Alan", "Turing")).unwrap();
    users.upsert(&UserRecord::new("u3", "Grace", "Hopper")).unwrap();

    (users, requests, conversations)
}

fn handle(conn_id: &str) -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ConnectionHandle {
            conn_id: conn_id.to_string(),
            sender: tx,
        },
        rx,
    )
}

#[tokio::test]
async fn test_accept_request_makes_friendship_symmetric() {
    let dir = TempDir::new().unwrap();
    let (users, requests, _conversations) = fixtures(&dir);

    let presence = PresenceRegistry::new(users.clone());
    let dispatcher = EventDispatcher::new(presence);
    let engine = FriendRequestEngine::new(users.clone(), requests.clone(), dispatcher);

    let request = engine.send_request("u2", "u1").await.unwrap();
    assert_eq!(request.sender, "u2");
    assert_eq!(request.receipt, "u1");
    assert!(requests.get(&request.request_id).unwrap().is_some());

    engine.accept_request(&request.request_id).await.unwrap();

    let u1 = users.require("u1").unwrap();
    let u2 = users.require("u2").unwrap();
    assert!(u1.friends.contains(&"u2".to_string()));
    assert!(u2.friends.contains(&"u1".to_string()));
    // The pending request is consumed on acceptance
    assert!(requests.get(&request.request_id).unwrap().is_none());

    // Accepting again reports the request as gone
    assert!(engine.accept_request(&request.request_id).await.is_err());
}

#[tokio::test]
async fn test_self_friend_request_rejected() {
    let dir = TempDir::new().unwrap();
    let (users, requests, _) = fixtures(&dir);

    let presence = PresenceRegistry::new(users.clone());
    let dispatcher = EventDispatcher::new(presence);
    let engine = FriendRequestEngine::new(users, requests, dispatcher);

    let err = engine.send_request("u1", "u1").await.unwrap_err();
    assert_eq!(err.kind(), "invalid_target");

    let err = engine.send_request("u1", "nobody").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_find_or_create_is_unique_across_orderings() {
    let dir = TempDir::new().unwrap();
    let (_, _, conversations) = fixtures(&dir);

    let first = conversations.find_or_create("u1", "u2").unwrap();
    let second = conversations.find_or_create("u2", "u1").unwrap();
    assert_eq!(first.conversation_id, second.conversation_id);
    assert_eq!(first.conversation_id, "dm:u1:u2");

    assert_eq!(conversations.for_user("u1").unwrap().len(), 1);
    assert_eq!(conversations.for_user("u2").unwrap().len(), 1);

    // Exactly two distinct participants
    assert!(conversations.find_or_create("u1", "u1").is_err());
}

#[tokio::test]
async fn test_find_or_create_is_unique_under_concurrency() {
    let dir = TempDir::new().unwrap();
    let (_, _, conversations) = fixtures(&dir);

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = conversations.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            if i % 2 == 0 {
                store.find_or_create("u1", "u2")
            } else {
                store.find_or_create("u2", "u1")
            }
        }));
    }

    let mut ids = Vec::new();
    for h in handles {
        ids.push(h.await.unwrap().unwrap().conversation_id);
    }
    ids.dedup();
    assert_eq!(ids, vec!["dm:u1:u2".to_string()]);
    assert_eq!(conversations.for_user("u1").unwrap().len(), 1);
}

#[tokio::test]
async fn test_message_log_is_append_only_and_ordered() {
    let dir = TempDir::new().unwrap();
    let (_, _, conversations) = fixtures(&dir);

    let conversation = conversations.find_or_create("u1", "u2").unwrap();
    let id = &conversation.conversation_id;

    for i in 0..5 {
        conversations
            .append_message(id, "u1", "u2", MessageKind::Text, Some(format!("m{}", i)), None)
            .unwrap();
    }

    let log = conversations.messages(id).unwrap();
    assert_eq!(log.len(), 5);
    for (i, msg) in log.iter().enumerate() {
        assert_eq!(msg.text.as_deref(), Some(format!("m{}", i).as_str()));
    }
    assert!(log.windows(2).all(|w| w[0].seq < w[1].seq));

    let last = conversations.last_message(id).unwrap().unwrap();
    assert_eq!(last.text.as_deref(), Some("m4"));

    // Appending to a missing conversation is a NotFound failure
    let err = conversations
        .append_message("dm:u1:u9", "u1", "u9", MessageKind::Text, Some("x".into()), None)
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_presence_reflects_latest_registration() {
    let dir = TempDir::new().unwrap();
    let (users, _, _) = fixtures(&dir);
    let presence = PresenceRegistry::new(users.clone());

    let (h1, _rx1) = handle("conn-1");
    presence.register("u1", h1).await;
    assert!(presence.is_online("u1").await);
    assert_eq!(users.require("u1").unwrap().status, PresenceStatus::Online);

    // Second connection for the same user wins
    let (h2, _rx2) = handle("conn-2");
    presence.register("u1", h2).await;
    assert_eq!(presence.lookup("u1").await.unwrap().conn_id, "conn-2");

    // A stale session closing must not clobber the newer binding
    presence.unregister_conn("u1", "conn-1").await;
    assert!(presence.is_online("u1").await);

    presence.unregister("u1").await;
    assert!(presence.lookup("u1").await.is_none());
    assert_eq!(users.require("u1").unwrap().status, PresenceStatus::Offline);

    // Idempotent
    presence.unregister("u1").await;
    assert!(!presence.is_online("u1").await);
}

#[tokio::test]
async fn test_emit_to_offline_user_is_a_silent_noop() {
    let dir = TempDir::new().unwrap();
    let (users, _, _) = fixtures(&dir);
    let presence = PresenceRegistry::new(users);
    let dispatcher = EventDispatcher::new(presence.clone());

    // Completes without error, delivers nothing
    dispatcher
        .emit(
            "ghost",
            ServerEvent::RequestSent {
                request_id: "r1".to_string(),
            },
        )
        .await;

    // A registered user does receive the event
    let (h, mut rx) = handle("conn-1");
    presence.register("u1", h).await;
    dispatcher
        .emit(
            "u1",
            ServerEvent::RequestSent {
                request_id: "r2".to_string(),
            },
        )
        .await;
    match rx.recv().await.unwrap() {
        ServerEvent::RequestSent { request_id } => assert_eq!(request_id, "r2"),
        other => panic!("unexpected event: {}", other),
    }
}

// ─── Socket-level scenarios ──────────────────────────────────────────

struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    /// Connect and authenticate with a previously-issued token.
    async fn connect(addr: &str, token: &str) -> Self {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_event(
            &mut stream,
            &ClientEvent::Hello {
                token: token.to_string(),
            },
        )
        .await
        .unwrap();
        let mut client = Self { stream };
        match client.recv().await {
            ServerEvent::Hello { .. } => {}
            other => panic!("expected hello reply, got {}", other),
        }
        client
    }

    async fn send(&mut self, event: &ClientEvent) {
        write_event(&mut self.stream, event).await.unwrap();
    }

    async fn recv(&mut self) -> ServerEvent {
        let payload = timeout(Duration::from_secs(5), read_frame(&mut self.stream, MAX_FRAME))
            .await
            .expect("timed out waiting for event")
            .unwrap()
            .expect("connection closed");
        serde_json::from_slice(&payload).unwrap()
    }

    /// Skip interleaved pushes until the next ack arrives.
    async fn recv_ack(&mut self) -> ServerEvent {
        loop {
            let event = self.recv().await;
            if matches!(event, ServerEvent::Ack { .. }) {
                return event;
            }
        }
    }
}

async fn start_hub(port: u16, dir: &TempDir) -> Arc<Hub> {
    let config = Config {
        listen_addr: format!("127.0.0.1:{}", port).parse().unwrap(),
        data_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    let hub = Arc::new(Hub::new(config).unwrap());

    let listener = hub.clone();
    tokio::spawn(async move {
        let _ = listener.run_listener().await;
    });
    sleep(Duration::from_millis(200)).await;
    hub
}

#[tokio::test]
async fn test_friend_request_lifecycle_over_sockets() {
    let dir = TempDir::new().unwrap();
    let hub = start_hub(19101, &dir).await;

    hub.users().upsert(&UserRecord::new("u1", "Ada", "Lovelace")).unwrap();
    hub.users().upsert(&UserRecord::new("u2", "Alan", "Turing")).unwrap();
    let t1 = hub.tokens().issue("u1").unwrap();
    let t2 = hub.tokens().issue("u2").unwrap();

    let mut c1 = TestClient::connect("127.0.0.1:19101", &t1).await;
    let mut c2 = TestClient::connect("127.0.0.1:19101", &t2).await;
    sleep(Duration::from_millis(100)).await;
    assert!(hub.presence().is_online("u1").await);
    assert!(hub.presence().is_online("u2").await);

    // u2 sends a friend request to u1
    c2.send(&ClientEvent::FriendRequest {
        from: "u2".to_string(),
        to: "u1".to_string(),
    })
    .await;

    // u1 is pushed the new request
    let request = match c1.recv().await {
        ServerEvent::NewFriendRequest { request } => request,
        other => panic!("expected newFriendRequest, got {}", other),
    };
    assert_eq!(request.sender, "u2");
    assert_eq!(request.receipt, "u1");

    // u2 gets the requestSent push and a success ack
    match c2.recv().await {
        ServerEvent::RequestSent { request_id } => assert_eq!(request_id, request.request_id),
        other => panic!("expected requestSent, got {}", other),
    }
    match c2.recv_ack().await {
        ServerEvent::Ack { ok, data, .. } => {
            assert!(ok);
            assert!(matches!(data, Some(ReplyData::Requested { .. })));
        }
        _ => unreachable!(),
    }

    // u1 accepts; both parties learn about it
    c1.send(&ClientEvent::AcceptRequest {
        request_id: request.request_id.clone(),
    })
    .await;

    match c1.recv().await {
        ServerEvent::FriendRequestAccepted { friend, .. } => assert_eq!(friend.user_id, "u2"),
        other => panic!("expected friendRequestAccepted, got {}", other),
    }
    match c2.recv().await {
        ServerEvent::FriendRequestAccepted { friend, .. } => assert_eq!(friend.user_id, "u1"),
        other => panic!("expected friendRequestAccepted, got {}", other),
    }

    let u1 = hub.users().require("u1").unwrap();
    let u2 = hub.users().require("u2").unwrap();
    assert!(u1.friends.contains(&"u2".to_string()));
    assert!(u2.friends.contains(&"u1".to_string()));
    assert!(hub.friends().pending_for("u1").unwrap().is_empty());
}

#[tokio::test]
async fn test_messaging_scenario_over_sockets() {
    let dir = TempDir::new().unwrap();
    let hub = start_hub(19102, &dir).await;

    hub.users().upsert(&UserRecord::new("u1", "Ada", "Lovelace")).unwrap();
    hub.users().upsert(&UserRecord::new("u2", "Alan", "Turing")).unwrap();
    let t1 = hub.tokens().issue("u1").unwrap();
    let t2 = hub.tokens().issue("u2").unwrap();

    let mut c1 = TestClient::connect("127.0.0.1:19102", &t1).await;
    let mut c2 = TestClient::connect("127.0.0.1:19102", &t2).await;

    // u1 opens the chat; the initiator is pushed startChat
    c1.send(&ClientEvent::StartConversation {
        to: "u2".to_string(),
        from: "u1".to_string(),
    })
    .await;
    let conversation_id = match c1.recv().await {
        ServerEvent::StartChat { conversation } => {
            assert_eq!(conversation.participants.len(), 2);
            conversation.conversation_id
        }
        other => panic!("expected startChat, got {}", other),
    };
    c1.recv_ack().await;

    // u2 opening the same chat lands on the same conversation
    c2.send(&ClientEvent::StartConversation {
        to: "u1".to_string(),
        from: "u2".to_string(),
    })
    .await;
    match c2.recv_ack().await {
        ServerEvent::Ack { data, .. } => match data {
            Some(ReplyData::Conversation { conversation }) => {
                assert_eq!(conversation.conversation_id, conversation_id)
            }
            other => panic!("unexpected ack data: {:?}", other),
        },
        _ => unreachable!(),
    }

    // u1 sends a text message; both parties receive newMessage
    c1.send(&ClientEvent::TextMessage {
        conversation_id: conversation_id.clone(),
        message: "hi".to_string(),
        to: "u2".to_string(),
        from: "u1".to_string(),
        kind: MessageKind::Text,
    })
    .await;

    match c2.recv().await {
        ServerEvent::NewMessage { conversation_id: id, message } => {
            assert_eq!(id, conversation_id);
            assert_eq!(message.text.as_deref(), Some("hi"));
            assert_eq!(message.from, "u1");
        }
        other => panic!("expected newMessage, got {}", other),
    }
    match c1.recv().await {
        ServerEvent::NewMessage { message, .. } => {
            assert_eq!(message.text.as_deref(), Some("hi"))
        }
        other => panic!("expected newMessage, got {}", other),
    }
    c1.recv_ack().await;

    // The log grew by exactly one message, readable via getMessages
    c2.send(&ClientEvent::GetMessages {
        conversation_id: conversation_id.clone(),
    })
    .await;
    match c2.recv_ack().await {
        ServerEvent::Ack { ok, data, .. } => {
            assert!(ok);
            match data {
                Some(ReplyData::Messages { messages }) => {
                    assert_eq!(messages.len(), 1);
                    assert_eq!(messages[0].text.as_deref(), Some("hi"));
                }
                other => panic!("unexpected ack data: {:?}", other),
            }
        }
        _ => unreachable!(),
    }

    // getDirectConversation lists the conversation with resolved names
    c1.send(&ClientEvent::GetDirectConversation {
        user_id: "u1".to_string(),
    })
    .await;
    match c1.recv_ack().await {
        ServerEvent::Ack { data, .. } => match data {
            Some(ReplyData::Conversations { conversations }) => {
                assert_eq!(conversations.len(), 1);
                assert_eq!(conversations[0].last_preview.as_deref(), Some("hi"));
                assert!(conversations[0]
                    .participants
                    .iter()
                    .any(|p| p.first_name == "Alan"));
            }
            other => panic!("unexpected ack data: {:?}", other),
        },
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_end_event_marks_user_offline() {
    let dir = TempDir::new().unwrap();
    let hub = start_hub(19103, &dir).await;

    hub.users().upsert(&UserRecord::new("u1", "Ada", "Lovelace")).unwrap();
    let t1 = hub.tokens().issue("u1").unwrap();

    let mut c1 = TestClient::connect("127.0.0.1:19103", &t1).await;
    sleep(Duration::from_millis(100)).await;
    assert!(hub.presence().is_online("u1").await);

    c1.send(&ClientEvent::End {
        id: "u1".to_string(),
    })
    .await;
    sleep(Duration::from_millis(200)).await;

    assert!(!hub.presence().is_online("u1").await);
    assert_eq!(
        hub.users().require("u1").unwrap().status,
        PresenceStatus::Offline
    );
}

#[tokio::test]
async fn test_transport_drop_runs_cleanup() {
    let dir = TempDir::new().unwrap();
    let hub = start_hub(19104, &dir).await;

    hub.users().upsert(&UserRecord::new("u1", "Ada", "Lovelace")).unwrap();
    let t1 = hub.tokens().issue("u1").unwrap();

    let c1 = TestClient::connect("127.0.0.1:19104", &t1).await;
    sleep(Duration::from_millis(100)).await;
    assert!(hub.presence().is_online("u1").await);

    // No explicit end event: dropping the socket must trigger the
    // same cleanup path
    drop(c1);
    sleep(Duration::from_millis(300)).await;

    assert!(!hub.presence().is_online("u1").await);
}

#[tokio::test]
async fn test_unknown_token_is_rejected_at_handshake() {
    let dir = TempDir::new().unwrap();
    let hub = start_hub(19105, &dir).await;
    hub.users().upsert(&UserRecord::new("u1", "Ada", "Lovelace")).unwrap();

    let mut stream = TcpStream::connect("127.0.0.1:19105").await.unwrap();
    write_event(
        &mut stream,
        &ClientEvent::Hello {
            token: "forged".to_string(),
        },
    )
    .await
    .unwrap();

    let payload = timeout(Duration::from_secs(5), read_frame(&mut stream, MAX_FRAME))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let event: ServerEvent = serde_json::from_slice(&payload).unwrap();
    match event {
        ServerEvent::Ack { ok, kind, .. } => {
            assert!(!ok);
            assert_eq!(kind.as_deref(), Some("auth"));
        }
        other => panic!("expected failure ack, got {}", other),
    }
    assert!(!hub.presence().is_online("u1").await);
}

#[tokio::test]
async fn test_handler_failure_does_not_kill_the_connection() {
    let dir = TempDir::new().unwrap();
    let hub = start_hub(19106, &dir).await;

    hub.users().upsert(&UserRecord::new("u1", "Ada", "Lovelace")).unwrap();
    let t1 = hub.tokens().issue("u1").unwrap();
    let mut c1 = TestClient::connect("127.0.0.1:19106", &t1).await;

    // References a conversation that does not exist
    c1.send(&ClientEvent::GetMessages {
        conversation_id: "dm:u1:u9".to_string(),
    })
    .await;
    match c1.recv_ack().await {
        ServerEvent::Ack { ok, kind, .. } => {
            assert!(!ok);
            assert_eq!(kind.as_deref(), Some("not_found"));
        }
        _ => unreachable!(),
    }

    // The session is still alive and serves the next event
    c1.send(&ClientEvent::GetDirectConversation {
        user_id: "u1".to_string(),
    })
    .await;
    match c1.recv_ack().await {
        ServerEvent::Ack { ok, .. } => assert!(ok),
        _ => unreachable!(),
    }
}
