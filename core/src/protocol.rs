/// Wire protocol: named events over length-prefixed JSON frames
use crate::error::{ChatError, Result};
use crate::types::{ChatMessage, ConversationView, FriendRequest, MessageKind, UserSummary};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// File payload reference carried by `fileMessage` (upload itself is
/// handled by the external blob store collaborator).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilePayload {
    pub name: String,
}

/// Events a client sends to the hub
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    /// First frame on every connection: a previously-issued credential.
    /// The hub never trusts a client-supplied raw identity.
    #[serde(rename_all = "camelCase")]
    Hello { token: String },

    #[serde(rename_all = "camelCase")]
    FriendRequest { from: String, to: String },

    #[serde(rename_all = "camelCase")]
    AcceptRequest { request_id: String },

    #[serde(rename_all = "camelCase")]
    GetDirectConversation { user_id: String },

    #[serde(rename_all = "camelCase")]
    StartConversation { to: String, from: String },

    #[serde(rename_all = "camelCase")]
    GetMessages { conversation_id: String },

    #[serde(rename_all = "camelCase")]
    TextMessage {
        conversation_id: String,
        message: String,
        to: String,
        from: String,
        #[serde(rename = "type")]
        kind: MessageKind,
    },

    #[serde(rename_all = "camelCase")]
    FileMessage {
        file: FilePayload,
        conversation_id: String,
        to: String,
        from: String,
    },

    End {
        #[serde(rename = "_id")]
        id: String,
    },
}

impl ClientEvent {
    /// Get event name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientEvent::Hello { .. } => "hello",
            ClientEvent::FriendRequest { .. } => "friendRequest",
            ClientEvent::AcceptRequest { .. } => "acceptRequest",
            ClientEvent::GetDirectConversation { .. } => "getDirectConversation",
            ClientEvent::StartConversation { .. } => "startConversation",
            ClientEvent::GetMessages { .. } => "getMessages",
            ClientEvent::TextMessage { .. } => "textMessage",
            ClientEvent::FileMessage { .. } => "fileMessage",
            ClientEvent::End { .. } => "end",
        }
    }
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientEvent({})", self.event_name())
    }
}

/// Typed success payload of an inbound event handler. Carried inside
/// the ack so the engines stay free of any transport callback shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum ReplyData {
    #[serde(rename_all = "camelCase")]
    Requested { request: FriendRequest },
    #[serde(rename_all = "camelCase")]
    Accepted { request_id: String },
    #[serde(rename_all = "camelCase")]
    Conversations { conversations: Vec<ConversationView> },
    #[serde(rename_all = "camelCase")]
    Conversation { conversation: ConversationView },
    #[serde(rename_all = "camelCase")]
    Messages { messages: Vec<ChatMessage> },
    #[serde(rename_all = "camelCase")]
    Message { message: ChatMessage },
    #[serde(rename_all = "camelCase")]
    FileKey { storage_key: String },
    None,
}

/// Events the hub pushes to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Handshake reply with the verified identity
    #[serde(rename_all = "camelCase")]
    Hello { user_id: String },

    #[serde(rename_all = "camelCase")]
    NewFriendRequest { request: FriendRequest },

    #[serde(rename_all = "camelCase")]
    RequestSent { request_id: String },

    #[serde(rename_all = "camelCase")]
    FriendRequestAccepted {
        request_id: String,
        friend: UserSummary,
    },

    #[serde(rename_all = "camelCase")]
    StartChat { conversation: ConversationView },

    #[serde(rename_all = "camelCase")]
    NewMessage {
        conversation_id: String,
        message: ChatMessage,
    },

    /// Direct acknowledgement of an inbound event
    #[serde(rename_all = "camelCase")]
    Ack {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<ReplyData>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },
}

impl ServerEvent {
    pub fn ack_ok(data: ReplyData) -> Self {
        ServerEvent::Ack {
            ok: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }

    pub fn ack_err(err: &ChatError) -> Self {
        ServerEvent::Ack {
            ok: false,
            data: None,
            error: Some(err.to_string()),
            kind: Some(err.kind().to_string()),
        }
    }

    /// Get event name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::Hello { .. } => "hello",
            ServerEvent::NewFriendRequest { .. } => "newFriendRequest",
            ServerEvent::RequestSent { .. } => "requestSent",
            ServerEvent::FriendRequestAccepted { .. } => "friendRequestAccepted",
            ServerEvent::StartChat { .. } => "startChat",
            ServerEvent::NewMessage { .. } => "newMessage",
            ServerEvent::Ack { .. } => "ack",
        }
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerEvent({})", self.event_name())
    }
}

/// Protocol frame with length prefix
#[derive(Debug)]
pub struct Frame {
    pub length: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame from any serializable event
    pub fn encode<T: Serialize>(event: &T) -> Result<Self> {
        let payload = serde_json::to_vec(event)?;
        Ok(Self {
            length: payload.len() as u32,
            payload,
        })
    }

    /// Serialize frame to bytes (length prefix + payload)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.payload.len());
        buf.extend_from_slice(&self.length.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Read one frame payload from the stream. Returns `Ok(None)` on a
/// clean EOF at a frame boundary (transport-level disconnect).
pub async fn read_frame<R>(reader: &mut R, max_frame_bytes: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ChatError::Io(e)),
    }

    let length = u32::from_be_bytes(len_buf) as usize;
    if length > max_frame_bytes {
        return Err(ChatError::Protocol(format!(
            "Frame of {} bytes exceeds limit of {}",
            length, max_frame_bytes
        )));
    }

    let mut payload = vec![0u8; length];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(ChatError::Io)?;
    Ok(Some(payload))
}

/// Write one event as a frame to the stream.
pub async fn write_event<W, T>(writer: &mut W, event: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = Frame::encode(event)?;
    writer
        .write_all(&frame.to_bytes())
        .await
        .map_err(ChatError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_round_trip() {
        let event = ClientEvent::TextMessage {
            conversation_id: "dm:u1:u2".to_string(),
            message: "hi".to_string(),
            to: "u2".to_string(),
            from: "u1".to_string(),
            kind: MessageKind::Text,
        };
        let bytes = serde_json::to_vec(&event).unwrap();
        let parsed: ClientEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn test_event_names_match_wire_tags() {
        let event = ClientEvent::FriendRequest {
            from: "u1".to_string(),
            to: "u2".to_string(),
        };
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "friendRequest");
        assert_eq!(event.event_name(), "friendRequest");

        let end = ClientEvent::End {
            id: "u1".to_string(),
        };
        let value: serde_json::Value = serde_json::to_value(&end).unwrap();
        assert_eq!(value["event"], "end");
        assert_eq!(value["_id"], "u1");
    }

    #[test]
    fn test_text_message_uses_type_field() {
        let raw = serde_json::json!({
            "event": "textMessage",
            "conversationId": "dm:a:b",
            "message": "hello",
            "to": "b",
            "from": "a",
            "type": "Text",
        });
        let parsed: ClientEvent = serde_json::from_value(raw).unwrap();
        match parsed {
            ClientEvent::TextMessage { kind, .. } => assert_eq!(kind, MessageKind::Text),
            other => panic!("unexpected event: {}", other),
        }
    }

    #[test]
    fn test_frame_serialization() {
        let event = ServerEvent::RequestSent {
            request_id: "r1".to_string(),
        };
        let frame = Frame::encode(&event).unwrap();
        let bytes = frame.to_bytes();
        assert_eq!(&bytes[..4], &frame.length.to_be_bytes());
        let parsed: ServerEvent = serde_json::from_slice(&bytes[4..]).unwrap();
        assert_eq!(event, parsed);
    }
}
