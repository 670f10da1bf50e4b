/// Hub: owns the stores and logic components, accepts connections
use crate::auth::{IdentityProvider, TokenRegistry};
use crate::config::Config;
use crate::dispatch::EventDispatcher;
use crate::error::{ChatError, Result};
use crate::friends::FriendRequestEngine;
use crate::media;
use crate::presence::PresenceRegistry;
use crate::protocol::{ClientEvent, ReplyData, ServerEvent};
use crate::session::Session;
use crate::store::{ConversationStore, RequestStore, UserStore};
use crate::types::{Conversation, ConversationView};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{error, info};

pub struct Hub {
    config: Config,
    users: UserStore,
    conversations: ConversationStore,
    presence: PresenceRegistry,
    dispatcher: EventDispatcher,
    friends: FriendRequestEngine,
    tokens: TokenRegistry,
    identity: Arc<dyn IdentityProvider>,

    /// Shutdown signal
    shutdown: Arc<RwLock<bool>>,
}

impl Hub {
    /// Open the stores and wire the components together.
    pub fn new(config: Config) -> Result<Self> {
        let data_dir = config.resolved_data_dir();
        std::fs::create_dir_all(&data_dir).map_err(ChatError::Io)?;

        let users = UserStore::new(&data_dir)?;
        let requests = RequestStore::new(&data_dir)?;
        let conversations = ConversationStore::new(&data_dir)?;
        let tokens = TokenRegistry::new(&data_dir)?;

        let presence = PresenceRegistry::new(users.clone());
        let dispatcher = EventDispatcher::new(presence.clone());
        let friends = FriendRequestEngine::new(users.clone(), requests, dispatcher.clone());
        let identity: Arc<dyn IdentityProvider> = Arc::new(tokens.clone());

        Ok(Self {
            config,
            users,
            conversations,
            presence,
            dispatcher,
            friends,
            tokens,
            identity,
            shutdown: Arc::new(RwLock::new(false)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn friends(&self) -> &FriendRequestEngine {
        &self.friends
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    /// Accept connections until shutdown (Ctrl+C / SIGTERM).
    pub async fn start(&self) -> Result<()> {
        info!("Starting Chatlink hub on {}", self.config.listen_addr);

        let listener_handle = {
            let hub = self.clone();
            tokio::spawn(async move { hub.run_listener().await })
        };

        self.wait_for_shutdown().await;
        *self.shutdown.write().await = true;
        info!("Shutdown signal received, stopping hub...");

        let _ = listener_handle.await;
        info!("Hub stopped");
        Ok(())
    }

    /// Accept loop; one Session task per connection.
    pub async fn run_listener(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .map_err(ChatError::Io)?;
        info!("Listening for client connections on {}", self.config.listen_addr);

        loop {
            if *self.shutdown.read().await {
                break;
            }

            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let session = Session::new(self.clone(), addr);
                            tokio::spawn(async move {
                                if let Err(e) = session.run(stream).await {
                                    error!("Connection from {} ended with error: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
                _ = sleep(Duration::from_millis(100)) => {
                    // Check shutdown periodically
                }
            }
        }

        Ok(())
    }

    /// Wait for shutdown signal (Ctrl+C)
    async fn wait_for_shutdown(&self) {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
            info!("Ctrl+C received");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
            info!("SIGTERM received");
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    /// Dispatch one inbound event to the owning component and return
    /// the typed reply the session turns into an ack. `hello` and
    /// `end` never reach this point; the session consumes them.
    pub async fn handle_event(&self, session_user: &str, event: ClientEvent) -> Result<ReplyData> {
        match event {
            ClientEvent::FriendRequest { from, to } => {
                let request = self.friends.send_request(&from, &to).await?;
                Ok(ReplyData::Requested { request })
            }

            ClientEvent::AcceptRequest { request_id } => {
                let request = self.friends.accept_request(&request_id).await?;
                Ok(ReplyData::Accepted {
                    request_id: request.request_id,
                })
            }

            ClientEvent::GetDirectConversation { user_id } => {
                let mut views = Vec::new();
                for conversation in self.conversations.for_user(&user_id)? {
                    views.push(self.view(&conversation)?);
                }
                Ok(ReplyData::Conversations {
                    conversations: views,
                })
            }

            ClientEvent::StartConversation { to, from } => {
                let conversation = self.conversations.find_or_create(&from, &to)?;
                let view = self.view(&conversation)?;
                self.dispatcher
                    .emit(
                        &from,
                        ServerEvent::StartChat {
                            conversation: view.clone(),
                        },
                    )
                    .await;
                Ok(ReplyData::Conversation { conversation: view })
            }

            ClientEvent::GetMessages { conversation_id } => {
                let messages = self.conversations.messages(&conversation_id)?;
                Ok(ReplyData::Messages { messages })
            }

            ClientEvent::TextMessage {
                conversation_id,
                message,
                to,
                from,
                kind,
            } => {
                let stored = self.conversations.append_message(
                    &conversation_id,
                    &from,
                    &to,
                    kind,
                    Some(message),
                    None,
                )?;
                for target in [&to, &from] {
                    self.dispatcher
                        .emit(
                            target,
                            ServerEvent::NewMessage {
                                conversation_id: conversation_id.clone(),
                                message: stored.clone(),
                            },
                        )
                        .await;
                }
                Ok(ReplyData::Message { message: stored })
            }

            ClientEvent::FileMessage { file, .. } => {
                // Interface stub: the upload to the blob store and the
                // resulting Media/Document append happen in the
                // external collaborator. Only the key is produced here.
                let storage_key = media::storage_key(&file.name);
                Ok(ReplyData::FileKey { storage_key })
            }

            ClientEvent::Hello { .. } => Err(ChatError::Protocol(format!(
                "Unexpected hello from {}",
                session_user
            ))),

            ClientEvent::End { .. } => Err(ChatError::Protocol(format!(
                "Unexpected end from {}",
                session_user
            ))),
        }
    }

    /// Resolve participant metadata and last-message preview for display.
    pub fn view(&self, conversation: &Conversation) -> Result<ConversationView> {
        let mut participants = Vec::with_capacity(2);
        for user_id in &conversation.participants {
            participants.push(self.users.summary(user_id)?);
        }
        let last = self.conversations.last_message(&conversation.conversation_id)?;
        Ok(ConversationView {
            conversation_id: conversation.conversation_id.clone(),
            participants,
            last_preview: last.as_ref().and_then(|m| m.text.clone()),
            last_timestamp: last.map(|m| m.timestamp),
        })
    }
}

impl Clone for Hub {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            users: self.users.clone(),
            conversations: self.conversations.clone(),
            presence: self.presence.clone(),
            dispatcher: self.dispatcher.clone(),
            friends: self.friends.clone(),
            tokens: self.tokens.clone(),
            identity: self.identity.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}
