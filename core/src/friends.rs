/// Friend request engine: pending requests and the symmetric friendship relation
use crate::dispatch::EventDispatcher;
use crate::error::{ChatError, Result};
use crate::protocol::ServerEvent;
use crate::store::{RequestStore, UserStore};
use crate::types::FriendRequest;
use tracing::info;

#[derive(Clone)]
pub struct FriendRequestEngine {
    users: UserStore,
    requests: RequestStore,
    dispatcher: EventDispatcher,
}

impl FriendRequestEngine {
    pub fn new(users: UserStore, requests: RequestStore, dispatcher: EventDispatcher) -> Self {
        Self {
            users,
            requests,
            dispatcher,
        }
    }

    /// Create a pending request from `from` to `to` and notify both
    /// parties if they are online (fire-and-forget; an offline party
    /// is not an error).
    pub async fn send_request(&self, from: &str, to: &str) -> Result<FriendRequest> {
        if from == to {
            return Err(ChatError::InvalidTarget(format!(
                "{} cannot send a friend request to itself",
                from
            )));
        }
        self.users.require(from)?;
        self.users.require(to)?;

        // Created unconditionally: a second pending request for the
        // same pair is possible (see DESIGN.md).
        let request = self.requests.create(from, to)?;
        info!("Friend request {} from {} to {}", request.request_id, from, to);

        self.dispatcher
            .emit(
                to,
                ServerEvent::NewFriendRequest {
                    request: request.clone(),
                },
            )
            .await;
        self.dispatcher
            .emit(
                from,
                ServerEvent::RequestSent {
                    request_id: request.request_id.clone(),
                },
            )
            .await;

        Ok(request)
    }

    /// Resolve a pending request: add each participant to the other's
    /// friend set, then delete the request. The delete runs only after
    /// both mutations succeed so a partial failure never leaves a
    /// consumed request with a half-applied friendship.
    pub async fn accept_request(&self, request_id: &str) -> Result<FriendRequest> {
        let request = self
            .requests
            .get(request_id)?
            .ok_or_else(|| ChatError::NotFound(format!("friend request {}", request_id)))?;

        self.users.add_friend(&request.sender, &request.receipt)?;
        self.users.add_friend(&request.receipt, &request.sender)?;
        self.requests.delete(request_id)?;
        info!(
            "Friend request {} accepted: {} <-> {}",
            request_id, request.sender, request.receipt
        );

        let sender_summary = self.users.summary(&request.sender)?;
        let receipt_summary = self.users.summary(&request.receipt)?;
        self.dispatcher
            .emit(
                &request.sender,
                ServerEvent::FriendRequestAccepted {
                    request_id: request_id.to_string(),
                    friend: receipt_summary,
                },
            )
            .await;
        self.dispatcher
            .emit(
                &request.receipt,
                ServerEvent::FriendRequestAccepted {
                    request_id: request_id.to_string(),
                    friend: sender_summary,
                },
            )
            .await;

        Ok(request)
    }

    /// Pending requests addressed to `user_id` (consumed by the
    /// external HTTP layer's friend-request listing).
    pub fn pending_for(&self, user_id: &str) -> Result<Vec<FriendRequest>> {
        self.requests.pending_for(user_id)
    }
}
