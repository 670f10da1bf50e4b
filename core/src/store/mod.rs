/// Persistence repositories backed by sled
pub mod conversations;
pub mod requests;
pub mod users;

pub use conversations::ConversationStore;
pub use requests::RequestStore;
pub use users::UserStore;
