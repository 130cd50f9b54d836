//! Remote gateway to the Metabase API.
//!
//! The sync engine only needs three calls (list, get, update), expressed by
//! [`RemoteGateway`]. [`MetabaseClient`] implements them over HTTP; tests use
//! an in-memory implementation.
//!
//! Authentication happens before the engine runs: a [`Session`] handle is
//! handed to the client at construction time.

mod metabase;

pub use metabase::{Credentials, MetabaseClient, Session, login};

use crate::model::{Card, CardId};

/// Errors returned by a remote gateway.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// Host unreachable, timeout, TLS failure.
    #[error("Connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    /// The session was rejected and could not be renewed.
    #[error("Session rejected by {url}")]
    Unauthenticated { url: String },

    /// The remote answered with an error status for this request.
    #[error("Remote returned {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The response body was not what the API promises.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Connection-level failures stop the remaining items of a batch.
    #[must_use]
    pub const fn is_connection_level(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Unauthenticated { .. })
    }
}

/// Result type for gateway calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// The remote operations the sync engine consumes.
pub trait RemoteGateway: Send + Sync {
    /// List every card visible to the session, in remote order.
    fn list_cards(&self) -> impl std::future::Future<Output = RemoteResult<Vec<Card>>> + Send;

    /// Fetch one card by id.
    fn get_card(&self, id: CardId) -> impl std::future::Future<Output = RemoteResult<Card>> + Send;

    /// Replace a card with the given document.
    fn update_card(
        &self,
        id: CardId,
        card: &Card,
    ) -> impl std::future::Future<Output = RemoteResult<()>> + Send;
}
