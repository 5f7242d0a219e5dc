//! Card domain and board membership, owned by the surrounding application.

mod http;
mod memory;

pub use http::HttpBoardDirectory;
pub use memory::MemoryBoardDirectory;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Card fields the estimation engine cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardEntity {
    /// Card identifier.
    pub id: String,
    /// Board the card belongs to.
    pub board_id: String,
    /// List the card currently sits in.
    pub list_id: String,
    /// Current estimate; `None` or a non-positive value means "not estimated".
    #[serde(default)]
    pub story_points: Option<i64>,
}

impl CardEntity {
    /// Whether the card still needs an estimate.
    pub fn is_unestimated(&self) -> bool {
        self.story_points.is_none_or(|points| points <= 0)
    }
}

/// Result alias for board directory calls.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Failures of the board directory collaborator.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No card with this id exists.
    #[error("card `{card_id}` not found")]
    CardNotFound { card_id: String },
    /// The directory could not be reached.
    #[error("board directory request to `{path}` failed")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The directory answered with an unexpected status.
    #[error("board directory returned status {status} for `{path}`")]
    Status {
        path: String,
        status: reqwest::StatusCode,
    },
    /// `BOARDS_API_URL` is not a usable base URL.
    #[error("invalid board directory URL `{url}`")]
    InvalidUrl { url: String },
}

/// Lookup and update access to cards and board membership.
pub trait BoardDirectory: Send + Sync {
    /// Look up a card by id.
    fn find_card(&self, card_id: &str) -> BoxFuture<'static, DirectoryResult<Option<CardEntity>>>;
    /// Persist the agreed estimate on the card.
    fn set_story_points(
        &self,
        card_id: &str,
        story_points: u32,
    ) -> BoxFuture<'static, DirectoryResult<()>>;
    /// Whether `user_id` may take part in sessions of `board_id`.
    fn is_board_member(
        &self,
        board_id: &str,
        user_id: &str,
    ) -> BoxFuture<'static, DirectoryResult<bool>>;
}
