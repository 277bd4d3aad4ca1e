use async_trait::async_trait;

use crate::error::CounselResult;

/// Session used when a client does not name one.
pub const DEFAULT_SESSION: &str = "default";

/// Longest session id a client may send, in bytes.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Answers a user query within a conversation session.
#[async_trait]
pub trait AnsweringService: Send + Sync {
    async fn answer(&self, session_id: &str, query: &str) -> CounselResult<String>;
}
