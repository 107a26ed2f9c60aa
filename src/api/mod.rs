pub mod client;
pub mod events;
pub mod models;

use async_trait::async_trait;

use crate::api::models::MessageRecord;
use crate::error::Result;

/// The messaging backend the inbox reads from and sends through.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Full snapshot of every message the backend knows about.
    async fn fetch_messages(&self) -> Result<Vec<MessageRecord>>;

    async fn send_message(&self, phone_number: &str, message: &str) -> Result<()>;
}
