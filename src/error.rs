use thiserror::Error;

#[derive(Debug, Error)]
pub enum InboxError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered but refused the message.
    #[error("gateway rejected message: {0}")]
    Gateway(String),

    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error("message body is empty")]
    EmptyMessage,

    #[error("no conversation is selected")]
    NoActiveConversation,

    #[error("unknown conversation: {0}")]
    UnknownConversation(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, InboxError>;
