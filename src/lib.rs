//! wa-inbox - a small WhatsApp-style inbox client
//!
//! Polls a messaging gateway for every message it knows about, groups the
//! messages into one conversation per contact, and sends replies back through
//! the gateway.
//!
//! - [`aggregator`] turns a raw snapshot into an ordered conversation list
//! - [`session`] keeps the list, the selection and unconfirmed sends between refreshes
//! - [`inbox`] runs commands from the view against the gateway
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use wa_inbox::aggregator::{aggregate, format_address};
//! use wa_inbox::locale::ENGLISH;
//!
//! assert_eq!(format_address(Some("905551112233"), &ENGLISH), "+90 555 111 2233");
//! let conversations = aggregate(&[], &Utc::now(), &ENGLISH)?;
//! assert!(conversations.is_empty());
//! # Ok::<(), wa_inbox::error::InboxError>(())
//! ```

pub mod aggregator;
pub mod api;
pub mod app;
pub mod error;
pub mod inbox;
pub mod locale;
pub mod scheduler;
pub mod session;
pub mod ui;
pub mod utils;

pub use aggregator::{Conversation, DisplayMessage, aggregate, format_address, format_relative_time};
pub use api::MessageGateway;
pub use api::models::MessageRecord;
pub use error::InboxError;
pub use inbox::{Command, Inbox, InboxHandle};
