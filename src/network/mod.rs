//! Communication with the node
//!
//! Submission of finished transactions over HTTP and the live WebSocket
//! event stream.

pub mod events;
pub mod gateway;

pub use events::{Backoff, ConnectionState, EventStream, StreamEvent};
pub use gateway::{HttpGateway, SubmissionGateway, SubmissionReceipt};
