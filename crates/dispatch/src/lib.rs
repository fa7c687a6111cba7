//! # Tutor Dispatch
//!
//! Queue store and adaptive batch dispatcher.
//!
//! ## Pipeline
//!
//! ```text
//! enqueue
//!     │
//!     └──> MessageQueue (insertion order, single owner)
//!            │  trigger: tier delay from queue size, sampled at arm time
//!            ▼
//!          Dispatcher (one-shot deadline, single-flight drain)
//!            │  one call per message, in order
//!            ▼
//!          CompletionClient ──failure──> canned fallback, batch continues
//!            │
//!            └──> Notifier summary + DrainReport broadcast
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tutor_dispatch::{
//!     ChatCompletionClient, ChatCompletionConfig, Dispatcher, DispatcherConfig, LogNotifier,
//! };
//! use tutor_protocol::PendingMessage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tutor_dispatch::DispatchError> {
//!     let client = Arc::new(ChatCompletionClient::new(ChatCompletionConfig::default()));
//!     let dispatcher = Dispatcher::start(client, Arc::new(LogNotifier), DispatcherConfig::default());
//!
//!     let ack = dispatcher
//!         .enqueue(PendingMessage {
//!             sender_name: "Amina Khan".to_string(),
//!             body_text: "I have a question about assignment 3".to_string(),
//!             captured_at: 0,
//!             origin_url: "https://lms.example/forum/1".to_string(),
//!         })
//!         .await?;
//!     println!("queued ({} pending)", ack.queue_size);
//!     Ok(())
//! }
//! ```

mod completion;
mod dispatcher;
mod error;
mod notify;
mod queue;

pub use completion::{
    fallback_reply, first_name, ChatCompletionClient, ChatCompletionConfig, CompletionClient,
    CompletionError, CompletionRequest,
};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{DispatchError, Result};
pub use notify::{LogNotifier, Notifier};
pub use queue::MessageQueue;
