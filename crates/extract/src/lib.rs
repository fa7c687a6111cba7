//! # Tutor Extract
//!
//! Message detection over abstract page snapshots.
//!
//! ## Pipeline
//!
//! ```text
//! PageDocument
//!     │
//!     ├──> Selector match (configurable list, document order)
//!     │      └─> candidate elements
//!     │
//!     ├──> Filters (min length, instructor keywords)
//!     │      └─> student messages
//!     │
//!     └──> Sender search (bounded ancestor walk)
//!            └─> ExtractedMessage, element marked as consumed
//! ```
//!
//! Scanning is idempotent: accepted elements are recorded in an injectable
//! [`ExtractionMark`] and skipped on every later pass over the same
//! document. The [`ScanScheduler`] decides *when* to scan: once after an
//! initial delay, on a fixed interval, and debounced after content-change
//! events.

mod error;
mod node;
mod scanner;
mod schedule;
mod selector;
mod snapshot;

pub use error::{ExtractError, Result};
pub use node::{select_descendants, ExtractionMark, PageDocument, PageNode, SeenSet};
pub use scanner::{ExtractedMessage, MessageScanner, ScanConfig};
pub use schedule::{ScanReason, ScanScheduler, ScanTriggerConfig};
pub use selector::Selector;
pub use snapshot::{SnapshotDocument, SnapshotHandle, SnapshotNode};
