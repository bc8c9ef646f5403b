//! Content index for packrat repositories.
//!
//! This crate provides:
//! - The `ContentReader` trait used by verification and read commands
//! - Concurrent iteration over content records
//! - `ContentManager`, which loads index blobs and buffers new writes until
//!   they are flushed as one pack blob and one index blob

pub mod error;
pub mod format;
pub mod manager;
pub mod reader;

pub use error::{IndexError, IndexResult};
pub use format::IndexBlob;
pub use manager::{CompactStats, ContentManager, FlushStats, UploadCallback};
pub use reader::{ContentInfoStream, ContentReader, ContentReaderExt, IterateOptions};
