//! Chunked parallel downloads.
//!
//! A [`DownloadTask`] describes one file as an ordered list of
//! [`MetaChunk`](swarmsync_data::MetaChunk)s. The [`DownloadManager`] fetches
//! every missing chunk on a bounded pool: fetch the encrypted payload,
//! decrypt it, stage it as a part file and report it to the task. When the
//! last chunk arrives the task concatenates the parts into the destination in
//! index order, whatever order they arrived in. Any chunk failure aborts the
//! whole task.

mod error;
mod manager;
mod runnable;
mod task;

pub use error::{DownloadError, Result};
pub use manager::{DownloadManager, DownloadOptions};
pub use task::{DownloadListener, DownloadTask};
