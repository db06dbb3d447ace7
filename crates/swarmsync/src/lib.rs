//! Orchestration core of a DHT-backed peer-to-peer file sync client.
//!
//! A [`Session`] holds one user's credentials and the shared collaborators:
//! DHT storage, chunk cipher, peer messaging, the async process pool and the
//! chunk download pool. [`Session::processes`] builds the process trees of
//! user actions (upload, download, delete, notify), which run with
//! compensating rollback on failure.
//!
//! ```no_run
//! use swarmsync::{Credentials, Session};
//!
//! # fn main() -> swarmsync::Result<()> {
//! let session = Session::builder(Credentials::generate("alice")).build()?;
//! let upload = session.processes().upload_file("notes.txt", b"hello".to_vec())?;
//! session.run(upload)?;
//! let download = session.processes().download_file("notes.txt", "/tmp/notes.txt")?;
//! session.run(download)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
mod factory;
pub mod logging;
mod meta;
mod session;
pub mod steps;

pub use config::Config;
pub use error::{Error, Result};
pub use factory::ProcessFactory;
pub use logging::init_tracing;
pub use meta::{FileMeta, META_CONTENT_KEY};
pub use session::{Credentials, Session, SessionBuilder};
pub use swarmsync_data as data;
pub use swarmsync_download as download;
pub use swarmsync_fs as fs;
pub use swarmsync_process as process;
