//! Concrete process steps of the sync client.

mod delete;
mod download;
mod notify;
mod store;
mod upload;

pub use delete::ResolveDeleteStep;
pub use download::{DownloadFileStep, ResolveDownloadStep};
pub use notify::NotifyPeersStep;
pub use store::{ChangeProtectionStep, GetStep, PutStep, RemoveStep};
pub use upload::PutChunksStep;
