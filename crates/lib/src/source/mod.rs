//! The Git source a sync pass reads from.
//!
//! A `KeptnGitRepository` record names the remote, branch, credentials and
//! base directory; its status remembers the last commit that was fully
//! applied. Checkouts always land in a fresh directory owned by the caller.

mod fetch;
mod types;

pub use fetch::{FetchError, GixFetcher, SourceFetcher};
pub use types::{GitCredentials, GitRepositorySpec, GitRepositoryStatus, SyncResult};
