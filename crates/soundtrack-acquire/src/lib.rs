//! Network side of the downloader: fetching pages, streaming track files and
//! packaging each album into its output container.

pub mod album;
pub mod batch;
pub mod fetch;
pub mod output;
pub mod progress;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use album::download_album;
pub use batch::download_albums;
pub use fetch::PageFetcher;
pub use output::{ClosedOutput, ContainerSpec, OutputContainer};
pub use progress::{NoProgress, ProgressEvent, ProgressSink};
