//! Error taxonomy for the watch service

use thiserror::Error;

/// Errors surfaced to watch service consumers
///
/// Scan races (an entry vanishing between listing and stat) are absorbed as
/// partial results by the scanner and never reach this type. Native
/// stream-setup failures are wrapped into [`Error::Io`].
#[derive(Debug, Error)]
pub enum Error {
    /// Root unreadable or vanished at registration time, or the native
    /// change-notification stream could not be set up
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation attempted on a closed service
    #[error("watch service is closed")]
    Closed,
}
