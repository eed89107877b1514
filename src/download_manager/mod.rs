//! Download Manager module
//!
//! Turns source URLs into catalogue items backed by local audio files,
//! using yt-dlp for metadata and transcoding. At most one fetch runs at a
//! time across the whole process.

mod coordinator;
mod error;
mod extractor;
mod materializer;
mod metadata;
mod single_flight;

pub use coordinator::{Admission, DownloadCoordinator, DownloadTicket, JobOutcome};
pub use error::DownloadError;
pub use extractor::{ContentFetcher, FetchRequest, MetadataResolver, YtDlp};
pub use materializer::FileMaterializer;
pub use metadata::{first_present, ExtractedInfo, TrackMetadata};
pub use single_flight::{ExecutionGate, ExecutionPermit, NoOpGate, SingleFlightLock};
