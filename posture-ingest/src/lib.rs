pub mod classify;
pub mod error;
pub mod format;
pub mod nessus;
pub mod nmap;
pub mod openvas;
pub mod pipeline;
pub mod writer;

pub use classify::{classify, Classification};
pub use error::IngestError;
pub use format::{detect_format, FileFormat};
pub use nessus::{DecodedVulns, ResolvedVuln};
pub use pipeline::{FileReport, FileStatus, IngestFile, IngestPipeline, PipelineConfig};
pub use tokio_util::sync::CancellationToken;
pub use writer::DraftOrigin;
