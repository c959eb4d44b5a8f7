//! Report generation pipeline (`spec.md` §4.5/§4.6): an async builder that
//! renders a comment subtree to XML, an atomic-write blob store, and the
//! download orchestrator that ties cache lookup, revalidation, and the
//! single-flight build together.

mod blob_store;
mod builder;
mod orchestrator;
#[cfg(test)]
mod tests;
mod xml;

pub use blob_store::{BlobStore, BlobStoreError, BlobStoreResult};
pub use builder::ReportBuilder;
pub use orchestrator::{
    DownloadError, DownloadOrchestrator, DownloadOutcome, DownloadRequest, DownloadResult,
};
pub use xml::{render_report, ReportRequest};
