//! Asynchronous upload-and-process job client.
//!
//! Obtains a presigned upload credential from the backend, PUTs the file
//! straight into the blob store, polls the backend's status resource until
//! the job finishes, and hands out a presigned download URL for the result.
//!
//! - [`api::BackendApi`] -- reqwest wrapper for the backend HTTP surface.
//! - [`credentials::CredentialClient`], [`poller::StatusClient`] and
//!   [`transfer::BlobTransferClient`] -- the seams the flow is built on.
//! - [`poller::JobStatusPoller`] -- the fixed-interval status poll loop.
//! - [`orchestrator::JobOrchestrator`] -- the end-to-end flow with its busy
//!   guard and the observable [`jobflow_core::job::Job`] state.

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod transfer;

pub use config::ClientConfig;
pub use error::JobError;
pub use orchestrator::{FileUpload, JobOrchestrator};
