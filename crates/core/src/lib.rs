//! Domain types for the jobflow upload-and-process client.
//!
//! Nothing in this crate performs I/O. It defines the job lifecycle,
//! the credentials handed out by the backend, and the validation rules
//! the client applies before it touches the network.

pub mod error;
pub mod export;
pub mod job;
pub mod types;
