//! Command-line front end for the job client.
//!
//! - [`command`] -- argument parsing.
//! - [`content_type`] -- content type inference from the file name.
//! - [`run`] -- the `translate` and `export` commands.

pub mod command;
pub mod content_type;
pub mod run;
