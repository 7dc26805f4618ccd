//! Parsing of `jobflow` command-line arguments.

use std::path::PathBuf;

use jobflow_core::export::IssuesExportRequest;

pub const USAGE: &str = "\
Usage:
  jobflow translate <file>
  jobflow export <owner> <repo> [labels] [wanted_n]";

/// Label filter used when `export` is given none.
pub const DEFAULT_LABELS: &str = "bug";

/// Issue count used when `export` is given none.
pub const DEFAULT_WANTED_ISSUES: u32 = 50;

#[derive(Debug, Clone)]
pub enum Command {
    /// Upload a file, wait for processing, print the download URL.
    Translate { file: PathBuf },
    /// Save an issues CSV export in the current directory.
    Export(IssuesExportRequest),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("missing command")]
    MissingCommand,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("missing argument <{0}>")]
    MissingArgument(&'static str),

    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),

    #[error("wanted_n must be a positive integer, got '{0}'")]
    InvalidWantedN(String),
}

impl Command {
    /// Parse the arguments that follow the program name.
    pub fn parse<I>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let command = match args.next().ok_or(UsageError::MissingCommand)?.as_str() {
            "translate" => {
                let file = args.next().ok_or(UsageError::MissingArgument("file"))?;
                Command::Translate {
                    file: PathBuf::from(file),
                }
            }
            "export" => {
                let owner = args.next().ok_or(UsageError::MissingArgument("owner"))?;
                let repo = args.next().ok_or(UsageError::MissingArgument("repo"))?;
                let labels = args.next().unwrap_or_else(|| DEFAULT_LABELS.to_string());
                let wanted_n = match args.next() {
                    None => DEFAULT_WANTED_ISSUES,
                    Some(raw) => raw
                        .parse()
                        .map_err(|_| UsageError::InvalidWantedN(raw.clone()))?,
                };
                Command::Export(IssuesExportRequest {
                    owner,
                    repo,
                    labels,
                    wanted_n,
                })
            }
            other => return Err(UsageError::UnknownCommand(other.to_string())),
        };

        match args.next() {
            Some(extra) => Err(UsageError::UnexpectedArgument(extra)),
            None => Ok(command),
        }
    }
}
