//! Tests for `jobflow` argument parsing.

use std::path::PathBuf;

use assert_matches::assert_matches;
use jobflow_cli::command::{Command, UsageError, DEFAULT_LABELS, DEFAULT_WANTED_ISSUES};

fn parse(args: &[&str]) -> Result<Command, UsageError> {
    Command::parse(args.iter().map(|a| a.to_string()))
}

// ---------------------------------------------------------------------------
// Test: translate
// ---------------------------------------------------------------------------

#[test]
fn translate_takes_a_file() {
    assert_matches!(
        parse(&["translate", "data/a.csv"]),
        Ok(Command::Translate { file }) if file == PathBuf::from("data/a.csv")
    );
}

#[test]
fn translate_without_file_is_rejected() {
    assert_eq!(
        parse(&["translate"]).unwrap_err(),
        UsageError::MissingArgument("file")
    );
}

// ---------------------------------------------------------------------------
// Test: export
// ---------------------------------------------------------------------------

#[test]
fn export_with_all_arguments() {
    let Ok(Command::Export(request)) = parse(&["export", "vercel", "next.js", "bug,ui", "200"]) else {
        panic!("expected an export command");
    };
    assert_eq!(request.owner, "vercel");
    assert_eq!(request.repo, "next.js");
    assert_eq!(request.labels, "bug,ui");
    assert_eq!(request.wanted_n, 200);
}

#[test]
fn export_defaults_labels_and_count() {
    let Ok(Command::Export(request)) = parse(&["export", "vercel", "next.js"]) else {
        panic!("expected an export command");
    };
    assert_eq!(request.labels, DEFAULT_LABELS);
    assert_eq!(request.wanted_n, DEFAULT_WANTED_ISSUES);
}

#[test]
fn export_with_non_numeric_count_is_rejected() {
    assert_eq!(
        parse(&["export", "vercel", "next.js", "bug", "lots"]).unwrap_err(),
        UsageError::InvalidWantedN("lots".into())
    );
}

#[test]
fn export_without_repo_is_rejected() {
    assert_eq!(
        parse(&["export", "vercel"]).unwrap_err(),
        UsageError::MissingArgument("repo")
    );
}

// ---------------------------------------------------------------------------
// Test: malformed invocations
// ---------------------------------------------------------------------------

#[test]
fn missing_and_unknown_commands_are_rejected() {
    assert_eq!(parse(&[]).unwrap_err(), UsageError::MissingCommand);
    assert_eq!(
        parse(&["upload", "a.csv"]).unwrap_err(),
        UsageError::UnknownCommand("upload".into())
    );
}

#[test]
fn trailing_arguments_are_rejected() {
    assert_eq!(
        parse(&["translate", "a.csv", "b.csv"]).unwrap_err(),
        UsageError::UnexpectedArgument("b.csv".into())
    );
}
