//! Tests for split and stop-daemons.

use super::parse;
use crate::cli::CliCommand;
use std::path::Path;

#[test]
fn cli_parse_split_defaults() {
    match parse(&["migrun", "split", "--input", "hg38.fa", "--out", "chunks"]) {
        CliCommand::Split {
            input,
            out,
            max_chunks,
            goal_bp,
            to_2bit,
        } => {
            assert_eq!(input, Path::new("hg38.fa"));
            assert_eq!(out, Path::new("chunks"));
            assert_eq!(max_chunks, 20);
            assert_eq!(goal_bp, 0);
            assert!(!to_2bit);
        }
        _ => panic!("expected Split"),
    }
}

#[test]
fn cli_parse_split_goal() {
    match parse(&[
        "migrun",
        "split",
        "--input",
        "hg38.fa",
        "--out",
        "chunks",
        "--goal-bp",
        "200000000",
        "--max-chunks",
        "30",
        "--to-2bit",
    ]) {
        CliCommand::Split {
            max_chunks,
            goal_bp,
            to_2bit,
            ..
        } => {
            assert_eq!(max_chunks, 30);
            assert_eq!(goal_bp, 200_000_000);
            assert!(to_2bit);
        }
        _ => panic!("expected Split"),
    }
}

#[test]
fn cli_parse_stop_daemons() {
    match parse(&[
        "migrun",
        "stop-daemons",
        "--devices",
        "MIG-a,MIG-b",
        "--mps-pipe-dir",
        "/tmp/mps",
    ]) {
        CliCommand::StopDaemons {
            devices,
            mps_pipe_dir,
        } => {
            assert_eq!(devices, "MIG-a,MIG-b");
            assert_eq!(mps_pipe_dir, Path::new("/tmp/mps"));
        }
        _ => panic!("expected StopDaemons"),
    }
}

#[test]
fn cli_parse_unknown_subcommand_fails() {
    use clap::Parser;
    assert!(crate::cli::Cli::try_parse_from(["migrun", "add", "x"]).is_err());
}
