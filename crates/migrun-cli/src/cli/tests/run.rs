//! Tests for the run subcommand.

use super::{parse, parse_cli};
use crate::cli::commands::{build_options, resolve_threads, select_daemon};
use crate::cli::{CliCommand, RunArgs};
use std::path::Path;

const BASE: &[&str] = &[
    "migrun",
    "run",
    "--devices",
    "MIG-a,MIG-b",
    "--query",
    "/q",
    "--target",
    "/t",
    "--tmp-dir",
    "/tmp/run",
    "--output",
    "/out/all.maf",
    "--mps-pipe-dir",
    "/tmp/mps",
];

fn run_args(extra: &[&str]) -> RunArgs {
    let args: Vec<&str> = BASE.iter().chain(extra).copied().collect();
    match parse(&args) {
        CliCommand::Run(a) => a,
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_defaults() {
    let a = run_args(&[]);
    assert_eq!(a.devices, "MIG-a,MIG-b");
    assert!(a.capacity.is_none());
    assert!(a.refresh.is_none());
    assert_eq!(a.format, "maf-");
    assert_eq!(a.worker_cmd, "run_segalign_symlink");
    assert_eq!(a.worker_opts, "");
    assert_eq!(a.segment_size, 0);
    assert_eq!(a.start_part, 0);
    assert_eq!(a.chunk_ext_skip, ".2bit");
    assert!(!a.only_missing && !a.keep_partial && !a.no_resubmit && !a.skip_daemon_control);
    assert_eq!(a.mps_pipe_dir.as_deref(), Some(Path::new("/tmp/mps")));
}

#[test]
fn cli_parse_run_all_flags() {
    let a = run_args(&[
        "--capacity",
        "2,3",
        "--refresh",
        "0.5",
        "--format",
        "maf",
        "--worker-cmd",
        "/opt/run_segalign",
        "--worker-opts",
        "--debug --scoring x.txt",
        "--num-threads",
        "4",
        "--segment-size",
        "-1",
        "--skip-daemon-control",
        "--only-missing",
        "--start-part",
        "7",
        "--keep-partial",
        "--no-resubmit",
        "--log-dir",
        "/logs",
    ]);
    assert_eq!(a.capacity.as_deref(), Some("2,3"));
    assert_eq!(a.refresh, Some(0.5));
    assert_eq!(a.worker_opts, "--debug --scoring x.txt");
    assert_eq!(a.num_threads, Some(4));
    assert_eq!(a.segment_size, -1);
    assert_eq!(a.mps_pipe_dir.as_deref(), Some(Path::new("/tmp/mps")));
    assert!(a.skip_daemon_control && a.only_missing && a.keep_partial && a.no_resubmit);
    assert_eq!(a.start_part, 7);
    assert_eq!(a.log_dir.as_deref(), Some(Path::new("/logs")));
}

#[test]
fn cli_parse_run_requires_devices_and_dirs() {
    use clap::Parser;
    assert!(crate::cli::Cli::try_parse_from(["migrun", "run"]).is_err());
    assert!(crate::cli::Cli::try_parse_from([
        "migrun", "run", "--devices", "0", "--query", "/q", "--target", "/t", "--tmp-dir", "/tmp",
    ])
    .is_err());
}

#[test]
fn cli_parse_run_needs_pipe_dir_unless_daemon_control_skipped() {
    use clap::Parser;
    let without_pipe: Vec<&str> = BASE[..BASE.len() - 2].to_vec();
    assert!(crate::cli::Cli::try_parse_from(without_pipe.clone()).is_err());

    let mut skipped = without_pipe.clone();
    skipped.push("--skip-daemon-control");
    match parse(&skipped) {
        CliCommand::Run(a) => {
            assert!(a.skip_daemon_control);
            assert!(a.mps_pipe_dir.is_none());
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn daemon_control_is_on_unless_skipped() {
    let managed = build_options(&run_args(&[]), false).unwrap();
    assert!(select_daemon(&managed, false).is_ok());
    assert!(select_daemon(&managed, true).is_ok());

    let mut unmanaged = managed;
    unmanaged.mps_pipe_dir = None;
    assert!(select_daemon(&unmanaged, false).is_err());
    assert!(select_daemon(&unmanaged, true).is_ok());
}

#[test]
fn cli_parse_global_flags_after_subcommand() {
    let mut args: Vec<&str> = BASE.to_vec();
    args.extend(["-v", "--config", "/etc/migrun.toml"]);
    let cli = parse_cli(&args);
    assert!(cli.verbose);
    assert_eq!(cli.config.as_deref(), Some(Path::new("/etc/migrun.toml")));
}

#[test]
fn options_from_args() {
    let a = run_args(&["--capacity", "2,3", "--worker-opts", "--debug  --x 1", "--segment-size", "100"]);
    let opts = build_options(&a, true).unwrap();
    assert_eq!(opts.devices, vec!["MIG-a".to_string(), "MIG-b".to_string()]);
    assert_eq!(opts.capacities, vec![2, 3]);
    assert_eq!(opts.worker.opts, vec!["--debug", "--x", "1"]);
    assert_eq!(opts.worker.segment_size, 100);
    assert_eq!(opts.log_dir(), Path::new("/tmp/run"));
    assert!(opts.verbose);
}

#[test]
fn bad_capacity_list_is_rejected() {
    let a = run_args(&["--capacity", "2,x"]);
    assert!(build_options(&a, false).is_err());
}

#[test]
fn thread_count_is_clamped_to_cpus() {
    let cpus = resolve_threads(None);
    assert!(cpus >= 1);
    assert_eq!(resolve_threads(Some(0)), cpus);
    assert_eq!(resolve_threads(Some(cpus + 100)), cpus);
    assert_eq!(resolve_threads(Some(1)), 1);
}
