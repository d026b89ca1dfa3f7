//! `migrun stop-daemons` – shut down MPS daemons left behind by an interrupted run.

use anyhow::Result;
use migrun_core::daemon::MpsDaemon;
use migrun_core::device::parse_list;
use migrun_core::scheduler::stop_daemons;
use std::path::Path;

pub async fn run_stop_daemons(devices: &str, mps_pipe_dir: &Path) -> Result<()> {
    let devices = parse_list(devices);
    stop_daemons(&devices, &MpsDaemon::new(mps_pipe_dir)).await
}
