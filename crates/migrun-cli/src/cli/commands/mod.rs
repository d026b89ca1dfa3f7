//! CLI command handlers, one file per subcommand.

mod run;
mod split;
mod stop_daemons;

pub use run::run_align;
pub(crate) use run::{build_options, resolve_threads, select_daemon};
pub use split::run_split;
pub use stop_daemons::run_stop_daemons;
