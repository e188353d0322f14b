//! Command handlers; each returns a rendered [`crate::CliOutput`].

mod config;
mod daemon;
mod info;
mod lifecycle;
mod status;

pub use config::{run_config_check, run_config_show};
pub use daemon::run_daemon;
pub use info::run_info;
pub use lifecycle::{run_check_update, run_install, run_restart, run_start, run_stop};
pub use status::{run_services, run_status};
