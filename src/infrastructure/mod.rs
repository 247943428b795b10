pub mod config;
pub mod logging;
pub mod process;
pub mod shell_invocation;
