pub mod cli;
pub mod domains;
pub mod infrastructure;
pub mod workspace;
