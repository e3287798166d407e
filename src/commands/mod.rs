//! Command implementations, one module per subcommand

pub mod apply;
pub mod node;
pub mod plan;
pub mod report;
