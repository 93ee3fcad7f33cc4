//! Command handlers for the evedump CLI
//!
//! Each subcommand has its own module with a `handle` function.

pub mod decode;
pub mod extract;
pub mod labels;
pub mod run;
pub mod sniff;
