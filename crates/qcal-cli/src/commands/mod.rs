//! CLI command implementations.

pub mod common;
pub mod inspect;
pub mod reset;
pub mod rollback;
pub mod run;
pub mod status;
