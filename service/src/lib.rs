#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

pub mod config;
pub mod context;
pub mod db;
pub mod http;
pub mod policy;
pub mod routes;
pub mod session;
pub mod startup;
pub mod templates;
pub mod transport;
