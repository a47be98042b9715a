#![forbid(unsafe_code)]

pub mod capture;
pub mod card;
pub mod config;
pub mod driver;
pub mod extract;
pub mod logging;
pub mod server;
pub mod store;
