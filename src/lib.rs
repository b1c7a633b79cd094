pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
mod http;
pub mod mail;
pub mod notify;
pub mod runner;
pub mod status;
