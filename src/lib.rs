//! Compile abstract deployment requests into Kubernetes containers, then
//! deploy them and track their state.

pub mod command;
pub mod common;
pub mod config;
pub mod container;
pub mod deployer;
pub mod entrypoint;
pub mod env;
pub mod error;
pub mod kubestuff;
pub mod ports;
pub mod properties;
pub mod request;
pub mod status;
pub mod volumes;
