// The remote execution backend: runs are delegated to an external job
// service and observed by polling.

pub mod client;
pub mod engine;
pub mod http_client;
mod monitor;

pub use client::RemoteClient;
pub use engine::RemoteEngine;
pub use http_client::HttpRemoteClient;
