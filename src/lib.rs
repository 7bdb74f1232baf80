//! msmp - Minecraft Server Management Protocol toolkit
//!
//! Typed management calls on top of the `msmp-client` JSON-RPC client, plus
//! the `msmp` command-line tool.

pub mod management;

pub use management::Management;
pub use msmp_client::{
    ConnectionState, MsmpClient, MsmpConfig, MsmpError, PendingPolicy, Response, Result,
};
