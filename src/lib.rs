//! Braid mock server
//!
//! Serves `.braid` files as versioned JSON resources over HTTP. Clients
//! that send `Subscribe: true` keep the connection open and receive a
//! frame per change: the full body on first contact, then JSON patches
//! rooted at whatever version that client last received.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod patch;
pub mod pipeline;
pub mod protocol;
pub mod proxy;
pub mod resource;
pub mod routes;
pub mod state;
pub mod subscription;
pub mod version;
