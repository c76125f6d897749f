//! A Discord community bot built around conditional auto-roles.
//!
//! The decision logic ([`autorole`]), the settings store, permission levels,
//! and the `/autorole` command are always compiled. The gateway, REST
//! client, handlers, and event loop need the `io` feature.

pub mod autorole;
pub mod commands;
pub mod config;
pub mod events;
pub mod permissions;
pub mod store;
pub mod types;

#[cfg(feature = "io")]
pub mod bot;
#[cfg(feature = "io")]
pub mod gateway;
#[cfg(feature = "io")]
pub mod handlers;
#[cfg(feature = "io")]
pub mod http;
