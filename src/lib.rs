//! A fishing minigame played through Discord slash commands.
//!
//! The game core ([`store`], [`reward`], [`progression`], [`commands`]) is
//! plain synchronous Rust. The `io` feature adds the Discord gateway and REST
//! plumbing that feeds it.

pub mod commands;
pub mod config;
pub mod events;
pub mod progression;
pub mod reward;
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
