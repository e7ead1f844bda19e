//! Bulwark — client/server synchronization core for a real-time strategy game
//!
//! An authoritative ECS world simulation runs on the server; connected
//! clients mirror it through a semicolon-delimited JSON protocol over TCP.

pub mod client;
pub mod config;
pub mod ecs;
pub mod game;
pub mod net;
pub mod util;
