//! Headless engine behind a stream-overlay "emote wall": emotes seen in
//! Twitch chat are resolved against third-party catalogs, throttled, and
//! animated on a fixed-size canvas until they age out.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod events;
pub mod gate;
pub mod physics;
pub mod protocol;
pub mod providers;
pub mod registry;
pub mod stats;
pub mod traffic;
pub mod workers;
