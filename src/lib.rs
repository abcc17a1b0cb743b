//! onair: core library for a music player with an AI radio host.
//!
//! Between tracks the player can insert a synthesized DJ announcement (one
//! host or a two-host dialogue), generated while the previous song is still
//! playing, then bring the next song back in with a smooth fade.
//! The CLI in `main.rs` consumes this crate.

pub mod announcer;
pub mod clip;
pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod llm;
pub mod orchestrator;
pub mod playback;
pub mod playlist;
pub mod proxy;
pub mod script;
pub mod session;
pub mod track;
pub mod tts;
