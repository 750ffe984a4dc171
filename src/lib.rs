//! NativeBridge: gamepad-driven dashboard core for a Godot pack runtime
//!
//! - [`controller`] normalises gamepad input into navigation actions
//! - [`engine`] runs the engine and pack lifecycle
//! - [`bridge`] connects the two

pub mod bridge;
pub mod config;
pub mod console;
pub mod controller;
pub mod engine;
pub mod ring_buffer;
