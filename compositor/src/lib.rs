//! `compman-compositor`: the event-driven compositing core — window
//! registry, damage scheduler, rendering backend, plugin runtime, and the
//! `calloop`-based main loop tying them together. The `compman` binary
//! (`src/main.rs`) is a thin wrapper around [`main_loop::run`].

pub mod atoms;
pub mod context;
pub mod damage;
pub mod dispatcher;
pub mod error;
pub mod geometry;
pub mod keyboard;
pub mod main_loop;
pub mod painter;
pub mod plugin;
pub mod registry;
pub mod render;
pub mod window;
