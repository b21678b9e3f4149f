#![forbid(unsafe_code)]

//! Browser content script for Universal Video Hotkeys.
//!
//! This crate hosts one [`uvh_core::Session`] per frame on top of `web-sys`.
//! `extension/bootstrap.js` loads the generated module from every frame and
//! calls the exported `start` function; from then on DOM events, storage
//! changes and timers are funnelled into the session.
//!
//! Only the `wasm32` target compiles the bindings. The [`bridge`] helpers
//! (event-name tables, key and clock conversion, storage payload parsing) are
//! plain Rust and tested natively.

pub mod bridge;

#[cfg(target_arch = "wasm32")]
mod console;
#[cfg(target_arch = "wasm32")]
mod storage;
#[cfg(target_arch = "wasm32")]
mod wasm;
#[cfg(target_arch = "wasm32")]
mod web_dom;

#[cfg(target_arch = "wasm32")]
pub use wasm::start;
