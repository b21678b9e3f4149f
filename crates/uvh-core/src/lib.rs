#![forbid(unsafe_code)]

//! `uvh-core` drives keyboard control of whichever video is active on a page.
//!
//! Design goals:
//! - **Host-driven**: the embedding content script pushes DOM events, messages
//!   and the current monotonic time in; the core never polls or blocks.
//! - **Host-agnostic**: every DOM access goes through the [`dom::Dom`] trait, so
//!   the same state machines run against `web-sys` in the browser and against
//!   [`fake_dom::FakeDom`] in tests.
//! - **One session per frame**: all per-frame registries and pointers live in
//!   [`session::Session`]; there is no ambient global state.
//!
//! Cross-frame coordination runs over an untrusted `postMessage` channel, so
//! every inbound payload is validated by [`protocol::parse_inbound`] before any
//! field is trusted.

pub mod action;
pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod dom;
pub mod error;
pub mod executor;
pub mod geometry;
pub mod interceptor;
pub mod observer;
pub mod predicates;
pub mod protocol;
pub mod registry;
pub mod remote;
pub mod selector;
pub mod session;
pub mod settings;
pub mod shortcut;

#[cfg(any(test, feature = "test-helpers"))]
pub mod fake_dom;

pub use action::{ActionDescriptor, SpeedDirection};
pub use config::{ClosedShadowPolicy, SessionConfig};
pub use dom::{Dom, Listen, MediaCommand, MediaSnapshot, ShadowMode};
pub use error::{ConfigError, MessageError};
pub use geometry::{Rect, Viewport};
pub use session::{Disposition, KeyInput, Session};
pub use settings::Settings;
pub use shortcut::{KeyChord, KeyCode, Modifiers};

/// Log target shared by every `tracing` event emitted from this crate.
pub const LOG_TARGET: &str = "uvh";
