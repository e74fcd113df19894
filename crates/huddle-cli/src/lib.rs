//! Line-mode terminal client for Huddle
//!
//! A thin shell over [`huddle_app::Driver`] that reads stdin lines, talks to
//! a relay over WebSocket and prints what changed. All orchestration logic
//! lives in the generic [`huddle_app::Runtime`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod driver;
pub mod render;
pub mod services;

pub use driver::{CliError, StdioDriver, spawn_stdin_reader};
pub use huddle_app::{App, AppEvent, Driver, KeyInput, Runtime};
pub use render::Renderer;
pub use services::LocalServices;
