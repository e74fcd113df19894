//! Application layer for Huddle
//!
//! Pure state machines and a generic runtime for UI and protocol
//! orchestration, so simulation tests run the same code as the terminal
//! client.
//!
//! # Components
//!
//! - [`App`]: composer and channel view state machine
//! - [`Bridge`]: translates App actions into client calls and back
//! - [`Driver`]: trait for platform-specific I/O
//! - [`Runtime`]: generic orchestration loop using a Driver
//! - [`SessionHandle`]: async request/response facade over a running Runtime
//!
//! # Architecture
//!
//! ```text
//!   keys ──► App ──AppAction──► Bridge ──► Client
//!             ▲                   │          │
//!             └─────AppEvent──────┘   ClientAction
//!                                            │
//!   SessionHandle ──request──► Runtime ◄─────┘──► Driver (socket, clock, screen)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod app;
mod bridge;
mod driver;
mod event;
mod input;
mod runtime;
mod session;
mod state;

pub use action::AppAction;
pub use app::App;
pub use bridge::{Bridge, Settlement, TransportRequest};
pub use driver::Driver;
pub use event::AppEvent;
pub use input::KeyInput;
pub use runtime::Runtime;
pub use session::{SessionError, SessionHandle};
pub use state::{ChannelView, LocalCommand};
