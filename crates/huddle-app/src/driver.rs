//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the application runtime from specific I/O
//! implementations. Each frontend implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::future::Future;

use huddle_client::TransportEvent;
use huddle_core::{MonotonicInstant, SessionToken};

use crate::{App, AppEvent};

/// Abstracts I/O operations for the application runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`Runtime`](crate::Runtime) handles orchestration logic. This ensures
/// the same orchestration code runs in the terminal client and simulation.
///
/// # Implementations
///
/// - **CLI**: stdin lines for input, a WebSocket for transport
/// - **Simulation**: scripted input against an in-memory relay
///
/// # Associated Types
///
/// - [`Error`](Driver::Error): Platform-specific error type
/// - [`Instant`](Driver::Instant): Time representation (real or virtual)
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: MonotonicInstant;

    /// Poll for the next input event.
    ///
    /// Returns available events or `None` if no events are ready.
    fn poll_event(&mut self) -> impl Future<Output = Result<Option<AppEvent>, Self::Error>> + Send;

    /// Send an encoded frame to the relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver itself failed. A closed transport is
    /// reported through [`Driver::recv_transport`] instead.
    fn send_frame(&mut self, frame: String) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Next transport event, or `None` if nothing is ready.
    fn recv_transport(&mut self) -> impl Future<Output = Option<TransportEvent>> + Send;

    /// Open the transport, authenticating with `token`.
    ///
    /// Returns [`TransportEvent::Opened`] on success, otherwise the rejection
    /// or close that ended the attempt.
    fn open(&mut self, token: &SessionToken) -> impl Future<Output = TransportEvent> + Send;

    /// Close the transport, if open.
    fn close(&mut self);

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Render the application state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, app: &App) -> Result<(), Self::Error>;

    /// Stop the driver and clean up resources.
    fn stop(&mut self);
}
