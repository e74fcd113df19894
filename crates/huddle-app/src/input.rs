//! Terminal-agnostic keyboard input.

/// Keyboard input abstraction.
///
/// Decouples application logic from terminal libraries so the composer can
/// be driven keystroke by keystroke in simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    /// Printable character.
    Char(char),
    /// Enter/Return key (send or confirm).
    Enter,
    /// Backspace key (delete last character).
    Backspace,
    /// Tab key (cycle channels).
    Tab,
    /// Escape key (cancel command, clear input, quit).
    Esc,
}
