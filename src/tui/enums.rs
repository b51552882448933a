//! Enumerations for TUI state management.

/// Popup drawn over the board.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Overlay {
    None,
    Detail,
    Notifications,
    Activity,
    Help,
}

/// What typed characters go to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InputMode {
    None,
    Filter,
    Comment,
}

/// Board key actions that reach the session.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Move {
    Advance,
    Regress,
}
