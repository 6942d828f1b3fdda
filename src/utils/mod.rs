pub mod date;
pub mod tui;
