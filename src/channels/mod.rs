//! Front ends for the conversation engine.

pub mod repl;

pub use repl::ChatRepl;
