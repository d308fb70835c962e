//! Library half of the dispatch CLI, so handlers and renderers can be tested
//! without spawning the binary.

pub mod commands;
pub mod logging;
pub mod output;
pub mod terminal;
