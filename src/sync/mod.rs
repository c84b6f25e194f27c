//! The reactive side: session-scoped queries, sectioning, diffing and the
//! task editor. Nothing here knows about files or the terminal.

pub mod differ;
pub mod edit_buffer;
pub mod editor;
pub mod pipeline;
pub mod scheduler;
pub mod sectioner;
pub mod switcher;
