pub mod config;
pub mod item;
pub mod session;
pub mod task;

pub use config::*;
pub use item::*;
pub use session::*;
pub use task::*;
