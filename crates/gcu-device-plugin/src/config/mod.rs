pub mod cli;
pub mod daemon;
pub mod list;

pub use cli::*;
pub use daemon::*;
pub use list::*;
