pub mod catalog;
pub mod session;

pub use catalog::CatalogCommands;
pub use session::{LoginArgs, RunArgs};
