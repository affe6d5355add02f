//! Tools, tool sets and argument validation.

pub mod errors;
mod func;
mod human;
mod schema;
mod set;
mod tool;

pub use errors::ToolError;
pub use func::FnTool;
pub use human::{CONTACT_HUMAN, ContactHuman};
pub use schema::validate_arguments;
pub use set::ToolSet;
pub use tool::{Tool, ToolContext, ToolFlow};
