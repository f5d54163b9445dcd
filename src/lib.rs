pub mod analysis;
pub mod auth;
pub mod combos;
pub mod config;
pub mod contract;
pub mod discovery;
pub mod errors;
pub mod gemini;
pub mod jira;
pub mod models;
pub mod pipeline;
pub mod probe;
pub mod reporting;
pub mod request;
pub mod values;

// Re-export commonly used items
pub use analysis::*;
pub use auth::*;
pub use combos::*;
pub use config::*;
pub use contract::*;
pub use discovery::*;
pub use errors::*;
pub use gemini::*;
pub use jira::*;
pub use models::*;
pub use pipeline::*;
pub use probe::*;
pub use reporting::*;
pub use request::*;
pub use values::*;
