pub mod config;
pub mod error;
pub mod exposure;
pub mod layout;
pub mod severity;
pub mod table;

pub use config::Config;
pub use error::*;
pub use exposure::*;
pub use layout::*;
pub use severity::Severity;
pub use table::*;
