pub mod adf;
pub mod client;
pub mod config;
pub mod error;
pub mod field;
pub mod frontmatter;
pub mod io;
pub mod markdown;
pub mod paths;
pub mod record;
pub mod schema;
pub mod sync;

pub use error::{Result, SyncError};
