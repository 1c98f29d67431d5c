pub mod error;
pub mod version;

pub use error::{Error, Result};
pub use version::{Version, VersionRange};
