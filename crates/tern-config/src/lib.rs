pub mod loader;
pub mod model;
pub mod validation;

pub use loader::ConfigLoader;
pub use model::TernConfig;
pub use validation::validate_identifier;
