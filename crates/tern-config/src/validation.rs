use std::sync::LazyLock;

use regex::Regex;
use tern_common::{Error, Result};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// Maximum identifier length accepted for the bookkeeping table.
const MAX_IDENTIFIER_LEN: usize = 128;

/// Validate that `name` is safe to splice into SQL as a table identifier.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Config("table name cannot be empty".into()));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::Config(format!(
            "table name too long ({} > {MAX_IDENTIFIER_LEN})",
            name.len()
        )));
    }
    if !IDENTIFIER.is_match(name) {
        return Err(Error::Config(format!(
            "table name `{name}` must contain only letters, digits and underscores"
        )));
    }
    Ok(())
}
