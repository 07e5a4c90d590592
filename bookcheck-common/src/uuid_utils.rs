//! UUID utilities

use uuid::Uuid;

use crate::{Error, Result};

/// Parse a record id from a path segment
///
/// A string that is not a UUID cannot name any record, so it is reported
/// as not found rather than as bad input.
pub fn parse_record_id(s: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).map_err(|_| Error::NotFound(format!("{} not found", what)))
}
