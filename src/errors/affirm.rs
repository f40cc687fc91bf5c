//! Assertion-style helpers for raising validation errors.
//!
//! `affirm` is the one-liner hooks and handlers use to turn a boolean check
//! into a taxonomized validation fault:
//!
//! ```ignore
//! affirm(name.chars().count() > 3, "name too short")?;
//! affirm(
//!     value.is_string(),
//!     ErrorEntry::new("field bad type").with("field", "name").with("type", "string"),
//! )?;
//! ```

use crate::errors::{ErrorEntry, Fault};

/// Raise a single validation error unless `cond` holds.
pub fn affirm(cond: bool, entry: impl Into<ErrorEntry>) -> Result<(), Fault> {
    if cond {
        Ok(())
    } else {
        Err(Fault::Validation(vec![entry.into()]))
    }
}

/// Raise a batch of validation errors; an empty batch raises nothing.
pub fn fail<I, E>(entries: I) -> Result<(), Fault>
where
    I: IntoIterator<Item = E>,
    E: Into<ErrorEntry>,
{
    let errors: Vec<ErrorEntry> = entries.into_iter().map(Into::into).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Fault::Validation(errors))
    }
}
