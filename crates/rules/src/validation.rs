//! Strict validation results shared by both rule grammars.
//!
//! Load-time parsing is lenient and silently drops what it cannot use. The
//! admin write path runs the grammar's `validate` instead, which collects
//! every defect into a [`ValidationReport`] without touching the store or the
//! backing file.

use serde::{Deserialize, Serialize};

/// Outcome of validating candidate rule content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub messages: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            ok: true,
            messages: Vec::new(),
        }
    }

    /// Record a defect at `location` (e.g. `line 3` or `rules[0]`).
    pub fn error(&mut self, location: impl AsRef<str>, message: impl AsRef<str>) {
        self.ok = false;
        self.messages
            .push(format!("{}: {}", location.as_ref(), message.as_ref()));
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Convert into a `Result`, keeping the report as the error payload.
    pub fn into_result(self) -> std::result::Result<(), ValidationReport> {
        if self.ok {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}
