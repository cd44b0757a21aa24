//! Log-once registry for graceful degradations.

use std::collections::HashSet;
use std::fmt;

/// Remembers which degradations were already reported, so a per-frame fallback logs once
/// per context instead of once per draw.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    reported: HashSet<String>,
}

impl Diagnostics {
    /// Log `message` at `warn` the first time `key` is seen
    pub fn warn_once(&mut self, key: impl Into<String>, message: fmt::Arguments<'_>) {
        if self.reported.insert(key.into()) {
            log::warn!("{}", message);
        }
    }

    /// Log `message` at `debug` the first time `key` is seen
    pub fn debug_once(&mut self, key: impl Into<String>, message: fmt::Arguments<'_>) {
        if self.reported.insert(key.into()) {
            log::debug!("{}", message);
        }
    }

    #[cfg(test)]
    pub fn was_reported(&self, key: &str) -> bool {
        self.reported.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_each_key_once() {
        let mut diagnostics = Diagnostics::default();
        assert!(!diagnostics.was_reported("mipmap"));
        diagnostics.warn_once("mipmap", format_args!("first"));
        diagnostics.warn_once("mipmap", format_args!("second"));
        assert!(diagnostics.was_reported("mipmap"));
        assert_eq!(diagnostics.reported.len(), 1);
    }
}
