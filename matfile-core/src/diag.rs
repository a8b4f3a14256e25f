// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-session diagnostics.
//!
//! Non-fatal reader conditions (unsupported classes mapped to null,
//! oddities a file can carry without being unreadable) are recorded
//! here and forwarded to the `log` facade. Each session owns one
//! `Diagnostics`, so embedders can inspect warnings without a
//! process-global sink.

/// Collected warnings for one session.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning and forwards it to `log::warn!`.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.warnings.push(message);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Removes and returns all recorded warnings.
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_drains() {
        let mut diag = Diagnostics::new();
        assert!(diag.is_clean());
        diag.warn("first");
        diag.warn(String::from("second"));
        assert_eq!(diag.warnings(), ["first", "second"]);
        assert_eq!(diag.drain().len(), 2);
        assert!(diag.is_clean());
    }
}
