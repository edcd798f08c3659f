//! Configuration options for the checker.
//!
//! Options arrive layered: a configuration file (when given) first, then
//! `ARGUS_`-prefixed environment variables. The struct implements
//! `serde::Deserialize` so both sources funnel through the `config`
//! crate.

use serde::Deserialize;

/// Checker configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ArgusConfig {
    /// Directory holding micro-operator template fragments
    microcode_path: Option<String>,
    /// Wall-clock budget; on expiry every engine is interrupted and the
    /// run surfaces UNDECIDED
    timeout_secs: Option<u64>,
}

impl ArgusConfig {
    /// Template fragment directory, if configured
    pub fn microcode_path(&self) -> Option<&str> {
        self.microcode_path.as_deref()
    }

    /// Wall-clock budget in seconds, if configured
    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }

    /// Override the wall-clock budget (CLI flag wins over file and
    /// environment)
    pub fn set_timeout_secs(&mut self, secs: u64) {
        self.timeout_secs = Some(secs);
    }
}
