//! Online/offline belief about downstream reachability.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether the proxy currently believes the downstream API (and spec host) are reachable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    #[default]
    Online,
    Offline,
}

impl OperationMode {
    #[must_use]
    pub fn is_offline(self) -> bool {
        self == OperationMode::Offline
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationMode::Online => f.write_str("Online"),
            OperationMode::Offline => f.write_str("Offline"),
        }
    }
}

/// Apply a mode change, logging the transition when the mode actually changes.
///
/// Returns `true` when the stored mode was updated.
pub fn transition(current: &mut OperationMode, next: OperationMode) -> bool {
    if *current == next {
        return false;
    }
    let previous = *current;
    *current = next;
    tracing::info!(%previous, current = %next, "operation mode changed");
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_online() {
        assert_eq!(OperationMode::default(), OperationMode::Online);
    }

    #[test]
    fn transition_reports_only_real_changes() {
        let mut mode = OperationMode::Online;
        assert!(!transition(&mut mode, OperationMode::Online));
        assert!(transition(&mut mode, OperationMode::Offline));
        assert_eq!(mode, OperationMode::Offline);
        assert!(!transition(&mut mode, OperationMode::Offline));
        assert!(transition(&mut mode, OperationMode::Online));
        assert!(!mode.is_offline());
    }
}
