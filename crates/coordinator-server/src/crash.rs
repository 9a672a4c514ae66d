//! Crash marker file (spec §7: "persist a crash marker" on invariant
//! violation; this expansion's supplemented format, see SPEC_FULL.md §11).

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

const CRASH_MARKER_FILE: &str = "CRASH_MARKER";

#[derive(Debug, Serialize, Deserialize)]
struct CrashMarker {
    occurred_at: String,
    invariant: String,
    description: String,
}

/// Write the crash marker and exit the process with code 1 (spec §7). The
/// only caller of this function is the `invariant_violated` error path.
pub fn persist_and_exit(store_path: &Path, invariant: &str, description: &str) -> ! {
    error!(invariant, description, "invariant violated, writing crash marker and exiting");

    let marker = CrashMarker {
        occurred_at: chrono::Utc::now().to_rfc3339(),
        invariant: invariant.to_string(),
        description: description.to_string(),
    };

    if let Err(e) = std::fs::create_dir_all(store_path) {
        error!(error = %e, "failed to create store directory for crash marker");
    } else if let Ok(json) = serde_json::to_string_pretty(&marker) {
        if let Err(e) = std::fs::write(store_path.join(CRASH_MARKER_FILE), json) {
            error!(error = %e, "failed to write crash marker");
        }
    }

    std::process::exit(1);
}

/// Check for a leftover crash marker at startup. Its presence is logged,
/// not acted on further (spec §11: "checked and logged, not acted upon
/// further, at startup").
pub fn check_at_startup(store_path: &Path) {
    let path = store_path.join(CRASH_MARKER_FILE);
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return;
    };
    match serde_json::from_str::<CrashMarker>(&contents) {
        Ok(marker) => warn!(
            occurred_at = %marker.occurred_at,
            invariant = %marker.invariant,
            description = %marker.description,
            "previous run left a crash marker"
        ),
        Err(e) => warn!(error = %e, "crash marker present but unparsable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_at_startup_is_a_no_op_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        check_at_startup(dir.path()); // must not panic
    }

    #[test]
    fn check_at_startup_reads_a_well_formed_marker() {
        let dir = tempfile::tempdir().unwrap();
        let marker = CrashMarker {
            occurred_at: chrono::Utc::now().to_rfc3339(),
            invariant: "status_dead_implies_breaker_open".into(),
            description: "test marker".into(),
        };
        std::fs::write(dir.path().join(CRASH_MARKER_FILE), serde_json::to_string(&marker).unwrap()).unwrap();
        check_at_startup(dir.path()); // must not panic
    }
}
