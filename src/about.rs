//! Version banner and the machine-readable summary of what this build can
//! run: its stages, its tools and the bundled deck.

use crate::layout::DEFAULT_LAYOUT;
use crate::stages::StageKind;
use libprep_protocol::Tool;
use std::collections::BTreeMap;

pub const LIBPREP_DISPLAY_VERSION: &str = env!("LIBPREP_DISPLAY_VERSION");
pub const LIBPREP_BUILD_N: &str = env!("LIBPREP_BUILD_N");
pub const LIBPREP_BUILD_PROFILE: &str = env!("LIBPREP_BUILD_PROFILE");

const TOOLS: [Tool; 2] = [Tool::P20, Tool::P300];

pub fn version_cli_text() -> String {
    let tools: Vec<String> = TOOLS
        .iter()
        .map(|t| format!("{} ({} channels)", t.as_str(), t.model().channels))
        .collect();
    format!(
        "libprep {} [{} build {}]\nlibrary prep: {} stages, {} labware on deck, tools {}",
        LIBPREP_DISPLAY_VERSION,
        LIBPREP_BUILD_PROFILE,
        LIBPREP_BUILD_N,
        StageKind::ALL.len(),
        DEFAULT_LAYOUT.labware().count(),
        tools.join(", ")
    )
}

/// Machine-readable summary for `libprep_cli capabilities`.
pub fn capabilities() -> serde_json::Value {
    let roles: BTreeMap<&str, String> = DEFAULT_LAYOUT
        .roles()
        .iter()
        .map(|(role, well)| (role.as_str(), well.to_string()))
        .collect();
    serde_json::json!({
        "version": LIBPREP_DISPLAY_VERSION,
        "stages": StageKind::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        "default_stages": StageKind::default_order().iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        "tools": TOOLS.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
        "deck": {
            "labware": DEFAULT_LAYOUT.labware().collect::<Vec<_>>(),
            "roles": roles,
            "reusable_tip": DEFAULT_LAYOUT.reusable_tip(),
        },
        "commands": ["--version", "capabilities", "plan-transfer", "simulate", "init-config"],
    })
}
