use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

const DECK_LAYOUT: &str = "assets/deck_layout.json";

fn main() {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let version = env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=LIBPREP_BUILD_N={stamp}");
    println!("cargo:rustc-env=LIBPREP_DISPLAY_VERSION={version}+{stamp}");
    println!("cargo:rustc-env=LIBPREP_BUILD_PROFILE={profile}");
    // the layout is compiled in with include_str!
    println!("cargo:rerun-if-changed={DECK_LAYOUT}");
}
