//! Build script for rulekeeper
//!
//! Embeds build-time information (git commit, dirty status, build timestamp)
//! shown by `rulekeeper --version`.

fn main() {
    // Re-run build if the packager overrides the default base directory
    println!("cargo:rerun-if-env-changed=RULEKEEPER_DEFAULT_BASE_DIR");

    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build info");
}
