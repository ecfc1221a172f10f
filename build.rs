use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // The accessibility provider and overlay host talk to these frameworks
    // directly; other targets only build the portable core.
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "macos" {
        println!("cargo:rustc-link-lib=framework=ApplicationServices");
        println!("cargo:rustc-link-lib=framework=AppKit");
        println!("cargo:rustc-link-lib=framework=CoreGraphics");
        println!("cargo:rustc-env=MACOSX_DEPLOYMENT_TARGET=10.15");
    }
}
