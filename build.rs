fn main() {
    let now = chrono::Utc::now();
    println!(
        "cargo:rustc-env=OIDCRP_BUILD_DATE={}",
        now.format("%Y-%m-%dT%H:%M:%SZ")
    );
    println!("cargo:rerun-if-changed=build.rs");
}
