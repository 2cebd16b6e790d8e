use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");
    println!("cargo:rerun-if-changed=migrations");
    println!("cargo:rerun-if-env-changed=NANATECH_GIT_SHA");

    // Packaged builds have no .git; they pass the revision in instead.
    let revision = std::env::var("NANATECH_GIT_SHA")
        .ok()
        .or_else(head_revision)
        .map(|sha| sha.trim().to_string())
        .filter(|sha| !sha.is_empty())
        .unwrap_or_else(|| "dev".to_string());

    println!("cargo:rustc-env=NANATECH_GIT_SHA={revision}");
}

fn head_revision() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}
