use std::env;
use std::path::Path;
use std::process::Command;

fn git_version() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|o| o.status.success())?;
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!version.is_empty()).then_some(version)
}

fn main() {
    let pkg_version = env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let version = git_version().map_or_else(|| pkg_version.clone(), |git| format!("{pkg_version} ({git})"));
    println!("cargo::rustc-env=GIT_VERSION={version}");
    println!("cargo::rustc-check-cfg=cfg(distribute)");

    // PROFILE only reports debug/release; custom profiles show up in OUT_DIR.
    let distribute = env::var("OUT_DIR").is_ok_and(|out| {
        Path::new(&out)
            .components()
            .any(|c| c.as_os_str() == "distribute")
    });
    if distribute {
        println!("cargo::rustc-cfg=distribute");
    }

    println!("cargo::rerun-if-changed=.git/HEAD");
}
