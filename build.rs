use std::{fs, path::Path, process::Command, time::SystemTime};

fn main() {
  let now = SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or_default();
  println!("cargo:rustc-env=BUILD_TIME={}", now);

  println!("cargo:rerun-if-changed=.git/HEAD");
  if Path::new(".git/refs/heads").exists() {
    println!("cargo:rerun-if-changed=.git/refs/heads");
  }

  let branch = git(&["rev-parse", "--abbrev-ref", "HEAD"]).or_else(branch_from_head);
  let commit = git(&["rev-parse", "HEAD"]).or_else(commit_from_head);
  let dirty = git(&["status", "--porcelain"])
    .map(|s| !s.is_empty())
    .unwrap_or(false);

  let commit = commit.unwrap_or_else(|| "unknown".to_string());
  let short: String = commit.chars().take(8).collect();

  println!(
    "cargo:rustc-env=GIT_BRANCH={}",
    branch.unwrap_or_else(|| "unknown".to_string())
  );
  println!("cargo:rustc-env=GIT_COMMIT={}", commit);
  println!("cargo:rustc-env=GIT_COMMIT_SHORT={}", short);
  println!("cargo:rustc-env=GIT_DIRTY={}", dirty);

  if let Some(version) = rustc_version() {
    println!("cargo:rustc-env=RUST_VERSION={}", version);
  }
}

fn git(args: &[&str]) -> Option<String> {
  let output = Command::new("git").args(args).output().ok()?;
  if !output.status.success() {
    return None;
  }
  Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

// Fallbacks for source tarballs built without a git binary on PATH.
fn branch_from_head() -> Option<String> {
  let head = fs::read_to_string(".git/HEAD").ok()?;
  let reference = head.strip_prefix("ref: ")?.trim();
  reference.rsplit('/').next().map(str::to_string)
}

fn commit_from_head() -> Option<String> {
  let head = fs::read_to_string(".git/HEAD").ok()?;
  match head.strip_prefix("ref: ") {
    Some(reference) => fs::read_to_string(format!(".git/{}", reference.trim()))
      .ok()
      .map(|c| c.trim().to_string()),
    None => Some(head.trim().to_string()),
  }
}

fn rustc_version() -> Option<String> {
  let rustc = std::env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
  let output = Command::new(rustc).arg("--version").output().ok()?;
  let text = String::from_utf8_lossy(&output.stdout);
  text.split_whitespace().nth(1).map(str::to_string)
}
