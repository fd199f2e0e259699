// Minimal integration test that drives the compiled binary through a PTY.
// This exercises the real event loop, bracketed paste setup, and crossterm
// input handling without relying on internal modules.
//
// Notes:
// - Requires a TTY; uses expectrl which allocates a pseudo terminal.
// - Marked Unix-only and ignored by default to avoid CI/platform issues.
// - Run manually via: `cargo test --test integration_min_session -- --ignored`.

#![cfg(unix)]

use std::process::Command;
use std::time::Duration;

use expectrl::{Eof, Session};

#[test]
#[ignore]
fn minimal_session_submits_and_exits() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempfile::tempdir()?;
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin("keytest"));
    cmd.args(["-p", "hi", "-s", "30"]).env("HOME", home.path());

    let mut p = Session::spawn(cmd)?;

    // Give the app a moment to initialize the terminal/alternate screen
    std::thread::sleep(Duration::from_millis(200));

    p.send("hi")?;
    std::thread::sleep(Duration::from_millis(100));
    // Enter submits, then q leaves the results screen
    p.send("\r")?;
    std::thread::sleep(Duration::from_millis(300));
    p.send("q")?;

    p.expect(Eof)?;

    let results = std::fs::read_to_string(home.path().join(".local/state/keytest/results.csv"))?;
    assert!(results.contains("SUBMITTED"));
    Ok(())
}
