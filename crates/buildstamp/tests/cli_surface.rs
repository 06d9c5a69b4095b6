use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_buildstamp")
}

#[test]
fn bad_invocation_exits_one_with_usage() {
    let out = Command::new(bin()).output().expect("run without args");
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Usage"), "unexpected stderr: {stderr}");

    let out = Command::new(bin())
        .arg("frobnicate")
        .output()
        .expect("run with unknown target");
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn help_exits_zero() {
    let out = Command::new(bin()).arg("--help").output().expect("run --help");
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("server"), "unexpected stdout: {stdout}");
}

// Interrupting the operator prompt is a clean exit, as with the cached-value
// questions it replaces interactive input for.
#[cfg(unix)]
#[test]
fn interrupt_during_prompt_exits_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut child = Command::new(bin())
        .arg("server")
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn");

    // Leave stdin open but empty so the endpoint prompt blocks in read_line,
    // and give the process time to install its handler.
    thread::sleep(Duration::from_millis(800));
    unsafe {
        libc::kill(child.id() as i32, libc::SIGINT);
    }

    let status = child.wait().expect("wait");
    assert_eq!(status.code(), Some(0));
}
