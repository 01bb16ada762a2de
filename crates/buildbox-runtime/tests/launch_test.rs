//! Launcher tests against real processes.
//!
//! Most tests switch "to" the identity the test process already has, so no
//! privileges are needed. Tests that only make sense with or without root,
//! such as dropping to `nobody`, check the effective uid first.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::fs;
use std::os::unix::fs::PermissionsExt;

use buildbox_common::error::BoxError;
use buildbox_core::identity::Identity;
use buildbox_runtime::launcher::{ChildStatus, Launcher, runas_fetch_output};
use nix::sys::signal::Signal;
use nix::unistd::geteuid;

/// A uid far above any allocated account range.
const UNKNOWN_UID: u32 = 3_999_999_999;

/// The conventional unprivileged `nobody` account.
const NOBODY_UID: u32 = 65534;

fn my_uid() -> u32 {
    geteuid().as_raw()
}

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

#[test]
fn echo_output_is_captured_with_zero_status() {
    let output = runas_fetch_output(my_uid(), "/bin/echo", &argv(&["echo", "hi"])).unwrap();

    assert_eq!(output.stdout, b"hi\n");
    assert_eq!(output.status, ChildStatus::Exited(0));
}

#[test]
fn child_runs_with_the_requested_uid() {
    let output = runas_fetch_output(my_uid(), "id", &argv(&["id", "-u"])).unwrap();

    assert!(output.status.success());
    assert_eq!(output.stdout_lossy().trim(), my_uid().to_string());
}

#[test]
fn nonzero_exit_is_a_status_not_an_error() {
    let output =
        runas_fetch_output(my_uid(), "/bin/sh", &argv(&["sh", "-c", "echo partial; exit 3"]))
            .unwrap();

    assert_eq!(output.status, ChildStatus::Exited(3));
    assert_eq!(output.stdout, b"partial\n");
}

#[test]
fn signal_termination_is_reported() {
    let output =
        runas_fetch_output(my_uid(), "/bin/sh", &argv(&["sh", "-c", "kill -KILL $$"])).unwrap();

    assert_eq!(output.status, ChildStatus::Signaled(Signal::SIGKILL));
    assert!(!output.status.success());
}

#[test]
fn missing_program_is_an_execution_error() {
    let err = runas_fetch_output(my_uid(), "/nonexistent/build-box-tool", &[]).unwrap_err();

    match err {
        BoxError::ChildExecution { command, source } => {
            assert_eq!(command, "/nonexistent/build-box-tool");
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_uid_fails_before_spawning() {
    let err = runas_fetch_output(UNKNOWN_UID, "/bin/echo", &argv(&["echo", "never"])).unwrap_err();

    assert!(matches!(err, BoxError::Privilege { uid: UNKNOWN_UID, .. }));
}

#[test]
fn output_larger_than_a_pipe_buffer_is_fully_drained() {
    let output = runas_fetch_output(
        my_uid(),
        "/bin/sh",
        &argv(&["sh", "-c", "head -c 300000 /dev/zero"]),
    )
    .unwrap();

    assert!(output.status.success());
    assert_eq!(output.stdout.len(), 300_000);
    assert!(output.stdout.iter().all(|b| *b == 0));
}

#[test]
fn stderr_is_inherited_not_captured() {
    let output = runas_fetch_output(
        my_uid(),
        "/bin/sh",
        &argv(&["sh", "-c", "echo to-stderr >&2; echo to-stdout"]),
    )
    .unwrap();

    assert_eq!(output.stdout_lossy(), "to-stdout\n");
}

#[test]
fn working_directory_is_entered_after_the_switch() {
    let scratch = tempfile::tempdir().unwrap();
    let dir = scratch.path().canonicalize().unwrap();

    let output = Launcher::for_uid(my_uid(), "/bin/sh")
        .unwrap()
        .argv(["sh", "-c", "pwd -P"])
        .workdir(&dir)
        .fetch_output()
        .unwrap();

    assert_eq!(output.stdout_lossy().trim_end(), dir.display().to_string());
}

#[test]
fn unusable_working_directory_falls_back_to_root() {
    let output = Launcher::for_uid(my_uid(), "/bin/sh")
        .unwrap()
        .argv(["sh", "-c", "pwd"])
        .workdir("/nonexistent/build-box-home")
        .fetch_output()
        .unwrap();

    assert_eq!(output.stdout_lossy(), "/\n");
}

#[test]
fn environment_is_replaced_by_the_launch_environment() {
    let output = Launcher::for_uid(my_uid(), "/bin/sh")
        .unwrap()
        .argv(["sh", "-c", "echo \"$BUILD_BOX_MARKER:$LOGNAME\""])
        .env("BUILD_BOX_MARKER", "set")
        .fetch_output()
        .unwrap();

    let launcher = Launcher::for_uid(my_uid(), "/bin/true").unwrap();
    let expected = format!("set:{}\n", launcher.identity().name());
    assert_eq!(output.stdout_lossy(), expected);
}

#[test]
fn bare_names_are_found_on_the_launch_path() {
    let tools = tempfile::tempdir_in(env!("CARGO_TARGET_TMPDIR")).unwrap();
    let tool = tools.path().join("bb-greet");
    fs::write(&tool, "#!/bin/sh\necho greeted\n").unwrap();
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

    let output = Launcher::for_uid(my_uid(), "bb-greet")
        .unwrap()
        .env("PATH", tools.path().display().to_string())
        .fetch_output()
        .unwrap();

    assert_eq!(output.stdout_lossy(), "greeted\n");
}

#[test]
fn the_callers_path_is_not_searched() {
    let err = Launcher::for_uid(my_uid(), "true")
        .unwrap()
        .env("PATH", "/nonexistent/build-box-bin")
        .fetch_output()
        .unwrap_err();

    match err {
        BoxError::ChildExecution { command, source } => {
            assert_eq!(command, "true");
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn inherited_output_mode_returns_only_the_status() {
    let status = Launcher::for_uid(my_uid(), "/bin/sh")
        .unwrap()
        .argv(["sh", "-c", "exit 7"])
        .run()
        .unwrap();

    assert_eq!(status.code(), Some(7));
}

#[test]
fn unprivileged_caller_cannot_switch_to_another_user() {
    if geteuid().is_root() {
        return;
    }

    let err = runas_fetch_output(0, "/bin/echo", &argv(&["echo", "root"])).unwrap_err();

    assert!(matches!(err, BoxError::Privilege { uid: 0, .. }));
}

#[test]
fn unprivileged_caller_cannot_change_root() {
    if geteuid().is_root() {
        return;
    }

    let err = Launcher::for_uid(my_uid(), "/bin/true")
        .unwrap()
        .root("/")
        .fetch_output()
        .unwrap_err();

    assert!(matches!(err, BoxError::Privilege { .. }));
}

#[test]
fn root_can_launch_inside_a_new_root() {
    if !geteuid().is_root() {
        return;
    }

    let output = Launcher::for_uid(0, "/bin/sh")
        .unwrap()
        .argv(["sh", "-c", "pwd"])
        .root("/")
        .fetch_output()
        .unwrap();

    assert_eq!(output.stdout_lossy(), "/\n");
}

#[test]
fn root_drops_to_an_unprivileged_account() {
    if !geteuid().is_root() {
        return;
    }
    let Ok(nobody) = Identity::from_uid(NOBODY_UID) else {
        return;
    };

    let output =
        runas_fetch_output(NOBODY_UID, "/bin/sh", &argv(&["sh", "-c", "id -u; id -g"])).unwrap();

    assert!(output.status.success());
    assert_eq!(
        output.stdout_lossy(),
        format!("{}\n{}\n", nobody.uid(), nobody.gid())
    );
    assert!(!output.stdout_lossy().starts_with("0\n"));
}
