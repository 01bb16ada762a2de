//! Enumeration of the targets below a target prefix.
//!
//! Directory contents are read by programs launched under the invoking
//! user's identity, so a privileged helper never reads user-controlled
//! paths with its own rights.

use std::path::Path;

use buildbox_common::constants::{LIST_PROGRAM, READ_PROGRAM, TARGET_INFO_FILE, TARGET_SHELLS};
use buildbox_common::error::{BoxError, Result};
use buildbox_core::identity::Identity;
use serde::Serialize;

use crate::launcher::Launcher;

/// Machine reported for a target without a shell or target info file.
pub const MACHINE_DEFUNCT: &str = "defunct";

/// Machine reported for a target whose info file names no machine.
pub const MACHINE_UNKNOWN: &str = "unknown";

/// A target directory and the machine it was built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetEntry {
    /// Directory name below the target prefix.
    pub name: String,
    /// Machine triplet, `unknown`, or `defunct`.
    pub machine: String,
}

/// Lists the targets below `prefix` as seen by `identity`.
///
/// A missing prefix yields an empty list.
///
/// # Errors
///
/// Returns an error if the listing program cannot be launched or exits
/// unsuccessfully.
pub fn list_targets(identity: &Identity, prefix: &Path) -> Result<Vec<TargetEntry>> {
    if !prefix.is_dir() {
        tracing::debug!(prefix = %prefix.display(), "target prefix missing");
        return Ok(Vec::new());
    }

    let prefix_arg = prefix.display().to_string();
    let output = Launcher::new(identity.clone(), LIST_PROGRAM)
        .argv(["ls", "-1A", "--", prefix_arg.as_str()])
        .fetch_output()?;
    if !output.status.success() {
        return Err(BoxError::ChildExit {
            command: LIST_PROGRAM.to_string(),
            status: output.status.to_string(),
        });
    }

    let mut entries = Vec::new();
    for name in parse_listing(&output.stdout) {
        let dir = prefix.join(&name);
        if !dir.is_dir() {
            continue;
        }
        let machine = read_machine(identity, &dir)?;
        entries.push(TargetEntry { name, machine });
    }
    Ok(entries)
}

/// Splits `ls -1` output into entry names.
#[must_use]
pub fn parse_listing(output: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(output)
        .lines()
        .filter(|line| !line.is_empty() && *line != "." && *line != "..")
        .map(ToString::to_string)
        .collect()
}

/// Extracts the value of the last `TARGET_MACHINE = <value>` line.
#[must_use]
pub fn parse_target_machine(content: &str) -> Option<String> {
    content
        .lines()
        .filter_map(|line| {
            let value = line
                .strip_prefix("TARGET_MACHINE")?
                .trim_start()
                .strip_prefix('=')?
                .trim();
            let single_word = !value.is_empty() && !value.contains(char::is_whitespace);
            single_word.then(|| value.to_string())
        })
        .last()
}

fn read_machine(identity: &Identity, dir: &Path) -> Result<String> {
    let has_shell = TARGET_SHELLS.iter().any(|shell| dir.join(shell).exists());
    let info = dir.join(TARGET_INFO_FILE);
    if !has_shell || !info.exists() {
        return Ok(MACHINE_DEFUNCT.to_string());
    }

    let info_arg = info.display().to_string();
    let output = Launcher::new(identity.clone(), READ_PROGRAM)
        .argv(["cat", "--", info_arg.as_str()])
        .fetch_output()?;
    if !output.status.success() {
        tracing::warn!(path = %info.display(), status = %output.status, "target info unreadable");
        return Ok(MACHINE_UNKNOWN.to_string());
    }
    Ok(parse_target_machine(&output.stdout_lossy()).unwrap_or_else(|| MACHINE_UNKNOWN.to_string()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use nix::unistd::geteuid;

    use super::*;

    #[test]
    fn listing_skips_blank_and_dot_entries() {
        let names = parse_listing(b"alpha\n\n.\n..\nbeta gamma\n");
        assert_eq!(names, ["alpha", "beta gamma"]);
    }

    #[test]
    fn machine_is_taken_from_the_last_matching_line() {
        let content = "\
TARGET_ARCH=x86_64
TARGET_MACHINE = x86_64-pc-linux-musl
TARGET_MACHINE=aarch64-linux-musl
";
        assert_eq!(
            parse_target_machine(content).as_deref(),
            Some("aarch64-linux-musl")
        );
    }

    #[test]
    fn malformed_machine_lines_are_ignored() {
        assert_eq!(parse_target_machine("TARGET_MACHINE = two words\n"), None);
        assert_eq!(parse_target_machine("TARGET_MACHINE =\n"), None);
        assert_eq!(parse_target_machine("# TARGET_MACHINE = x\n"), None);
    }

    #[test]
    fn lists_targets_with_their_machines() {
        let Ok(me) = Identity::from_uid(geteuid().as_raw()) else {
            return;
        };
        let prefix = tempfile::tempdir().unwrap();

        let good = prefix.path().join("stable-x86_64");
        fs::create_dir_all(good.join("usr/bin")).unwrap();
        fs::create_dir_all(good.join("etc")).unwrap();
        fs::write(good.join("usr/bin/sh"), "").unwrap();
        fs::write(good.join("etc/target"), "TARGET_MACHINE = x86_64-linux-musl\n").unwrap();

        let bare = prefix.path().join("bootstrap");
        fs::create_dir_all(bare.join("tools/bin")).unwrap();
        fs::create_dir_all(bare.join("etc")).unwrap();
        fs::write(bare.join("tools/bin/sh"), "").unwrap();
        fs::write(bare.join("etc/target"), "# nothing yet\n").unwrap();

        fs::create_dir(prefix.path().join("broken")).unwrap();
        fs::write(prefix.path().join("stray-file"), "").unwrap();

        let mut entries = list_targets(&me, prefix.path()).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let pairs: Vec<_> = entries
            .iter()
            .map(|e| (e.name.as_str(), e.machine.as_str()))
            .collect();
        assert_eq!(
            pairs,
            [
                ("bootstrap", MACHINE_UNKNOWN),
                ("broken", MACHINE_DEFUNCT),
                ("stable-x86_64", "x86_64-linux-musl"),
            ]
        );
    }

    #[test]
    fn missing_prefix_lists_nothing() {
        let Ok(me) = Identity::from_uid(geteuid().as_raw()) else {
            return;
        };
        let scratch = tempfile::tempdir().unwrap();
        let entries = list_targets(&me, &scratch.path().join("targets")).unwrap();
        assert!(entries.is_empty());
    }
}
