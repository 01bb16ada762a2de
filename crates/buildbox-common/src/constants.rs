//! System-wide constants and default paths.

/// Version reported by the helper binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Binary name for the CLI.
pub const BIN_NAME: &str = "build-box";

/// Exit code for invocation errors (bad arguments, missing paths).
pub const EXIT_INVOCATION: u8 = 1;

/// Exit code for runtime failures (mount, identity switch, child exit).
pub const EXIT_RUNTIME: u8 = 2;

/// Target prefix relative to the invoking user's home directory.
pub const DEFAULT_TARGET_PREFIX_SUBDIR: &str = ".bolt/targets";

/// Filesystem root used when mounting host resources.
pub const SYSTEM_ROOT: &str = "/";

/// Search path handed to programs launched inside a target.
///
/// `/tools/bin` holds the bootstrap toolchain of freshly created targets.
pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin:/tools/bin";

/// Shell used by `login` when the account's shell is absent in the target.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Program used by `list` to enumerate the target prefix.
pub const LIST_PROGRAM: &str = "/bin/ls";

/// Program used by `list` to read target info files.
pub const READ_PROGRAM: &str = "/bin/cat";

/// File inside a target that records its machine triplet.
pub const TARGET_INFO_FILE: &str = "etc/target";

/// Shells whose presence marks a target as usable.
pub const TARGET_SHELLS: [&str; 2] = ["usr/bin/sh", "tools/bin/sh"];

/// Mountinfo table of the calling process.
pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";
