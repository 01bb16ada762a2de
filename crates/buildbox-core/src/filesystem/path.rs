//! Path joining confined to a base directory.

use std::path::{Component, Path, PathBuf};

use buildbox_common::error::{BoxError, Result};

/// Joins `sub` below `base`, treating `sub` as relative even if absolute.
///
/// `/home/alice` joined under `/srv/box` yields `/srv/box/home/alice`.
///
/// # Errors
///
/// Returns [`BoxError::Invocation`] if `sub` contains a `..` component,
/// since the result could then leave `base`.
pub fn join_under(base: &Path, sub: &Path) -> Result<PathBuf> {
    let mut joined = base.to_path_buf();
    for component in sub.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                return Err(BoxError::invocation(format!(
                    "path {} escapes {}",
                    sub.display(),
                    base.display()
                )));
            }
        }
    }
    Ok(joined)
}
