//! Build identifier and the version gate for remote updates.

/// Identifier of the running image, from the `BUILD` environment variable
/// at compile time.
pub const BUILD_TAG: &str = match option_env!("BUILD") {
    Some(tag) => tag,
    None => "_unknown_build_",
};

/// Outcome of comparing a remote version against the local build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    /// Versions agree over their common prefix: nothing to do.
    UpToDate,
    /// Versions differ: request the firmware stream.
    RemoteDiffers,
}

/// Byte-wise comparison of `local` and `remote` over the shorter length.
///
/// Only an exact match of the common prefix counts as up to date; every
/// other ordering (remote newer *or* older) is treated as a different
/// image.  This is lexical, not semantic: `"9.0"` and `"10.0"` simply
/// differ, and `"1.0"` vs `"1.0.1"` compares equal.
pub fn compare(local: &[u8], remote: &[u8]) -> VersionCheck {
    let n = local.len().min(remote.len());
    if local[..n] == remote[..n] {
        VersionCheck::UpToDate
    } else {
        VersionCheck::RemoteDiffers
    }
}
