//! Build-time version metadata (`Cargo.toml`'s own version plus the git
//! commit and timestamp `build.rs` stamps in via `rustc-env`).
//!
//! Grounded on the teacher's `utils::version::get_version_info`, trimmed
//! down to what the boot banner actually prints — there is no
//! `SYS_VERSION` syscall here to serve a `KernelVersionInfo` struct to,
//! since there's no userspace to call one.

pub const MAJOR: &str = env!("CARGO_PKG_VERSION_MAJOR");
pub const MINOR: &str = env!("CARGO_PKG_VERSION_MINOR");
pub const PATCH: &str = env!("CARGO_PKG_VERSION_PATCH");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// First 8 hex characters of the build's git commit, the short form every
/// banner actually has room for.
pub fn short_hash() -> &'static str {
    GIT_HASH.get(0..8).unwrap_or(GIT_HASH)
}
