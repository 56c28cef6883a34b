//! Release version tag.

/// The crate version, used as the global cache version so that every deploy
/// naturally invalidates all cached third-party responses.
pub const RELEASE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_nonempty() {
        assert!(!RELEASE_VERSION.is_empty());
    }
}
