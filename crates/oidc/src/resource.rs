//! Resolution of symbolic resource paths to bytes.
//!
//! The engine needs raw bytes in two places: a local provider-metadata
//! document and a custom TLS trust-anchor bundle. Where those bytes live
//! (filesystem, classpath-like registry, remote store) is the embedding
//! application's business, abstracted behind this trait.

use std::io;

/// Trait resolving a symbolic resource path into its content.
pub trait ResourceResolver: Send + Sync {
    /// Resolve `path` and return the resource's bytes.
    ///
    /// # Errors
    /// Returns an I/O error when the resource does not exist or cannot be
    /// read.
    fn resolve(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// Filesystem-backed resolver: paths are plain file paths.
#[derive(Debug, Clone, Default)]
pub struct FsResourceResolver;

impl ResourceResolver for FsResourceResolver {
    fn resolve(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}
