//! Transient assets backing a wrapper graph.

use std::fmt;

/// Host handle for a transient asset (wrapper sequence, track, clip).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetHandle(pub u64);

impl fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset#{}", self.0)
    }
}

/// Allocates and frees the host-side objects a wrapper graph needs.
///
/// Allocations belong to exactly one item execution and are released when
/// that item finishes, fails, or is cancelled.
pub trait TransientAssets: Send {
    fn allocate(&mut self, label: &str) -> AssetHandle;

    fn release(&mut self, handle: AssetHandle);
}
