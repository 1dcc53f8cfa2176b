use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

static ALLOCATED: AtomicU64 = AtomicU64::new(0);

/// Opaque handle of a GPU-owned resource (shader program or texture).
///
/// Handles are never zero and never reused within a process, so a handle
/// identifies exactly one resource for the resource's whole lifetime. The
/// counter is 64-bit and cannot run out in practice.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ResourceId(NonZeroU64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        let allocated = ALLOCATED.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::MIN.saturating_add(allocated))
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn ids_are_unique_and_non_zero() {
        let a = ResourceId::next();
        let b = ResourceId::next();
        assert_ne!(a, b);
        assert!(a.get() > 0 && b.get() > 0);
    }

    #[test]
    fn ids_are_64_bit_and_distinct() {
        let base = ResourceId::next().get();
        let ids: HashSet<_> = (0..1000).map(|_| ResourceId::next()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.get() > base));

        let wide = ResourceId(NonZeroU64::MIN.saturating_add(u64::from(u32::MAX)));
        assert_eq!(wide.get(), u64::from(u32::MAX) + 1);
        assert_eq!(wide.to_string(), "#4294967296");
    }
}
