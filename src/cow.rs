//! Shared-until-written values and resource identity.
//!
//! Every CPU-side resource in the renderer (meshes, materials, textures) is a cheap
//! value type: cloning it shares one reference-counted payload. The first mutation
//! after a clone detaches the mutated copy by cloning the payload, so the other owners
//! keep seeing the old contents.
//!
//! Payloads carry a [`ResourceId`]. Because a detached payload is a *different*
//! resource from the GPU's point of view, payload types hand out a fresh id from their
//! `Clone` impl. Identity therefore follows content divergence: two values compare
//! identical exactly when they still share contents.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a resource payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Allocate a new, never before seen id.
    pub fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value, mainly useful for labels and logging.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared-until-written wrapper around a reference-counted payload.
///
/// Reads go straight through [`Deref`]. Writes go through [`CopyOnWrite::make_mut`],
/// which clones the payload only when another owner still references it.
pub struct CopyOnWrite<T> {
    inner: Arc<T>,
}

impl<T> CopyOnWrite<T> {
    /// Wrap a freshly created payload.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Whether both wrappers point at the same payload.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of owners currently sharing the payload.
    pub fn owner_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<T: Clone> CopyOnWrite<T> {
    /// Mutable access, detaching from other owners first if necessary.
    pub fn make_mut(&mut self) -> &mut T {
        Arc::make_mut(&mut self.inner)
    }
}

impl<T> Clone for CopyOnWrite<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deref for CopyOnWrite<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: fmt::Debug> fmt::Debug for CopyOnWrite<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl<T: Default> Default for CopyOnWrite<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Monotonic content version of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Version(u64);

impl Version {
    /// Advance to the next version.
    pub fn bump(&mut self) {
        self.0 += 1;
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Payload {
        id: ResourceId,
        value: i32,
    }

    impl Clone for Payload {
        fn clone(&self) -> Self {
            Self {
                id: ResourceId::next(),
                value: self.value,
            }
        }
    }

    #[test]
    fn test_clone_shares_payload() {
        let a = CopyOnWrite::new(Payload {
            id: ResourceId::next(),
            value: 1,
        });
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.id, b.id);
        assert_eq!(a.owner_count(), 2);
    }

    #[test]
    fn test_write_detaches_shared_payload() {
        let a = CopyOnWrite::new(Payload {
            id: ResourceId::next(),
            value: 1,
        });
        let mut b = a.clone();
        b.make_mut().value = 2;

        assert!(!a.ptr_eq(&b));
        assert_eq!(a.value, 1);
        assert_eq!(b.value, 2);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_write_on_unique_payload_keeps_identity() {
        let mut a = CopyOnWrite::new(Payload {
            id: ResourceId::next(),
            value: 1,
        });
        let id = a.id;
        a.make_mut().value = 5;
        assert_eq!(a.id, id);
        assert_eq!(a.value, 5);
    }

    #[test]
    fn test_version_bump() {
        let mut v = Version::default();
        v.bump();
        v.bump();
        assert_eq!(v.raw(), 2);
    }
}
