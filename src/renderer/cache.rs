//! GPU copies of CPU resources, keyed by resource identity.

use std::collections::HashMap;

use crate::cow::{ResourceId, Version};

#[derive(Debug)]
pub(crate) struct CacheEntry<T> {
    pub version: Version,
    pub params_version: Version,
    pub last_used: u64,
    pub value: T,
}

/// Uploaded resources and the CPU versions they were uploaded from.
#[derive(Debug)]
pub(crate) struct GpuCache<T> {
    entries: HashMap<ResourceId, CacheEntry<T>>,
}

impl<T> Default for GpuCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

/// Outcome of looking up a resource at a given version
pub(crate) enum Lookup<'a, T> {
    /// Cached copy is current
    Hit(&'a mut CacheEntry<T>),
    /// Data is current but sampling parameters changed
    ParamsStale(&'a mut CacheEntry<T>),
    /// Nothing cached, or the data changed
    Miss,
}

impl<T> GpuCache<T> {
    pub fn lookup(
        &mut self,
        id: ResourceId,
        version: Version,
        params_version: Version,
        frame: u64,
    ) -> Lookup<'_, T> {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.version == version => {
                entry.last_used = frame;
                if entry.params_version == params_version {
                    Lookup::Hit(entry)
                } else {
                    Lookup::ParamsStale(entry)
                }
            }
            _ => Lookup::Miss,
        }
    }

    #[cfg(test)]
    pub fn get(&self, id: ResourceId) -> Option<&CacheEntry<T>> {
        self.entries.get(&id)
    }

    /// Store a fresh upload, returning the GPU value it replaces
    pub fn insert(
        &mut self,
        id: ResourceId,
        version: Version,
        params_version: Version,
        frame: u64,
        value: T,
    ) -> Option<T> {
        self.entries
            .insert(
                id,
                CacheEntry {
                    version,
                    params_version,
                    last_used: frame,
                    value,
                },
            )
            .map(|old| old.value)
    }

    /// Remove entries unused for more than `idle_frames` frames
    pub fn evict_idle(&mut self, frame: u64, idle_frames: u64) -> Vec<(ResourceId, T)> {
        let stale: Vec<ResourceId> = self
            .entries
            .iter()
            .filter(|(_, e)| frame.saturating_sub(e.last_used) > idle_frames)
            .map(|(id, _)| *id)
            .collect();
        stale
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|e| (id, e.value)))
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
