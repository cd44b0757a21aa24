//! Renderer configuration.

/// One level of the opaque batching hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKey {
    Material,
    PropertyBlock,
    Mesh,
    SubMesh,
}

impl BatchKey {
    pub const DEFAULT_ORDER: [BatchKey; 4] = [
        BatchKey::Material,
        BatchKey::PropertyBlock,
        BatchKey::Mesh,
        BatchKey::SubMesh,
    ];
}

/// Renderer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Wait for vertical blank when presenting
    pub vsync: bool,
    /// Backend validation and per-frame statistics logging
    pub debug_mode: bool,
    /// Use instanced draws for shaders that take per-instance transforms
    pub instancing: bool,
    /// Texture units available to one draw
    pub max_texture_units: u32,
    /// Frames a cached GPU resource may go unused before it is destroyed
    pub cache_idle_frames: u64,
    /// Nesting order used when grouping opaque objects, outermost first
    pub batching_order: [BatchKey; 4],
    /// Sample count of the window surface
    pub surface_sample_count: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            debug_mode: false,
            instancing: true,
            max_texture_units: 16,
            cache_idle_frames: 120,
            batching_order: BatchKey::DEFAULT_ORDER,
            surface_sample_count: 1,
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    pub fn with_instancing(mut self, instancing: bool) -> Self {
        self.instancing = instancing;
        self
    }

    pub fn with_max_texture_units(mut self, units: u32) -> Self {
        self.max_texture_units = units;
        self
    }

    pub fn with_cache_idle_frames(mut self, frames: u64) -> Self {
        self.cache_idle_frames = frames;
        self
    }

    /// Set the batching order. Anything other than a permutation of the four keys is
    /// rejected with a warning and the default order is kept.
    pub fn with_batching_order(mut self, order: [BatchKey; 4]) -> Self {
        let is_permutation = BatchKey::DEFAULT_ORDER
            .iter()
            .all(|key| order.contains(key));
        if is_permutation {
            self.batching_order = order;
        } else {
            log::warn!(
                "Batching order {:?} is not a permutation, keeping {:?}",
                order,
                self.batching_order
            );
        }
        self
    }

    pub fn with_surface_sample_count(mut self, samples: u32) -> Self {
        self.surface_sample_count = samples.max(1);
        self
    }
}
