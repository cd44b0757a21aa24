//! The graphics context: GPU resource ownership, flushing camera queues and presenting.

mod binding;
mod cache;
mod diagnostics;
mod flush;
mod instancing;
mod pass;
mod resources;
mod screenshot;

pub use screenshot::ScreenshotHandle;

use std::sync::atomic::{AtomicBool, Ordering};

use crate::backend::GraphicsBackend;
use crate::config::RendererConfig;
use crate::error::RenderError;
use crate::texture::{ColorSpace, RenderTexture, Texture2D, TextureFormat};

use diagnostics::Diagnostics;
use instancing::InstanceBuffer;
use resources::GpuResources;

static CONTEXT_ALIVE: AtomicBool = AtomicBool::new(false);

/// Counters accumulated over one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// Render objects flushed
    pub objects: usize,
    /// Innermost batches drawn
    pub batches: usize,
    pub draw_calls: usize,
    /// Draw calls covering more than one object
    pub instanced_draw_calls: usize,
    /// Program and pipeline state switches
    pub state_changes: usize,
}

/// Owner of every GPU resource the renderer creates.
///
/// Only one context may be alive at a time. It is built by whoever owns the window and
/// passed by reference to the cameras that render through it.
pub struct GraphicsContext<B: GraphicsBackend> {
    backend: B,
    config: RendererConfig,
    resources: GpuResources,
    diagnostics: Diagnostics,
    instances: InstanceBuffer,
    frame: u64,
    stats: FrameStats,
    last_frame_stats: FrameStats,
    screenshots: Vec<ScreenshotHandle>,
}

impl<B: GraphicsBackend> GraphicsContext<B> {
    /// Create the context. Fails while another context is alive.
    pub fn new(backend: B, config: RendererConfig) -> Result<Self, RenderError> {
        if CONTEXT_ALIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RenderError::ContextAlreadyExists);
        }

        let (width, height) = backend.surface_size();
        log::info!(
            "Graphics context created ({}x{}, instancing {}, vsync {})",
            width,
            height,
            config.instancing,
            config.vsync
        );

        Ok(Self {
            backend,
            config,
            resources: GpuResources::default(),
            diagnostics: Diagnostics::default(),
            instances: InstanceBuffer::default(),
            frame: 0,
            stats: FrameStats::default(),
            last_frame_stats: FrameStats::default(),
            screenshots: Vec::new(),
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.backend.surface_size()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.backend.resize(width, height);
    }

    /// Number of frames presented so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Statistics of the frame being recorded
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Statistics of the last presented frame
    pub fn last_frame_stats(&self) -> FrameStats {
        self.last_frame_stats
    }

    /// Ask for a copy of the next presented frame.
    pub fn request_screenshot(&mut self) -> ScreenshotHandle {
        let handle = ScreenshotHandle::new();
        self.screenshots.push(handle.clone());
        handle
    }

    /// Finish the frame: fulfil screenshot requests, present, then recycle per-frame
    /// resources.
    pub fn swap_buffers(&mut self) -> Result<(), RenderError> {
        if !self.screenshots.is_empty() {
            match self.backend.read_surface() {
                Ok(readback) => {
                    let mut image = Texture2D::new(
                        readback.width,
                        readback.height,
                        TextureFormat::Rgba8,
                        ColorSpace::Srgb,
                    );
                    image.set_pixel_data(&readback.rgba8)?;
                    for handle in self.screenshots.drain(..) {
                        handle.fulfill(image.clone());
                    }
                }
                Err(e) => {
                    log::warn!("Screenshot readback failed, retrying next frame: {}", e);
                }
            }
        }

        self.backend.present()?;

        self.frame += 1;
        self.instances.reset(&mut self.backend);
        self.resources.collect_garbage(
            &mut self.backend,
            self.frame,
            self.config.cache_idle_frames,
        );

        if self.config.debug_mode {
            log::trace!("Frame {} stats: {:?}", self.frame, self.stats);
        }
        self.last_frame_stats = std::mem::take(&mut self.stats);
        Ok(())
    }

    /// Copy the color image of a rendered texture back to the CPU.
    pub fn read_render_texture(&mut self, texture: &RenderTexture) -> Result<Texture2D, RenderError> {
        let buffer = texture.color_buffer();
        if !self.resources.is_rendered(buffer) {
            return Err(RenderError::RenderTextureNotRendered);
        }
        let storage =
            self.resources
                .render_buffer(&mut self.backend, &mut self.diagnostics, buffer, self.frame)?;
        let readback = self.backend.read_texture(storage.sample_texture(), 0)?;

        let mut image = Texture2D::new(
            readback.width,
            readback.height,
            TextureFormat::Rgba8,
            texture.read_write(),
        );
        image.set_pixel_data(&readback.rgba8)?;
        Ok(image)
    }
}

impl<B: GraphicsBackend> Drop for GraphicsContext<B> {
    fn drop(&mut self) {
        CONTEXT_ALIVE.store(false, Ordering::Release);
        log::info!("Graphics context destroyed after {} frames", self.frame);
    }
}
