//! Render passes for cameras: attachments, clears, viewport and resolves.

use crate::backend::{
    AttachmentView, ColorAttachment, DepthStencilAttachment, GraphicsBackend, LoadOp,
    RenderPassDescriptor, ScissorRect, StoreOp, Viewport,
};
use crate::color::Color;
use crate::error::RenderError;
use crate::geometry::Rect;
use crate::render_target::{RenderBufferLoadAction, RenderBufferStoreAction, RenderTarget};
use crate::scene::{Camera, CameraUniforms, RenderObject};
use crate::texture::TextureDimensionality;

use super::GraphicsContext;

impl<B: GraphicsBackend> GraphicsContext<B> {
    /// Render `queue` through `camera` into the window surface.
    pub(crate) fn render_camera_to_screen(
        &mut self,
        camera: &Camera,
        queue: &[RenderObject],
    ) -> Result<(), RenderError> {
        let (width, height) = self.backend.surface_size();
        let desc = RenderPassDescriptor {
            label: Some("Screen".to_string()),
            color_attachments: vec![ColorAttachment {
                view: AttachmentView::Surface,
                load_op: load_op(camera.color_load_action(), camera.background_color()),
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: AttachmentView::Surface,
                depth_load_op: load_op(camera.depth_load_action(), Color::CLEAR),
                depth_store_op: StoreOp::Store,
                depth_clear_value: 1.0,
            }),
        };

        let area = output_area(camera.pixel_rect(), width, height);
        let uniforms = camera.uniforms(area.aspect_ratio());
        self.run_pass(&desc, camera, area, width, height, &uniforms, queue)
    }

    /// Render `queue` through `camera` into the attachments of `target`, resolving
    /// multisampled attachments whose store action asks for it.
    pub(crate) fn render_camera_to_target(
        &mut self,
        camera: &Camera,
        queue: &[RenderObject],
        target: &RenderTarget,
    ) -> Result<(), RenderError> {
        let mut colors = Vec::with_capacity(target.colors().len());
        for attachment in target.colors() {
            colors.push(self.resources.render_buffer(
                &mut self.backend,
                &mut self.diagnostics,
                &attachment.buffer,
                self.frame,
            )?);
        }
        let depth = target.depth();
        let depth_storage = self.resources.render_buffer(
            &mut self.backend,
            &mut self.diagnostics,
            &depth.buffer,
            self.frame,
        )?;

        let dimensions = target.dimensions();
        let (width, height) = (dimensions.x, dimensions.y);
        let area = output_area(camera.pixel_rect(), width, height);
        let faces = match target.dimensionality() {
            TextureDimensionality::Tex2D => 1,
            TextureDimensionality::Cube => 6,
        };

        for face in 0..faces {
            let desc = RenderPassDescriptor {
                label: Some(format!("RenderTarget face {face}")),
                color_attachments: target
                    .colors()
                    .iter()
                    .zip(&colors)
                    .map(|(attachment, storage)| ColorAttachment {
                        view: storage.attachment_view(face),
                        load_op: load_op(attachment.load_action, attachment.clear_color),
                        store_op: store_op(attachment.store_action),
                    })
                    .collect(),
                depth_stencil_attachment: Some(DepthStencilAttachment {
                    view: depth_storage.attachment_view(face),
                    depth_load_op: load_op(depth.load_action, Color::CLEAR),
                    depth_store_op: store_op(depth.store_action),
                    depth_clear_value: 1.0,
                }),
            };
            let uniforms = match target.dimensionality() {
                TextureDimensionality::Tex2D => camera.uniforms(area.aspect_ratio()),
                TextureDimensionality::Cube => camera.cube_face_uniforms(face),
            };
            self.run_pass(&desc, camera, area, width, height, &uniforms, queue)?;

            let resolves = target
                .colors()
                .iter()
                .map(|a| a.store_action)
                .zip(colors.iter().copied())
                .chain(std::iter::once((depth.store_action, depth_storage)));
            for (store_action, storage) in resolves {
                if store_action != RenderBufferStoreAction::Resolve {
                    continue;
                }
                if let Some((src, dst, layer)) = storage.resolve(face) {
                    self.backend.resolve_texture(src, dst, layer);
                }
            }
        }

        for attachment in target.colors() {
            if attachment.store_action == RenderBufferStoreAction::Resolve {
                self.resources.mark_rendered(&attachment.buffer);
            }
        }
        if depth.store_action == RenderBufferStoreAction::Resolve {
            self.resources.mark_rendered(&depth.buffer);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_pass(
        &mut self,
        desc: &RenderPassDescriptor,
        camera: &Camera,
        area: Rect,
        width: u32,
        height: u32,
        uniforms: &CameraUniforms,
        queue: &[RenderObject],
    ) -> Result<(), RenderError> {
        self.backend.begin_render_pass(desc);

        let result = if area.width() < 1.0 || area.height() < 1.0 {
            log::debug!("Camera viewport {:?} is empty, only clearing", area);
            Ok(())
        } else {
            self.backend.set_viewport(Viewport {
                x: area.min.x,
                y: area.min.y,
                width: area.width(),
                height: area.height(),
            });
            self.backend.set_scissor_rect(
                camera
                    .scissor_rect()
                    .map(|rect| scissor_rect(rect, width, height)),
            );
            self.flush_queue(queue, uniforms)
        };

        self.backend.end_render_pass();
        result
    }
}

/// Region of a `width` x `height` output a camera draws to
fn output_area(pixel_rect: Option<Rect>, width: u32, height: u32) -> Rect {
    let (w, h) = (width as f32, height as f32);
    match pixel_rect {
        Some(rect) => rect.clamped(w, h),
        None => Rect::new(glam::Vec2::ZERO, glam::Vec2::new(w, h)),
    }
}

fn scissor_rect(rect: Rect, width: u32, height: u32) -> ScissorRect {
    let rect = rect.clamped(width as f32, height as f32);
    ScissorRect {
        x: rect.min.x as u32,
        y: rect.min.y as u32,
        width: rect.width() as u32,
        height: rect.height() as u32,
    }
}

/// Clear colors are authored in sRGB and cleared in linear light
fn load_op(action: RenderBufferLoadAction, clear_color: Color) -> LoadOp {
    match action {
        RenderBufferLoadAction::Clear => LoadOp::Clear(clear_color.to_linear().to_array()),
        RenderBufferLoadAction::Load => LoadOp::Load,
    }
}

fn store_op(action: RenderBufferStoreAction) -> StoreOp {
    match action {
        RenderBufferStoreAction::Resolve => StoreOp::Store,
        RenderBufferStoreAction::DontCare => StoreOp::Discard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, RecordingBackend};
    use crate::config::RendererConfig;
    use crate::render_target::{RenderTargetColorAttachment, RenderTargetDepthAttachment};
    use crate::texture::{AntiAliasingLevel, RenderTexture, RenderTextureDescriptor};
    use crate::testing::context_lock;
    use glam::{UVec2, Vec2};

    fn context() -> GraphicsContext<RecordingBackend> {
        GraphicsContext::new(RecordingBackend::new(16, 8), RendererConfig::default()).unwrap()
    }

    #[test]
    fn test_screen_pass_clears_to_background() {
        let _guard = context_lock();
        let mut ctx = context();
        let mut camera = Camera::new();
        camera.set_background_color(Color::RED);
        let screenshot = ctx.request_screenshot();

        camera.render_to_screen(&mut ctx).unwrap();
        ctx.swap_buffers().unwrap();
        let image = screenshot.try_take().unwrap();
        assert_eq!(&image.pixel_data()[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_pixel_rect_sets_viewport_and_scissor() {
        let _guard = context_lock();
        let mut ctx = context();
        let mut camera = Camera::new();
        camera.set_pixel_rect(Some(Rect::from_origin_size(
            Vec2::new(4.0, 0.0),
            Vec2::new(100.0, 4.0),
        )));
        camera.set_scissor_rect(Some(Rect::from_origin_size(Vec2::ZERO, Vec2::splat(2.0))));

        camera.render_to_screen(&mut ctx).unwrap();
        let commands = ctx.backend().commands();
        assert!(commands.contains(&Command::SetViewport(Viewport {
            x: 4.0,
            y: 0.0,
            width: 12.0,
            height: 4.0,
        })));
        assert!(commands.contains(&Command::SetScissorRect(Some(ScissorRect {
            x: 0,
            y: 0,
            width: 2,
            height: 2,
        }))));
    }

    #[test]
    fn test_multisampled_texture_is_resolved() {
        let _guard = context_lock();
        let mut ctx = context();
        let texture = RenderTexture::new(
            RenderTextureDescriptor::new(UVec2::new(4, 4))
                .with_anti_aliasing_level(AntiAliasingLevel::new(4)),
        );
        let mut camera = Camera::new();
        camera.set_background_color(Color::GREEN);

        camera.render_to_texture(&texture, &mut ctx).unwrap();
        let resolves = ctx
            .backend()
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::ResolveTexture { .. }))
            .count();
        assert_eq!(resolves, 1);

        let image = ctx.read_render_texture(&texture).unwrap();
        assert_eq!(&image.pixel_data()[..4], &[0, 255, 0, 255]);
    }

    #[test]
    fn test_cube_target_renders_every_face() {
        let _guard = context_lock();
        let mut ctx = context();
        let texture = RenderTexture::new(
            RenderTextureDescriptor::new(UVec2::new(4, 4))
                .with_dimensionality(TextureDimensionality::Cube),
        );

        Camera::new().render_to_texture(&texture, &mut ctx).unwrap();
        let passes = ctx
            .backend()
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BeginRenderPass(_)))
            .count();
        assert_eq!(passes, 6);
    }

    #[test]
    fn test_dont_care_attachment_is_not_readable() {
        let _guard = context_lock();
        let mut ctx = context();
        let texture = RenderTexture::new(RenderTextureDescriptor::new(UVec2::new(4, 4)));
        let mut color = RenderTargetColorAttachment::new(texture.color_buffer().clone());
        color.store_action = RenderBufferStoreAction::DontCare;
        let target = RenderTarget::new(
            vec![color],
            RenderTargetDepthAttachment::new(texture.depth_buffer().clone()),
        )
        .unwrap();

        Camera::new().render_to(&target, &mut ctx).unwrap();
        assert!(matches!(
            ctx.read_render_texture(&texture),
            Err(RenderError::RenderTextureNotRendered)
        ));
    }
}
