//! Offscreen rendering: passes per face, multisample resolves and readback.

mod common;

use glam::{UVec2, Vec3};
use rstest::rstest;
use scene_renderer::backend::Command;
use scene_renderer::texture::{RenderBufferDescriptor, RenderBufferFormat};
use scene_renderer::{
    AntiAliasingLevel, Camera, Color, ColorSpace, DepthStencilFormat, RenderBuffer,
    RenderBufferStoreAction, RenderError, RenderTarget, RenderTargetColorAttachment,
    RenderTargetDepthAttachment, RenderTargetError, RenderTexture, RenderTextureDescriptor,
    RenderTextureFormat, RendererConfig, TextureDimensionality,
};

use common::{basic_material, lock, queue_at, recording_context};

fn count(commands: &[Command], pred: impl Fn(&Command) -> bool) -> usize {
    commands.iter().filter(|c| pred(c)).count()
}

fn color_buffer(samples: u32) -> RenderBuffer {
    RenderBuffer::new(RenderBufferDescriptor {
        dimensions: UVec2::splat(8),
        dimensionality: TextureDimensionality::Tex2D,
        anti_aliasing_level: AntiAliasingLevel::new(samples),
        format: RenderBufferFormat::Color {
            format: RenderTextureFormat::Rgba8,
            color_space: ColorSpace::Linear,
        },
    })
}

fn depth_buffer(samples: u32) -> RenderBuffer {
    RenderBuffer::new(RenderBufferDescriptor {
        dimensions: UVec2::splat(8),
        dimensionality: TextureDimensionality::Tex2D,
        anti_aliasing_level: AntiAliasingLevel::new(samples),
        format: RenderBufferFormat::Depth(DepthStencilFormat::Depth32Float),
    })
}

#[rstest]
#[case::flat(TextureDimensionality::Tex2D, 1, 1, 0)]
#[case::flat_msaa(TextureDimensionality::Tex2D, 4, 1, 1)]
#[case::cube(TextureDimensionality::Cube, 1, 6, 0)]
#[case::cube_msaa(TextureDimensionality::Cube, 4, 6, 6)]
fn test_render_texture_passes_and_resolves(
    #[case] dimensionality: TextureDimensionality,
    #[case] samples: u32,
    #[case] passes: usize,
    #[case] resolves: usize,
) {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let texture = RenderTexture::new(
        RenderTextureDescriptor::new(UVec2::splat(16))
            .with_dimensionality(dimensionality)
            .with_anti_aliasing_level(AntiAliasingLevel::new(samples)),
    );
    let material = basic_material();
    let mesh = scene_renderer::Mesh::cube();
    let mut camera = Camera::new();

    queue_at(&mut camera, &mesh, &material, Vec3::new(0.0, 0.0, -3.0));
    camera.render_to_texture(&texture, &mut ctx).unwrap();

    let commands = ctx.backend().commands();
    assert_eq!(
        count(commands, |c| matches!(c, Command::BeginRenderPass(_))),
        passes
    );
    assert_eq!(
        count(commands, |c| matches!(c, Command::ResolveTexture { .. })),
        resolves
    );
}

#[rstest]
#[case::single_sample(1)]
#[case::multisampled(4)]
fn test_rendered_texture_reads_back_its_clear_color(#[case] samples: u32) {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let texture = RenderTexture::new(
        RenderTextureDescriptor::new(UVec2::new(4, 2))
            .with_anti_aliasing_level(AntiAliasingLevel::new(samples)),
    );
    let mut camera = Camera::new();
    camera.set_background_color(Color::RED);

    camera.render_to_texture(&texture, &mut ctx).unwrap();
    let image = ctx.read_render_texture(&texture).unwrap();

    assert_eq!((image.width(), image.height()), (4, 2));
    assert_eq!(image.pixel_data().len(), 4 * 2 * 4);
    assert!(image
        .pixel_data()
        .chunks(4)
        .all(|pixel| pixel == [255, 0, 0, 255]));
}

#[test]
fn test_reading_unrendered_texture_fails() {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let texture = RenderTexture::new(RenderTextureDescriptor::new(UVec2::splat(4)));

    assert!(matches!(
        ctx.read_render_texture(&texture),
        Err(RenderError::RenderTextureNotRendered)
    ));
}

#[test]
fn test_multisampled_color_needs_multisampled_depth() {
    let result = RenderTarget::new(
        vec![RenderTargetColorAttachment::new(color_buffer(4))],
        RenderTargetDepthAttachment::new(depth_buffer(1)),
    );
    assert_eq!(
        result,
        Err(RenderTargetError::SampleCountMismatch {
            expected: 4,
            actual: 1
        })
    );
}

#[test]
fn test_only_resolving_attachments_are_resolved() {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let kept = color_buffer(4);
    let mut scratch = RenderTargetColorAttachment::new(color_buffer(4));
    scratch.store_action = RenderBufferStoreAction::DontCare;
    let target = RenderTarget::new(
        vec![RenderTargetColorAttachment::new(kept.clone()), scratch],
        RenderTargetDepthAttachment::new(depth_buffer(4)),
    )
    .unwrap();
    let mut camera = Camera::new();

    camera.render_to(&target, &mut ctx).unwrap();

    let commands = ctx.backend().commands();
    assert_eq!(
        count(commands, |c| matches!(c, Command::ResolveTexture { .. })),
        1
    );
    let Some(Command::BeginRenderPass(desc)) = commands
        .iter()
        .find(|c| matches!(c, Command::BeginRenderPass(_)))
    else {
        panic!("no render pass recorded");
    };
    assert_eq!(desc.color_attachments.len(), 2);
}
