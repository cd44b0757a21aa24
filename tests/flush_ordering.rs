//! Draw ordering and batching of camera queues, checked against the recording backend.

mod common;

use glam::{Mat4, Vec3};
use rstest::rstest;
use scene_renderer::backend::Command;
use scene_renderer::{
    draw, BatchKey, Camera, Color, MaterialPropertyBlock, Mesh, RendererConfig,
};

use common::{
    basic_material, draws, instanced_material, lock, queue_at, recording_context, uniform_writes,
};

/// Color uniform bytes rounded to two decimals
fn color_of(bytes: &[u8]) -> [f32; 4] {
    bytemuck::pod_read_unaligned::<[f32; 4]>(&bytes[..16]).map(|c| (c * 100.0).round() / 100.0)
}

#[test]
fn test_opaque_objects_are_batched_by_material_then_mesh() {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let (m1, m2) = (instanced_material(), instanced_material());
    let (x, y) = (Mesh::cube(), Mesh::uv_sphere(8, 4));
    let mut camera = Camera::new();

    queue_at(&mut camera, &x, &m1, Vec3::ZERO);
    queue_at(&mut camera, &y, &m2, Vec3::X);
    queue_at(&mut camera, &x, &m1, Vec3::Y);
    camera.render_to_screen(&mut ctx).unwrap();

    assert_eq!(draws(ctx.backend().commands()), vec![2, 1]);
    let stats = ctx.stats();
    assert_eq!(stats.objects, 3);
    assert_eq!(stats.batches, 2);
    assert_eq!(stats.instanced_draw_calls, 1);
}

#[rstest]
#[case::material_first(BatchKey::DEFAULT_ORDER, 4)]
#[case::mesh_first(
    [BatchKey::Mesh, BatchKey::Material, BatchKey::PropertyBlock, BatchKey::SubMesh],
    2
)]
fn test_batching_order_decides_mesh_rebinds(
    #[case] order: [BatchKey; 4],
    #[case] mesh_binds: usize,
) {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default().with_batching_order(order));
    let (m1, m2) = (instanced_material(), instanced_material());
    let (x, y) = (Mesh::cube(), Mesh::plane(1.0, 1.0, 1));
    let mut camera = Camera::new();

    queue_at(&mut camera, &x, &m1, Vec3::ZERO);
    queue_at(&mut camera, &x, &m2, Vec3::ZERO);
    queue_at(&mut camera, &y, &m2, Vec3::ZERO);
    queue_at(&mut camera, &y, &m1, Vec3::ZERO);
    camera.render_to_screen(&mut ctx).unwrap();

    let binds = ctx
        .backend()
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::SetIndexBuffer { .. }))
        .count();
    assert_eq!(binds, mesh_binds);
    assert_eq!(draws(ctx.backend().commands()), vec![1, 1, 1, 1]);
}

#[test]
fn test_transparent_objects_draw_back_to_front() {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let mut material = basic_material();
    material.set_transparent(true);
    let model_location = material
        .shader()
        .find_property("u_model_mat")
        .unwrap()
        .location;
    let mesh = Mesh::cube();
    let mut camera = Camera::new();
    camera.set_position(Vec3::ZERO);

    queue_at(&mut camera, &mesh, &material, Vec3::new(0.0, 0.0, -5.0));
    queue_at(&mut camera, &mesh, &material, Vec3::new(0.0, 0.0, -10.0));
    camera.render_to_screen(&mut ctx).unwrap();

    let depths: Vec<f32> = uniform_writes(ctx.backend().commands(), model_location)
        .iter()
        .map(|bytes| bytemuck::pod_read_unaligned::<Mat4>(bytes).w_axis.z)
        .collect();
    assert_eq!(depths, vec![-10.0, -5.0]);
}

#[test]
fn test_opaque_objects_draw_before_transparent_ones() {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let mut glass = basic_material();
    glass.set_transparent(true);
    glass.set_color("u_color", Color::RED);
    let mut solid = basic_material();
    solid.set_color("u_color", Color::GREEN);
    let color_location = solid.shader().find_property("u_color").unwrap().location;
    let mesh = Mesh::cube();
    let mut camera = Camera::new();

    queue_at(&mut camera, &mesh, &glass, Vec3::Z);
    queue_at(&mut camera, &mesh, &solid, Vec3::X);
    camera.render_to_screen(&mut ctx).unwrap();

    let reds: Vec<f32> = uniform_writes(ctx.backend().commands(), color_location)
        .iter()
        .map(|bytes| color_of(bytes)[0])
        .collect();
    assert_eq!(reds, vec![0.0, 1.0]);
}

#[test]
fn test_untested_objects_keep_submission_order() {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let mut red = instanced_material();
    red.set_depth_tested(false);
    red.set_color("u_color", Color::RED);
    let mut green = instanced_material();
    green.set_depth_tested(false);
    green.set_color("u_color", Color::GREEN);
    let color_location = red.shader().find_property("u_color").unwrap().location;
    let mesh = Mesh::cube();
    let mut camera = Camera::new();

    queue_at(&mut camera, &mesh, &red, Vec3::ZERO);
    queue_at(&mut camera, &mesh, &green, Vec3::ZERO);
    queue_at(&mut camera, &mesh, &red, Vec3::ZERO);
    queue_at(&mut camera, &mesh, &red, Vec3::X);
    camera.render_to_screen(&mut ctx).unwrap();

    // neighbours sharing every key coalesce into one instanced draw
    assert_eq!(draws(ctx.backend().commands()), vec![1, 1, 2]);
    let reds: Vec<f32> = uniform_writes(ctx.backend().commands(), color_location)
        .iter()
        .map(|bytes| color_of(bytes)[0])
        .collect();
    assert_eq!(reds, vec![1.0, 0.0, 1.0]);
}

#[test]
fn test_property_blocks_override_and_restore_material_values() {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let mut material = instanced_material();
    material.set_color("u_color", Color::RED);
    let color_location = material.shader().find_property("u_color").unwrap().location;
    let mut block = MaterialPropertyBlock::new();
    block.set_color("u_color", Color::BLUE);
    let mesh = Mesh::cube();
    let mut camera = Camera::new();

    draw(&mesh, Mat4::IDENTITY, &material, &mut camera, Some(&block), None).unwrap();
    draw(&mesh, Mat4::IDENTITY, &material, &mut camera, None, None).unwrap();
    camera.render_to_screen(&mut ctx).unwrap();

    let colors: Vec<[f32; 4]> = uniform_writes(ctx.backend().commands(), color_location)
        .iter()
        .map(|bytes| color_of(bytes))
        .collect();
    assert_eq!(colors.last(), Some(&[1.0, 0.0, 0.0, 1.0]));
    assert!(colors.contains(&[0.0, 0.0, 1.0, 1.0]));
    assert_eq!(draws(ctx.backend().commands()), vec![1, 1]);
}

#[test]
fn test_empty_queue_only_clears() {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let mut camera = Camera::new();
    camera.set_background_color(Color::BLUE);
    let screenshot = ctx.request_screenshot();

    camera.render_to_screen(&mut ctx).unwrap();
    ctx.swap_buffers().unwrap();

    assert!(draws(ctx.backend().commands()).is_empty());
    let image = screenshot.try_take().unwrap();
    assert_eq!(&image.pixel_data()[..4], &[0, 0, 255, 255]);
    assert_eq!(ctx.frame(), 1);
}
