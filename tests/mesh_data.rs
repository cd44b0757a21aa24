//! Mesh uploads and sub-mesh draws as seen by the backend.

mod common;

use glam::{Mat4, Vec3};
use rstest::rstest;
use scene_renderer::backend::Command;
use scene_renderer::{
    draw, Camera, Mesh, MeshTopology, MeshUpdateFlags, RenderError, RendererConfig,
    SubMeshDescriptor,
};

use common::{basic_material, lock, recording_context};

fn buffer_creations(commands: &[Command]) -> usize {
    commands
        .iter()
        .filter(|c| matches!(c, Command::CreateBuffer { .. }))
        .count()
}

fn indexed_ranges(commands: &[Command]) -> Vec<std::ops::Range<u32>> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::DrawIndexed { indices, .. } => Some(indices.clone()),
            _ => None,
        })
        .collect()
}

#[rstest]
#[case::unchanged(false, 2)]
#[case::edited(true, 4)]
fn test_meshes_upload_again_only_after_edits(#[case] edit: bool, #[case] buffers: usize) {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let material = basic_material();
    let mut mesh = Mesh::cube();
    let mut camera = Camera::new();

    draw(&mesh, Mat4::IDENTITY, &material, &mut camera, None, None).unwrap();
    camera.render_to_screen(&mut ctx).unwrap();
    ctx.swap_buffers().unwrap();

    if edit {
        mesh.transform_vertices(|v| v * 2.0);
    }
    draw(&mesh, Mat4::IDENTITY, &material, &mut camera, None, None).unwrap();
    camera.render_to_screen(&mut ctx).unwrap();

    assert_eq!(buffer_creations(ctx.backend().commands()), buffers);
}

#[test]
fn test_wide_indices_upload_as_u32() {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let material = basic_material();
    let mut mesh = Mesh::new();
    let positions: Vec<Vec3> = (0..70_001).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect();
    mesh.set_vertices(&positions).unwrap();
    mesh.set_indices(&[0u32, 70_000, 1], MeshUpdateFlags::empty())
        .unwrap();
    assert!(mesh.indices().is_u32());

    let mut camera = Camera::new();
    draw(&mesh, Mat4::IDENTITY, &material, &mut camera, None, None).unwrap();
    camera.render_to_screen(&mut ctx).unwrap();

    let index_writes: Vec<usize> = ctx
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::WriteBuffer { len, .. } if *len == 12 => Some(*len),
            _ => None,
        })
        .collect();
    assert_eq!(index_writes, vec![12]);
    assert_eq!(indexed_ranges(ctx.backend().commands()), vec![0..3]);
}

#[rstest]
#[case::whole_mesh(None, vec![0..36])]
#[case::second_face(Some(0), vec![6..12])]
#[case::back_half(Some(1), vec![18..36])]
fn test_sub_mesh_draws_its_index_range(
    #[case] sub_mesh: Option<usize>,
    #[case] expected: Vec<std::ops::Range<u32>>,
) {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let material = basic_material();
    let mut mesh = Mesh::cube();
    mesh.push_sub_mesh_descriptor(SubMeshDescriptor::new(6, 6, MeshTopology::Triangles));
    mesh.push_sub_mesh_descriptor(SubMeshDescriptor::new(18, 18, MeshTopology::Triangles));
    let mut camera = Camera::new();

    draw(&mesh, Mat4::IDENTITY, &material, &mut camera, None, sub_mesh).unwrap();
    camera.render_to_screen(&mut ctx).unwrap();

    assert_eq!(indexed_ranges(ctx.backend().commands()), expected);
}

#[test]
fn test_unknown_sub_mesh_is_rejected_at_submission() {
    let material = basic_material();
    let mesh = Mesh::cube();
    let mut camera = Camera::new();

    let result = draw(&mesh, Mat4::IDENTITY, &material, &mut camera, None, Some(0));
    assert!(matches!(
        result,
        Err(RenderError::SubMeshOutOfRange { index: 0, count: 0 })
    ));
}

#[test]
fn test_sub_mesh_past_the_indices_is_skipped() {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let material = basic_material();
    let mut mesh = Mesh::cube();
    mesh.push_sub_mesh_descriptor(SubMeshDescriptor::new(30, 12, MeshTopology::Triangles));
    let mut camera = Camera::new();

    draw(&mesh, Mat4::IDENTITY, &material, &mut camera, None, Some(0)).unwrap();
    draw(&mesh, Mat4::IDENTITY, &material, &mut camera, None, None).unwrap();
    camera.render_to_screen(&mut ctx).unwrap();

    assert_eq!(indexed_ranges(ctx.backend().commands()), vec![0..36]);
}

#[test]
fn test_meshes_without_indices_draw_nothing() {
    let _guard = lock();
    let mut ctx = recording_context(RendererConfig::default());
    let material = basic_material();
    let mut mesh = Mesh::new();
    mesh.set_vertices(&[Vec3::ZERO, Vec3::X, Vec3::Y]).unwrap();
    let mut camera = Camera::new();

    draw(&mesh, Mat4::IDENTITY, &material, &mut camera, None, None).unwrap();
    camera.render_to_screen(&mut ctx).unwrap();

    assert!(indexed_ranges(ctx.backend().commands()).is_empty());
}
