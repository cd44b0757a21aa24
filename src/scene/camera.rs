//! Camera system

use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3};

use crate::backend::GraphicsBackend;
use crate::color::Color;
use crate::error::RenderError;
use crate::geometry::Rect;
use crate::render_target::{RenderBufferLoadAction, RenderTarget};
use crate::renderer::GraphicsContext;
use crate::texture::RenderTexture;

use super::RenderObject;

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraProjection {
    Perspective {
        /// Vertical field of view in radians
        fov_y: f32,
    },
    Orthographic {
        /// Height of the view volume in world units
        height: f32,
    },
}

impl Default for CameraProjection {
    fn default() -> Self {
        CameraProjection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_2,
        }
    }
}

bitflags! {
    /// Which buffers a camera clears at the start of a render pass
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CameraClearFlags: u32 {
        const SOLID_COLOR = 1 << 0;
        const DEPTH = 1 << 1;
    }
}

impl CameraClearFlags {
    pub const NOTHING: Self = Self::empty();
    pub const ALL: Self = Self::SOLID_COLOR.union(Self::DEPTH);
}

impl Default for CameraClearFlags {
    fn default() -> Self {
        Self::ALL
    }
}

/// Matrices a camera hands to shaders for one pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CameraUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub position: Vec3,
}

/// Camera for viewing the scene.
///
/// Draw calls queue [`RenderObject`]s on the camera. Rendering the camera flushes the queue
/// and leaves it empty.
#[derive(Debug, Clone)]
pub struct Camera {
    background_color: Color,
    projection: CameraProjection,
    near: f32,
    far: f32,
    clear_flags: CameraClearFlags,
    pixel_rect: Option<Rect>,
    scissor_rect: Option<Rect>,
    position: Vec3,
    rotation: Quat,
    view_matrix_override: Option<Mat4>,
    projection_matrix_override: Option<Mat4>,
    queue: Vec<RenderObject>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            background_color: Color::CLEAR,
            projection: CameraProjection::default(),
            near: 0.1,
            far: 1000.0,
            clear_flags: CameraClearFlags::default(),
            pixel_rect: None,
            scissor_rect: None,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            view_matrix_override: None,
            projection_matrix_override: None,
            queue: Vec::new(),
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore every parameter to its default and drop queued draws.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn background_color(&self) -> Color {
        self.background_color
    }

    pub fn set_background_color(&mut self, color: Color) {
        self.background_color = color;
    }

    pub fn projection(&self) -> CameraProjection {
        self.projection
    }

    pub fn set_projection(&mut self, projection: CameraProjection) {
        self.projection = projection;
    }

    pub fn near_clipping_plane(&self) -> f32 {
        self.near
    }

    pub fn set_near_clipping_plane(&mut self, near: f32) {
        self.near = near;
    }

    pub fn far_clipping_plane(&self) -> f32 {
        self.far
    }

    pub fn set_far_clipping_plane(&mut self, far: f32) {
        self.far = far;
    }

    pub fn clear_flags(&self) -> CameraClearFlags {
        self.clear_flags
    }

    pub fn set_clear_flags(&mut self, flags: CameraClearFlags) {
        self.clear_flags = flags;
    }

    /// Output region in pixels, origin top-left. `None` renders to the whole output.
    pub fn pixel_rect(&self) -> Option<Rect> {
        self.pixel_rect
    }

    pub fn set_pixel_rect(&mut self, rect: Option<Rect>) {
        self.pixel_rect = rect;
    }

    pub fn scissor_rect(&self) -> Option<Rect> {
        self.scissor_rect
    }

    pub fn set_scissor_rect(&mut self, rect: Option<Rect>) {
        self.scissor_rect = rect;
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
    }

    /// Get the forward direction (local -Z in world space)
    pub fn direction(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Rotate so that the camera looks along `direction`. Zero vectors are ignored.
    pub fn set_direction(&mut self, direction: Vec3) {
        let Some(direction) = direction.try_normalize() else {
            return;
        };
        self.rotation = Quat::from_rotation_arc(-Vec3::Z, direction);
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.set_direction(target - self.position);
    }

    pub fn set_view_matrix_override(&mut self, view: Option<Mat4>) {
        self.view_matrix_override = view;
    }

    pub fn set_projection_matrix_override(&mut self, projection: Option<Mat4>) {
        self.projection_matrix_override = projection;
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        self.view_matrix_override.unwrap_or_else(|| {
            Mat4::look_to_rh(self.position, self.direction(), self.rotation * Vec3::Y)
        })
    }

    /// Get the projection matrix for an output of the given aspect ratio
    pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        if let Some(projection) = self.projection_matrix_override {
            return projection;
        }
        match self.projection {
            CameraProjection::Perspective { fov_y } => {
                Mat4::perspective_rh(fov_y, aspect_ratio, self.near, self.far)
            }
            CameraProjection::Orthographic { height } => {
                let half_h = 0.5 * height;
                let half_w = half_h * aspect_ratio;
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, self.near, self.far)
            }
        }
    }

    /// Get combined view-projection matrix
    pub fn view_projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        self.projection_matrix(aspect_ratio) * self.view_matrix()
    }

    /// Number of queued draws
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue(&self) -> &[RenderObject] {
        &self.queue
    }

    /// Drop queued draws without rendering them
    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    /// Render queued draws to the window surface.
    pub fn render_to_screen<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
    ) -> Result<(), RenderError> {
        let queue = std::mem::take(&mut self.queue);
        ctx.render_camera_to_screen(self, &queue)
    }

    /// Render queued draws into `target`, using the attachments' own load actions.
    pub fn render_to<B: GraphicsBackend>(
        &mut self,
        target: &RenderTarget,
        ctx: &mut GraphicsContext<B>,
    ) -> Result<(), RenderError> {
        let queue = std::mem::take(&mut self.queue);
        ctx.render_camera_to_target(self, &queue, target)
    }

    /// Render queued draws into `texture`, clearing according to the clear flags.
    pub fn render_to_texture<B: GraphicsBackend>(
        &mut self,
        texture: &RenderTexture,
        ctx: &mut GraphicsContext<B>,
    ) -> Result<(), RenderError> {
        let target = RenderTarget::from_render_texture(texture, self.background_color)
            .with_load_actions(
                Some(self.color_load_action()),
                Some(self.depth_load_action()),
            );
        self.render_to(&target, ctx)
    }

    pub(crate) fn push(&mut self, object: RenderObject) {
        self.queue.push(object);
    }

    pub(crate) fn color_load_action(&self) -> RenderBufferLoadAction {
        if self.clear_flags.contains(CameraClearFlags::SOLID_COLOR) {
            RenderBufferLoadAction::Clear
        } else {
            RenderBufferLoadAction::Load
        }
    }

    pub(crate) fn depth_load_action(&self) -> RenderBufferLoadAction {
        if self.clear_flags.contains(CameraClearFlags::DEPTH) {
            RenderBufferLoadAction::Clear
        } else {
            RenderBufferLoadAction::Load
        }
    }

    pub(crate) fn uniforms(&self, aspect_ratio: f32) -> CameraUniforms {
        let view = self.view_matrix();
        let projection = self.projection_matrix(aspect_ratio);
        CameraUniforms {
            view,
            projection,
            view_projection: projection * view,
            position: self.position,
        }
    }

    /// Matrices looking out of cube face `face` (GPU layer order) from the camera position
    pub(crate) fn cube_face_uniforms(&self, face: u32) -> CameraUniforms {
        let (direction, up) = match face {
            0 => (Vec3::X, -Vec3::Y),
            1 => (-Vec3::X, -Vec3::Y),
            2 => (Vec3::Y, Vec3::Z),
            3 => (-Vec3::Y, -Vec3::Z),
            4 => (Vec3::Z, -Vec3::Y),
            _ => (-Vec3::Z, -Vec3::Y),
        };
        let view = Mat4::look_to_rh(self.position, direction, up);
        let projection =
            Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, self.near, self.far);
        CameraUniforms {
            view,
            projection,
            view_projection: projection * view,
            position: self.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_looks_down_negative_z() {
        let camera = Camera::new();
        assert_eq!(camera.direction(), -Vec3::Z);
        assert_eq!(camera.clear_flags(), CameraClearFlags::ALL);
        assert_eq!(camera.view_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_set_direction() {
        let mut camera = Camera::new();
        camera.set_direction(Vec3::new(2.0, 0.0, 0.0));
        assert!(camera.direction().abs_diff_eq(Vec3::X, 1e-6));

        camera.set_direction(Vec3::ZERO);
        assert!(camera.direction().abs_diff_eq(Vec3::X, 1e-6));
    }

    #[test]
    fn test_overrides_win() {
        let mut camera = Camera::new();
        let proj = Mat4::from_scale(Vec3::splat(2.0));
        camera.set_projection_matrix_override(Some(proj));
        assert_eq!(camera.projection_matrix(1.5), proj);

        camera.set_view_matrix_override(Some(Mat4::from_translation(Vec3::X)));
        camera.set_position(Vec3::new(0.0, 0.0, 10.0));
        assert_eq!(camera.view_matrix(), Mat4::from_translation(Vec3::X));
    }

    #[test]
    fn test_reset_clears_queue_and_parameters() {
        let mut camera = Camera::new();
        camera.set_background_color(Color::RED);
        camera.set_clear_flags(CameraClearFlags::NOTHING);
        camera.reset();
        assert_eq!(camera.background_color(), Color::CLEAR);
        assert_eq!(camera.clear_flags(), CameraClearFlags::ALL);
        assert_eq!(camera.queue_len(), 0);
    }

    #[test]
    fn test_cube_faces_look_along_axes() {
        let camera = Camera::new();
        let forward = |face| {
            let u = camera.cube_face_uniforms(face);
            // third row of the view rotation is -forward
            -Vec3::new(u.view.x_axis.z, u.view.y_axis.z, u.view.z_axis.z)
        };
        assert!(forward(0).abs_diff_eq(Vec3::X, 1e-6));
        assert!(forward(3).abs_diff_eq(-Vec3::Y, 1e-6));
        assert!(forward(5).abs_diff_eq(-Vec3::Z, 1e-6));
    }
}
