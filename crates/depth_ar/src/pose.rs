//! Rigid poses and per-view camera state.

use glam::{Mat4, Quat, Vec3};

/// Position + orientation in a reference space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    /// Unit quaternion.
    pub orientation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation: orientation.normalize(),
        }
    }

    /// Decomposes a rigid transform. Any scale in `m` is discarded.
    pub fn from_matrix(m: &Mat4) -> Self {
        let (_scale, rotation, translation) = m.to_scale_rotation_translation();
        Self::new(translation, rotation)
    }

    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position)
    }

    /// The inverse rigid transform as a matrix.
    #[inline]
    pub fn inverse_matrix(&self) -> Mat4 {
        let inv_rot = self.orientation.conjugate();
        Mat4::from_rotation_translation(inv_rot, inv_rot * -self.position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn resolution(&self) -> glam::Vec2 {
        glam::Vec2::new(self.width as f32, self.height as f32)
    }
}

/// One view as reported by the host: projection, camera transform
/// (view-to-world), and the viewport it renders into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    pub projection: Mat4,
    pub transform: Pose,
    pub viewport: Viewport,
}

/// Camera state consumed by the compositor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub projection: Mat4,
    /// Inverse of the view-to-world transform; puts the viewer at the origin.
    pub view: Mat4,
    pub viewport: Viewport,
}

impl ViewState {
    pub fn from_view(view: &View) -> Self {
        Self {
            projection: view.projection,
            view: view.transform.inverse_matrix(),
            viewport: view.viewport,
        }
    }
}

/// The viewer's pose for one frame plus the views rendered from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerPose {
    pub transform: Pose,
    pub views: Vec<View>,
}
