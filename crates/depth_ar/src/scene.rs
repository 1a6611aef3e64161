//! Minimal scene: the placement indicator plus every object placed from it.

use crate::pose::Pose;
use glam::{Mat4, Quat, Vec3};
use std::fmt;
use std::sync::Arc;

/// Stored transform components; the model matrix is always derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_pose(pose: &Pose, scale: Vec3) -> Self {
        Self {
            position: pose.position,
            rotation: pose.orientation,
            scale,
        }
    }

    #[inline]
    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            orientation: self.rotation,
        }
    }

    #[inline]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Inverse model matrix; zero scale components yield a non-invertible
    /// matrix, so they are clamped to a tiny epsilon first.
    pub fn inverse_matrix(&self) -> Mat4 {
        let safe = Vec3::new(
            nonzero(self.scale.x),
            nonzero(self.scale.y),
            nonzero(self.scale.z),
        );
        Mat4::from_scale_rotation_translation(safe, self.rotation, self.position).inverse()
    }
}

#[inline]
fn nonzero(v: f32) -> f32 {
    if v.abs() < f32::EPSILON {
        f32::EPSILON.copysign(v)
    } else {
        v
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque handle to a model the renderer knows how to draw (mesh + texture).
/// Loading is the renderer's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRef(Arc<str>);

impl ModelRef {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRole {
    /// Follows the surface hit; overwritten every frame that has a hit.
    Indicator,
    /// Spawned on select; immutable afterwards.
    Placed,
}

#[derive(Debug, Clone)]
pub struct SceneObject {
    id: ObjectId,
    role: ObjectRole,
    model: ModelRef,
    transform: Transform,
    visible: bool,
}

impl SceneObject {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn role(&self) -> ObjectRole {
        self.role
    }

    #[inline]
    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    #[inline]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    #[inline]
    pub fn visible(&self) -> bool {
        self.visible
    }

    #[inline]
    pub fn model_matrix(&self) -> Mat4 {
        self.transform.matrix()
    }
}

#[derive(Debug, Clone)]
pub struct Scene {
    objects: Vec<SceneObject>,
    next_id: u32,
}

impl Scene {
    /// Creates a scene holding only the (hidden) placement indicator.
    pub fn new(indicator_model: ModelRef, indicator_scale: Vec3) -> Self {
        let indicator = SceneObject {
            id: ObjectId(0),
            role: ObjectRole::Indicator,
            model: indicator_model,
            transform: Transform {
                scale: indicator_scale,
                ..Transform::default()
            },
            visible: false,
        };
        Self {
            objects: vec![indicator],
            next_id: 1,
        }
    }

    pub fn indicator(&self) -> &SceneObject {
        &self.objects[0]
    }

    /// Objects in insertion order; the indicator comes first.
    pub fn objects(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter()
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn placed_count(&self) -> usize {
        self.objects.len() - 1
    }

    /// Overwrites the indicator pose and shows it. Only the per-frame
    /// update step calls this.
    pub(crate) fn place_indicator(&mut self, pose: &Pose) {
        let indicator = &mut self.objects[0];
        indicator.transform.position = pose.position;
        indicator.transform.rotation = pose.orientation;
        indicator.visible = true;
    }

    pub(crate) fn spawn_placed(&mut self, model: ModelRef, pose: &Pose, scale: Vec3) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.push(SceneObject {
            id,
            role: ObjectRole::Placed,
            model,
            transform: Transform::from_pose(pose, scale),
            visible: true,
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> Scene {
        Scene::new(ModelRef::new("reticle"), Vec3::splat(0.5))
    }

    #[test]
    fn starts_with_hidden_indicator() {
        let s = scene();
        assert_eq!(s.len(), 1);
        assert_eq!(s.placed_count(), 0);
        assert_eq!(s.indicator().role(), ObjectRole::Indicator);
        assert!(!s.indicator().visible());
    }

    #[test]
    fn placed_objects_keep_insertion_order() {
        let mut s = scene();
        let pose = Pose::new(Vec3::new(1.0, 0.0, -1.0), Quat::IDENTITY);
        let a = s.spawn_placed(ModelRef::new("a"), &pose, Vec3::ONE);
        let b = s.spawn_placed(ModelRef::new("b"), &pose, Vec3::ONE);
        let ids: Vec<_> = s.objects().map(|o| o.id()).collect();
        assert_eq!(ids, vec![ObjectId(0), a, b]);
        assert_ne!(a, b);
    }

    #[test]
    fn model_matrix_is_derived_from_components() {
        let t = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(0.3),
            scale: Vec3::splat(2.0),
        };
        let p = t.matrix().transform_point3(Vec3::ZERO);
        assert!((p - t.position).length() < 1e-6);
        assert!((t.inverse_matrix() * t.matrix()).abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn moving_indicator_leaves_placed_objects_alone() {
        let mut s = scene();
        let first = Pose::new(Vec3::X, Quat::IDENTITY);
        let id = s.spawn_placed(ModelRef::new("box"), &first, Vec3::ONE);
        s.place_indicator(&Pose::new(Vec3::Z, Quat::IDENTITY));
        let placed = s.get(id).map(|o| o.transform().position);
        assert_eq!(placed, Some(Vec3::X));
        assert!(s.indicator().visible());
    }
}
