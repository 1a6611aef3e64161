//! Placement indicator tracking.
//!
//! `NoSurface` until the first hit; `Tracking` forever after. A frame with
//! hits overwrites the pose with the first hit. A frame without hits keeps
//! the last-known pose, however old; `frames_since_hit` reports how old.

use crate::host::HitTestResult;
use crate::pose::Pose;
use crate::scene::{ModelRef, ObjectId, Scene};
use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    NoSurface,
    Tracking,
}

#[derive(Debug, Clone)]
pub struct PlacementTracker {
    state: TrackerState,
    pose: Pose,
    updates: u64,
    commits: u64,
    frames_since_hit: u64,
}

impl Default for PlacementTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementTracker {
    pub fn new() -> Self {
        Self {
            state: TrackerState::NoSurface,
            pose: Pose::IDENTITY,
            updates: 0,
            commits: 0,
            frames_since_hit: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Last-known pose, or `None` before the first hit.
    #[inline]
    pub fn current_pose(&self) -> Option<Pose> {
        match self.state {
            TrackerState::NoSurface => None,
            TrackerState::Tracking => Some(self.pose),
        }
    }

    /// Frames processed since the pose was last overwritten.
    #[inline]
    pub fn frames_since_hit(&self) -> u64 {
        self.frames_since_hit
    }

    #[inline]
    pub fn update_count(&self) -> u64 {
        self.updates
    }

    #[inline]
    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    /// Per-frame step. Returns `true` when the pose was overwritten.
    pub fn update(&mut self, hits: &[HitTestResult]) -> bool {
        let Some(first) = hits.first() else {
            self.frames_since_hit = self.frames_since_hit.saturating_add(1);
            return false;
        };

        if self.state == TrackerState::NoSurface {
            log::debug!(
                "Surface acquired at ({:.3}, {:.3}, {:.3})",
                first.pose.position.x,
                first.pose.position.y,
                first.pose.position.z
            );
        }

        self.pose = Pose::new(first.pose.position, first.pose.orientation);
        self.state = TrackerState::Tracking;
        self.updates += 1;
        self.frames_since_hit = 0;
        true
    }

    /// Copies the current pose into a new placed object. No-op before the
    /// first hit.
    pub fn commit(&mut self, scene: &mut Scene, model: ModelRef, scale: Vec3) -> Option<ObjectId> {
        let Some(pose) = self.current_pose() else {
            log::debug!("Select ignored: no surface has been hit yet");
            return None;
        };

        if self.frames_since_hit > 0 {
            log::debug!(
                "Placing at a pose last refreshed {} frame(s) ago",
                self.frames_since_hit
            );
        }

        let id = scene.spawn_placed(model, &pose, scale);
        self.commits += 1;
        log::debug!("Placed object {} ({} total)", id, self.commits);
        Some(id)
    }

    /// Pushes the tracker pose onto the scene's indicator.
    pub(crate) fn sync_indicator(&self, scene: &mut Scene) {
        if let Some(pose) = self.current_pose() {
            scene.place_indicator(&pose);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn hit(x: f32, z: f32) -> HitTestResult {
        HitTestResult {
            pose: Pose::new(Vec3::new(x, 0.0, z), Quat::from_rotation_y(x)),
        }
    }

    fn scene() -> Scene {
        Scene::new(ModelRef::new("reticle"), Vec3::ONE)
    }

    #[test]
    fn first_hit_starts_tracking() {
        let mut t = PlacementTracker::new();
        assert_eq!(t.state(), TrackerState::NoSurface);
        assert!(t.current_pose().is_none());

        assert!(t.update(&[hit(1.0, -2.0)]));
        assert_eq!(t.state(), TrackerState::Tracking);
        assert_eq!(t.update_count(), 1);
        assert_eq!(t.current_pose().map(|p| p.position), Some(Vec3::new(1.0, 0.0, -2.0)));
    }

    #[test]
    fn first_result_is_authoritative() {
        let mut t = PlacementTracker::new();
        t.update(&[hit(0.5, -1.0), hit(9.0, 9.0)]);
        assert_eq!(t.current_pose().map(|p| p.position.x), Some(0.5));
        assert_eq!(t.update_count(), 1);
    }

    #[test]
    fn empty_frame_preserves_last_pose() {
        let mut t = PlacementTracker::new();
        t.update(&[hit(1.0, -2.0)]);
        let before = t.current_pose();

        assert!(!t.update(&[]));
        assert!(!t.update(&[]));
        assert_eq!(t.current_pose(), before);
        assert_eq!(t.frames_since_hit(), 2);
        assert_eq!(t.state(), TrackerState::Tracking);
    }

    #[test]
    fn commit_before_any_hit_is_a_no_op() {
        let mut t = PlacementTracker::new();
        let mut s = scene();
        assert_eq!(t.commit(&mut s, ModelRef::new("box"), Vec3::ONE), None);
        assert_eq!(s.placed_count(), 0);
        assert_eq!(t.commit_count(), 0);
    }

    #[test]
    fn repeated_commits_copy_the_same_pose() {
        let mut t = PlacementTracker::new();
        let mut s = scene();
        t.update(&[hit(2.0, -3.0)]);
        t.sync_indicator(&mut s);
        let indicator_before = *s.indicator().transform();

        let a = t.commit(&mut s, ModelRef::new("box"), Vec3::ONE);
        let b = t.commit(&mut s, ModelRef::new("box"), Vec3::ONE);
        let (a, b) = (a.expect("first commit"), b.expect("second commit"));

        assert_ne!(a, b);
        let pa = s.get(a).map(|o| o.transform().pose());
        let pb = s.get(b).map(|o| o.transform().pose());
        assert_eq!(pa, pb);
        assert_eq!(pa, t.current_pose());
        assert_eq!(*s.indicator().transform(), indicator_before);
        assert_eq!(t.state(), TrackerState::Tracking);
    }

    #[test]
    fn sync_shows_indicator_only_once_tracking() {
        let mut t = PlacementTracker::new();
        let mut s = scene();
        t.sync_indicator(&mut s);
        assert!(!s.indicator().visible());

        t.update(&[hit(0.0, -1.0)]);
        t.sync_indicator(&mut s);
        assert!(s.indicator().visible());
        assert_eq!(s.indicator().transform().position, Vec3::new(0.0, 0.0, -1.0));
    }
}
