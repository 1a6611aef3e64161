//! Simulated AR platform.
//!
//! Stands in for a phone runtime: the "world" is an axis-aligned room with
//! a pillar in it. Depth snapshots are ray-cast from the current camera,
//! hit-tests intersect the viewer's forward ray with the floor.

use crate::camera::Camera;
use depth_ar::depth::encode_packed;
use depth_ar::host::{DepthDataFormat, DepthUsage};
use depth_ar::{
    DepthFrame, Feature, GrantedSession, HitTestResult, HostFrame, HostPlatform, Pose,
    SessionError, SessionRequest, View, ViewerPose, Viewport,
};
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use rayon::prelude::*;

/// Features this simulator can provide.
const SUPPORTED: [Feature; 3] = [
    Feature::UnboundedTracking,
    Feature::HitTest,
    Feature::DepthSensing,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Entry distance of a ray hitting the box from outside.
    pub fn ray_enter(&self, origin: Vec3, dir: Vec3) -> Option<f32> {
        let inv = dir.recip();
        let t0 = (self.min - origin) * inv;
        let t1 = (self.max - origin) * inv;
        let t_near = t0.min(t1).max_element();
        let t_far = t0.max(t1).min_element();
        (t_near <= t_far && t_near > 0.0).then_some(t_near)
    }

    /// Exit distance of a ray starting inside the box.
    pub fn ray_exit(&self, origin: Vec3, dir: Vec3) -> Option<f32> {
        let inv = dir.recip();
        let t0 = (self.min - origin) * inv;
        let t1 = (self.max - origin) * inv;
        let t_far = t0.max(t1).min_element();
        (t_far.is_finite() && t_far > 0.0).then_some(t_far)
    }
}

/// Floor at y = 0, centered on the origin, one pillar in front of the start
/// position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Room {
    pub bounds: Aabb,
    pub pillar: Aabb,
}

impl Room {
    pub fn new(width: f32, length: f32, height: f32) -> Self {
        let hx = 0.5 * width.max(1.0);
        let hz = 0.5 * length.max(1.0);
        let h = height.max(1.0);
        Self {
            bounds: Aabb {
                min: Vec3::new(-hx, 0.0, -hz),
                max: Vec3::new(hx, h, hz),
            },
            pillar: Aabb {
                min: Vec3::new(-0.25, 0.0, -1.25),
                max: Vec3::new(0.25, h, -0.75),
            },
        }
    }

    /// Distance along `dir` to the first surface.
    pub fn cast(&self, origin: Vec3, dir: Vec3) -> Option<f32> {
        let wall = self.bounds.ray_exit(origin, dir);
        let pillar = self.pillar.ray_enter(origin, dir);
        match (wall, pillar) {
            (Some(w), Some(p)) => Some(w.min(p)),
            (w, p) => w.or(p),
        }
    }

    /// Forward ray against the floor, outside the pillar footprint.
    pub fn floor_hit(&self, origin: Vec3, dir: Vec3) -> Option<Vec3> {
        if dir.y >= -1e-4 || origin.y <= 0.0 {
            return None;
        }
        let t = -origin.y / dir.y;
        let p = origin + dir * t;
        let inside = p.x > self.bounds.min.x
            && p.x < self.bounds.max.x
            && p.z > self.bounds.min.z
            && p.z < self.bounds.max.z;
        let under_pillar = p.x > self.pillar.min.x
            && p.x < self.pillar.max.x
            && p.z > self.pillar.min.z
            && p.z < self.pillar.max.z;
        if !inside || under_pillar {
            return None;
        }
        // Occluded by the pillar before reaching the floor.
        if self.pillar.ray_enter(origin, dir).is_some_and(|tp| tp < t) {
            return None;
        }
        Some(p)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimSettings {
    pub room: Room,
    pub depth_width: u32,
    pub depth_height: u32,
    pub raw_value_to_meters: f32,
    pub max_range_m: f32,
    /// Deliver a portrait buffer under a landscape view.
    pub rotate_depth: bool,
}

/// `normDepthBufferFromNormView` for the simulated sensor.
pub fn depth_uv_transform(rotate: bool) -> Mat4 {
    if rotate {
        // (u, v) -> (1 - v, u)
        Mat4::from_cols(
            Vec4::new(0.0, 1.0, 0.0, 0.0),
            Vec4::new(-1.0, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0, 0.0),
            Vec4::new(1.0, 0.0, 0.0, 1.0),
        )
    } else {
        Mat4::IDENTITY
    }
}

/// Ray-casts one depth snapshot from `camera`. Each texel holds the
/// view-space z distance of the first surface, or 0 beyond sensor range.
pub fn synthesize_depth(settings: &SimSettings, camera: &Camera) -> DepthFrame {
    let (w, h) = if settings.rotate_depth {
        (settings.depth_height, settings.depth_width)
    } else {
        (settings.depth_width, settings.depth_height)
    };
    let uv_transform = depth_uv_transform(settings.rotate_depth);
    let view_from_depth = uv_transform.inverse();
    let orientation = camera.orientation();
    let origin = camera.position;

    let mut raw = vec![0u8; w as usize * h as usize * 2];
    raw.par_chunks_mut(w as usize * 2)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, texel) in row.chunks_exact_mut(2).enumerate() {
                let depth_uv = Vec2::new(
                    (x as f32 + 0.5) / w as f32,
                    (y as f32 + 0.5) / h as f32,
                );
                let view_uv = depth_ar::coords::view_uv_to_depth_uv(depth_uv, &view_from_depth);
                let ray = camera.view_ray(2.0 * view_uv.x - 1.0, 1.0 - 2.0 * view_uv.y);
                let meters = settings
                    .room
                    .cast(origin, orientation * ray)
                    .filter(|m| *m <= settings.max_range_m)
                    .unwrap_or(0.0);
                texel.copy_from_slice(&encode_packed(meters, settings.raw_value_to_meters));
            }
        });

    DepthFrame::new(w, h, raw, settings.raw_value_to_meters, uv_transform)
}

/// One animation-frame callback's worth of host data.
pub struct SimFrame {
    pose: Option<ViewerPose>,
    depth: Option<DepthFrame>,
    hits: Vec<HitTestResult>,
}

impl HostFrame for SimFrame {
    fn viewer_pose(&self) -> Option<ViewerPose> {
        self.pose.clone()
    }

    fn depth_info(&self, _view: &View) -> Option<DepthFrame> {
        self.depth.clone()
    }

    fn hit_test_results(&self) -> Vec<HitTestResult> {
        self.hits.clone()
    }
}

pub struct SimHost {
    settings: SimSettings,
    session_active: bool,
    frame_pending: bool,
    depth_enabled: bool,
    hit_source: bool,
    /// When set, frames arrive without a viewer pose.
    pub tracking_lost: bool,
    frames_served: u64,
}

impl SimHost {
    pub fn new(settings: SimSettings) -> Self {
        Self {
            settings,
            session_active: false,
            frame_pending: false,
            depth_enabled: false,
            hit_source: false,
            tracking_lost: false,
            frames_served: 0,
        }
    }

    #[inline]
    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    #[inline]
    pub fn frames_served(&self) -> u64 {
        self.frames_served
    }

    /// Delivers the pending frame callback, if one was requested.
    pub fn take_frame(&mut self, camera: &Camera, viewport: Viewport) -> Option<SimFrame> {
        if !self.session_active || !self.frame_pending {
            return None;
        }
        self.frame_pending = false;
        self.frames_served += 1;

        if self.tracking_lost {
            return Some(SimFrame {
                pose: None,
                depth: None,
                hits: Vec::new(),
            });
        }

        let depth = self
            .depth_enabled
            .then(|| synthesize_depth(&self.settings, camera));
        let hits = if self.hit_source {
            self.settings
                .room
                .floor_hit(camera.position, camera.forward())
                .map(|p| {
                    // Reticle faces the viewer.
                    let yaw = Quat::from_rotation_y(camera.yaw_rad);
                    vec![HitTestResult {
                        pose: Pose::new(p, yaw),
                    }]
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Some(SimFrame {
            pose: Some(camera.viewer_pose(viewport)),
            depth,
            hits,
        })
    }
}

impl HostPlatform for SimHost {
    fn is_session_supported(&self) -> bool {
        true
    }

    fn request_session(&mut self, request: &SessionRequest) -> Result<GrantedSession, SessionError> {
        if self.session_active {
            return Err(SessionError::Refused("a session is already running".into()));
        }
        let features: Vec<Feature> = SUPPORTED
            .iter()
            .copied()
            .filter(|f| request.wants(*f))
            .collect();

        let depth = features.contains(&Feature::DepthSensing);
        let depth_usage = depth
            .then(|| request.depth.usage_preference.first().copied())
            .flatten()
            .or(depth.then_some(DepthUsage::CpuOptimized));
        let depth_format = depth
            .then(|| request.depth.format_preference.first().copied())
            .flatten()
            .or(depth.then_some(DepthDataFormat::LuminanceAlpha));

        self.session_active = true;
        self.depth_enabled = depth;
        log::debug!("Simulated host granted {:?}", features);
        Ok(GrantedSession {
            features,
            depth_usage,
            depth_format,
        })
    }

    fn request_hit_test_source(&mut self) -> Result<(), SessionError> {
        if !self.session_active {
            return Err(SessionError::HitTestSource("no active session".into()));
        }
        self.hit_source = true;
        Ok(())
    }

    fn request_animation_frame(&mut self) {
        if self.session_active {
            self.frame_pending = true;
        }
    }

    fn end_session(&mut self) {
        self.session_active = false;
        self.frame_pending = false;
        self.hit_source = false;
    }
}
