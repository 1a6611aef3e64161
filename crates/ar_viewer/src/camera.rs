//! Simulated device pose: a handheld camera walking around the room.

use depth_ar::{Pose, View, ViewerPose, Viewport};
use glam::{EulerRot, Mat4, Quat, Vec3};
use std::collections::HashSet;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Eye height of a phone held at chest level.
const EYE_HEIGHT_M: f32 = 1.4;
const NEAR_M: f32 = 0.05;
const FAR_M: f32 = 50.0;

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    /// Rotation about +Y (radians); 0 looks down -Z.
    pub yaw_rad: f32,
    /// Rotation about the camera's x axis (radians); negative looks down.
    pub pitch_rad: f32,
    pub fov_y_rad: f32,
    pub aspect: f32,
}

impl Camera {
    pub fn new(aspect: f32) -> Self {
        Self {
            position: Vec3::new(0.0, EYE_HEIGHT_M, 2.0),
            yaw_rad: 0.0,
            pitch_rad: -35f32.to_radians(),
            fov_y_rad: 60f32.to_radians(),
            aspect: aspect.max(1e-3),
        }
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    #[inline]
    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw_rad, self.pitch_rad, 0.0)
    }

    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::NEG_Z
    }

    /// wgpu-style perspective (depth in [0, 1]).
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_rad, self.aspect, NEAR_M, FAR_M)
    }

    #[inline]
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.orientation())
    }

    /// The single monoscopic view the simulated host reports.
    pub fn viewer_pose(&self, viewport: Viewport) -> ViewerPose {
        let pose = self.pose();
        ViewerPose {
            transform: pose,
            views: vec![View {
                projection: self.projection(),
                transform: pose,
                viewport,
            }],
        }
    }

    /// View-space direction through normalized device coordinates, scaled
    /// so that its z component is -1.
    pub fn view_ray(&self, ndc_x: f32, ndc_y: f32) -> Vec3 {
        let t = (0.5 * self.fov_y_rad).tan();
        Vec3::new(ndc_x * t * self.aspect, ndc_y * t, -1.0)
    }
}

/// Right-drag to look around, WASD to walk, Q/E to change height.
pub struct CameraController {
    look_down: bool,
    last_mouse: Option<(f64, f64)>,
    held: HashSet<KeyCode>,
    speed_m_s: f32,
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraController {
    pub fn new() -> Self {
        Self {
            look_down: false,
            last_mouse: None,
            held: HashSet::new(),
            speed_m_s: 1.2,
        }
    }

    pub fn handle_event(&mut self, event: &WindowEvent, camera: &mut Camera) {
        match event {
            WindowEvent::MouseInput { button, state, .. } => {
                if *button == MouseButton::Right {
                    self.look_down = *state == ElementState::Pressed;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.handle_cursor_look((position.x, position.y), camera);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => {
                            self.held.insert(code);
                        }
                        ElementState::Released => {
                            self.held.remove(&code);
                        }
                    }
                }
            }
            WindowEvent::Focused(false) => self.held.clear(),
            _ => {}
        }
    }

    /// Applies held movement keys for `dt_s` seconds.
    pub fn update(&mut self, camera: &mut Camera, dt_s: f32) {
        let yaw = Quat::from_rotation_y(camera.yaw_rad);
        let forward = yaw * Vec3::NEG_Z;
        let right = yaw * Vec3::X;

        let mut dir = Vec3::ZERO;
        for key in &self.held {
            match key {
                KeyCode::KeyW => dir += forward,
                KeyCode::KeyS => dir -= forward,
                KeyCode::KeyD => dir += right,
                KeyCode::KeyA => dir -= right,
                KeyCode::KeyE => dir += Vec3::Y,
                KeyCode::KeyQ => dir -= Vec3::Y,
                _ => {}
            }
        }
        if dir != Vec3::ZERO {
            camera.position += dir.normalize() * self.speed_m_s * dt_s;
            camera.position.y = camera.position.y.clamp(0.2, 2.5);
        }
    }

    fn handle_cursor_look(&mut self, xy: (f64, f64), camera: &mut Camera) {
        if let Some(last) = self.last_mouse {
            if self.look_down {
                let dx = (xy.0 - last.0) as f32 * 0.004;
                let dy = (xy.1 - last.1) as f32 * 0.004;
                camera.yaw_rad -= dx;
                camera.pitch_rad = (camera.pitch_rad - dy)
                    .clamp(-85f32.to_radians(), 85f32.to_radians());
            }
        }
        self.last_mouse = Some(xy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_follows_yaw_and_pitch() {
        let mut cam = Camera::new(1.0);
        cam.pitch_rad = 0.0;
        assert!((cam.forward() - Vec3::NEG_Z).length() < 1e-6);

        cam.yaw_rad = std::f32::consts::FRAC_PI_2;
        assert!((cam.forward() - Vec3::NEG_X).length() < 1e-6);

        cam.yaw_rad = 0.0;
        cam.pitch_rad = -std::f32::consts::FRAC_PI_4;
        assert!(cam.forward().y < 0.0);
    }

    #[test]
    fn center_ray_matches_forward() {
        let cam = Camera::new(16.0 / 9.0);
        let world = (cam.orientation() * cam.view_ray(0.0, 0.0)).normalize();
        assert!((world - cam.forward()).length() < 1e-6);
    }

    #[test]
    fn edge_ray_hits_frustum_edge() {
        let cam = Camera::new(2.0);
        let ray = cam.view_ray(1.0, 1.0);
        let clip = cam.projection() * ray.extend(1.0);
        assert!((clip.x / clip.w - 1.0).abs() < 1e-5);
        assert!((clip.y / clip.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn viewer_pose_reports_one_view() {
        let cam = Camera::new(1.5);
        let vp = cam.viewer_pose(Viewport::new(0, 0, 300, 200));
        assert_eq!(vp.views.len(), 1);
        assert_eq!(vp.views[0].viewport.width, 300);
        assert_eq!(vp.views[0].transform, vp.transform);
    }
}
