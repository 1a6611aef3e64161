//! Boundary with the host AR platform.
//!
//! Everything here is implemented by the platform side (a real XR runtime,
//! a simulator, or a scripted test host). The pipeline only consumes it.

use crate::depth::DepthFrame;
use crate::pose::{Pose, View, ViewerPose};
use glam::Mat4;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// World-scale tracking with no bounds ("unbounded" reference space).
    UnboundedTracking,
    HitTest,
    DepthSensing,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::UnboundedTracking => "unbounded",
            Feature::HitTest => "hit-test",
            Feature::DepthSensing => "depth-sensing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthUsage {
    CpuOptimized,
    GpuOptimized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthDataFormat {
    /// Two 8-bit channels, low byte then high byte.
    LuminanceAlpha,
    Float32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthSensingOptions {
    pub usage_preference: Vec<DepthUsage>,
    pub format_preference: Vec<DepthDataFormat>,
}

impl Default for DepthSensingOptions {
    fn default() -> Self {
        Self {
            usage_preference: vec![DepthUsage::GpuOptimized, DepthUsage::CpuOptimized],
            format_preference: vec![DepthDataFormat::LuminanceAlpha],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub required: Vec<Feature>,
    pub optional: Vec<Feature>,
    pub depth: DepthSensingOptions,
}

impl Default for SessionRequest {
    fn default() -> Self {
        Self {
            required: vec![Feature::UnboundedTracking, Feature::DepthSensing],
            optional: vec![Feature::HitTest],
            depth: DepthSensingOptions::default(),
        }
    }
}

impl SessionRequest {
    pub fn wants(&self, feature: Feature) -> bool {
        self.required.contains(&feature) || self.optional.contains(&feature)
    }
}

/// What the host actually granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantedSession {
    pub features: Vec<Feature>,
    pub depth_usage: Option<DepthUsage>,
    pub depth_format: Option<DepthDataFormat>,
}

impl GrantedSession {
    pub fn has(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

/// A candidate surface intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitTestResult {
    pub pose: Pose,
}

impl HitTestResult {
    pub fn from_matrix(m: &Mat4) -> Self {
        Self {
            pose: Pose::from_matrix(m),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("immersive AR sessions are not supported on this platform")]
    Unsupported,

    #[error("host refused the session: {0}")]
    Refused(String),

    #[error("required feature '{0}' was not granted")]
    MissingFeature(Feature),

    #[error("depth data format {0:?} is not supported; only luminance-alpha is decoded")]
    UnsupportedDepthFormat(DepthDataFormat),

    #[error("could not create a hit-test source: {0}")]
    HitTestSource(String),

    #[error("session already ended")]
    Ended,
}

/// Per-frame queries. Valid only during the callback that received it.
pub trait HostFrame {
    fn viewer_pose(&self) -> Option<ViewerPose>;
    fn depth_info(&self, view: &View) -> Option<DepthFrame>;
    fn hit_test_results(&self) -> Vec<HitTestResult>;
}

/// Session-level operations.
pub trait HostPlatform {
    fn is_session_supported(&self) -> bool;
    fn request_session(&mut self, request: &SessionRequest) -> Result<GrantedSession, SessionError>;
    /// Creates the hit-test source (rays from the viewer's forward axis).
    fn request_hit_test_source(&mut self) -> Result<(), SessionError>;
    /// Schedules the next frame callback.
    fn request_animation_frame(&mut self);
    fn end_session(&mut self);
}
