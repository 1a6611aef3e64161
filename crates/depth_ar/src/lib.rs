//! depth_ar: depth-aware AR frame pipeline.
//!
//! Per frame the host supplies a viewer pose, one view, an optional depth
//! snapshot and optional hit-test results. The pipeline:
//!
//! - decodes the snapshot (2 x u8 per texel, low/high, times a metric scale),
//! - maps output fragments into depth-buffer UV space through the host's
//!   `normDepthBufferFromNormView` matrix,
//! - moves the placement indicator to the first hit, and spawns placed
//!   objects at that pose on select,
//! - records the frame as a validated command stream: clear, depth upload,
//!   full-screen depth pass (visualize or occlusion prepass), then every
//!   visible scene object.
//!
//! Command streams are replayed by a [`render::GpuBackend`]: the wgpu
//! renderer in `ar_viewer`, or [`raster::SoftwareBackend`] on the CPU.

pub mod config;
pub mod coords;
pub mod depth;
pub mod host;
pub mod occlusion;
pub mod placement;
pub mod pose;
pub mod raster;
pub mod render;
pub mod scene;
pub mod session;

pub use config::PipelineConfig;
pub use depth::{DepthFrame, MAX_DEPTH_METERS};
pub use host::{
    DepthDataFormat, DepthSensingOptions, DepthUsage, Feature, GrantedSession, HitTestResult,
    HostFrame, HostPlatform, SessionError, SessionRequest,
};
pub use placement::{PlacementTracker, TrackerState};
pub use pose::{Pose, View, ViewState, ViewerPose, Viewport};
pub use raster::SoftwareBackend;
pub use render::{
    Compositor, CompositorConfig, FrameCommands, GpuBackend, OcclusionMode, RenderContext,
    RenderError,
};
pub use scene::{ModelRef, ObjectId, ObjectRole, Scene, SceneObject, Transform};
pub use session::{EventQueue, FrameReport, HostEvent, SessionDriver, StepOutcome};
