//! Frame recording and composition.
//!
//! The compositor never talks to a graphics API directly. It records a
//! [`FrameCommands`] stream through a [`FrameEncoder`]; a [`GpuBackend`]
//! replays that stream (wgpu in the viewer, the CPU rasterizer in tests).

pub mod compositor;
pub mod context;
pub mod shaders;
pub mod uniforms;

pub use self::compositor::{ComposeStats, Compositor, CompositorConfig, OcclusionMode};
pub use self::context::{
    FrameCommands, FrameEncoder, GpuCommand, Program, RenderContext, RenderTarget, TextureSource,
    TextureUnit,
};
pub use self::uniforms::{
    CameraUniformsStd140, DepthUniformsStd140, LightParams, LightUniformsStd140,
    ObjectUniformsStd140,
};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error("no render target bound")]
    NoTarget,

    #[error("no program bound")]
    NoProgram,

    #[error("program {found:?} bound where {expected:?} is required")]
    WrongProgram { expected: Program, found: Program },

    #[error("{0} uniforms not written before draw")]
    UniformNotSet(&'static str),

    #[error("texture unit {unit} is reserved for another texture kind")]
    TextureUnitCollision { unit: u32 },

    #[error("depth texture not uploaded or not bound")]
    DepthTextureMissing,

    #[error("object texture for model '{0}' not bound")]
    ObjectTextureMissing(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Executes recorded frames.
pub trait GpuBackend {
    fn submit(&mut self, frame: &FrameCommands) -> Result<(), RenderError>;
}
