//! Desktop AR viewer.
//!
//! Drives the `depth_ar` frame pipeline from a winit event loop against a
//! simulated AR host, and replays each recorded frame on wgpu.

pub mod app;
pub mod camera;
pub mod config;
pub mod metrics;
pub mod renderer;
pub mod sim_host;
pub mod ui;
