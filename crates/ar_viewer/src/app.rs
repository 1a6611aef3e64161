use crate::{
    camera::{Camera, CameraController},
    config::Config,
    metrics::ViewerMetrics,
    renderer::{Renderer, WgpuBackend},
    sim_host::{SimFrame, SimHost},
    ui::{self, HudControls, HudInfo},
};
use anyhow::Result;
use depth_ar::{EventQueue, FrameReport, HostEvent, SessionDriver, StepOutcome, Viewport};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    event::{ElementState, MouseButton, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

/// Load op of the HUD pass.
///
/// A composed AR frame is kept. Without one (no pose yet) the AR pipeline
/// issues no clear, but a freshly acquired swapchain texture has undefined
/// contents and must be initialized before it is presented. That clear
/// belongs to presentation, not to the AR frame.
fn hud_load_op(composed: bool) -> wgpu::LoadOp<wgpu::Color> {
    if composed {
        wgpu::LoadOp::Load
    } else {
        wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
    }
}

pub struct App {
    pub renderer: Renderer,
    pub camera: Camera,
    pub camera_controller: CameraController,
    pub driver: SessionDriver<SimHost>,
    pub events: EventQueue<SimFrame>,
    pub metrics: ViewerMetrics,
    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,
    pub hud: HudControls,
    last_report: Option<FrameReport>,
    started: Instant,
    last_tick: Instant,
    fps: f32,
}

impl App {
    pub async fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let renderer = Renderer::new(window.clone()).await?;
        let size = renderer.gfx.size;

        let mut camera = Camera::new(1.0);
        camera.set_aspect(size.width, size.height);

        let pipeline = config.pipeline_config();
        let mode = pipeline.compositor.mode;
        let driver = SessionDriver::start(SimHost::new(config.sim_settings()), pipeline)?;
        log::info!(
            "AR session started with {:?} (depth {:?}/{:?})",
            driver.granted().features,
            driver.granted().depth_usage,
            driver.granted().depth_format
        );

        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui_ctx.viewport_id(),
            &*window,
            None,
            None,
        );

        let now = Instant::now();
        Ok(Self {
            renderer,
            camera,
            camera_controller: CameraController::new(),
            driver,
            events: EventQueue::new(),
            metrics: ViewerMetrics::new()?,
            egui_ctx,
            egui_state,
            hud: HudControls {
                visible: !config.no_hud,
                mode,
                tracking_lost: false,
            },
            last_report: None,
            started: now,
            last_tick: now,
            fps: 0.0,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.renderer.resize(new_size);
            self.camera.set_aspect(new_size.width, new_size.height);
        }
    }

    /// Returns `true` when the event was consumed.
    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(window, event);
        if response.consumed {
            return true;
        }

        self.camera_controller.handle_event(event, &mut self.camera);

        match event {
            WindowEvent::Resized(physical_size) => self.resize(*physical_size),
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state: ElementState::Pressed,
                ..
            } => {
                if self.driver.is_active() {
                    self.events.push(HostEvent::Select);
                }
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed && !event.repeat =>
            {
                if event.physical_key == PhysicalKey::Code(KeyCode::KeyH) {
                    self.hud.visible = !self.hud.visible;
                }
            }
            _ => {}
        }

        false
    }

    /// Ends the AR session and logs the final counters.
    pub fn shutdown(&mut self) {
        self.driver.end();
        match self.metrics.encode_text() {
            Ok(text) => log::info!("Final metrics:\n{}", text),
            Err(e) => log::warn!("Failed to encode metrics: {}", e),
        }
    }

    fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = now.duration_since(self.last_tick).as_secs_f32().min(0.25);
        self.last_tick = now;
        if dt > 0.0 {
            let inst = 1.0 / dt;
            self.fps = if self.fps == 0.0 { inst } else { self.fps * 0.9 + inst * 0.1 };
        }
        dt
    }

    fn apply_hud_controls(&mut self) {
        if self.driver.compositor().config().mode != self.hud.mode {
            log::info!("Depth pass mode -> {:?}", self.hud.mode);
            self.driver.set_mode(self.hud.mode);
        }
        self.driver.host_mut().tracking_lost = self.hud.tracking_lost;
    }

    fn hud_info(&self) -> HudInfo {
        let depth = &self.renderer.depth_texture;
        HudInfo {
            fps: self.fps,
            tracker: Some(self.driver.tracker().state()),
            frames_since_hit: self.driver.tracker().frames_since_hit(),
            placed: self.driver.scene().placed_count(),
            frames_rendered: self.driver.frames_rendered(),
            frames_skipped: self.driver.frames_skipped(),
            depth_size: (depth.reallocs() > 0).then(|| depth.size()),
            depth_reallocs: depth.reallocs(),
        }
    }

    pub fn render(&mut self, window: &Window) -> Result<(), wgpu::SurfaceError> {
        let dt = self.tick();
        self.camera_controller.update(&mut self.camera, dt);
        self.apply_hud_controls();

        // The host delivers its pending frame callback for this display refresh.
        let size = self.renderer.gfx.size;
        let viewport = Viewport::new(0, 0, size.width, size.height);
        if let Some(frame) = self.driver.host_mut().take_frame(&self.camera, viewport) {
            let time_ms = self.started.elapsed().as_secs_f64() * 1000.0;
            self.events.push(HostEvent::Frame { time_ms, frame });
        }

        let frame = self.renderer.gfx.surface.get_current_texture()?;
        let swap_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let rendered = {
            let mut backend = WgpuBackend::new(&mut self.renderer, &swap_view);
            match self.driver.drain(&mut self.events, &mut backend) {
                Ok(outcomes) => {
                    for outcome in &outcomes {
                        self.metrics.observe(outcome);
                        match outcome {
                            StepOutcome::Rendered(report) => self.last_report = Some(*report),
                            StepOutcome::Placed(Some(id)) => log::info!("Placed object {:?}", id),
                            StepOutcome::Placed(None) => {
                                log::debug!("Select ignored: no surface found yet")
                            }
                            _ => {}
                        }
                    }
                }
                Err(e) => {
                    self.metrics.backend_errors_total.inc();
                    log::error!("Frame replay failed: {}", e);
                }
            }
            backend.submitted() > 0
        };

        let egui_input = self.egui_state.take_egui_input(window);
        self.egui_ctx.begin_frame(egui_input);
        let info = self.hud_info();
        ui::draw_hud(&self.egui_ctx, &info, &mut self.hud);
        let egui_output = self.egui_ctx.end_frame();

        self.egui_state
            .handle_platform_output(window, egui_output.platform_output);

        let shapes = self
            .egui_ctx
            .tessellate(egui_output.shapes, self.egui_ctx.pixels_per_point());

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [
                self.renderer.gfx.config.width,
                self.renderer.gfx.config.height,
            ],
            pixels_per_point: self.egui_ctx.pixels_per_point(),
        };

        let mut encoder = self
            .renderer
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("UI Encoder"),
            });

        for (id, delta) in &egui_output.textures_delta.set {
            self.renderer.egui_renderer.update_texture(
                &self.renderer.gfx.device,
                &self.renderer.gfx.queue,
                *id,
                delta,
            );
        }

        self.renderer.egui_renderer.update_buffers(
            &self.renderer.gfx.device,
            &self.renderer.gfx.queue,
            &mut encoder,
            &shapes,
            &screen_descriptor,
        );

        let load = hud_load_op(rendered);

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("EGUI Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &swap_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.renderer
                .egui_renderer
                .render(&mut render_pass, &shapes, &screen_descriptor);
        }

        for id in &egui_output.textures_delta.free {
            self.renderer.egui_renderer.free_texture(id);
        }

        self.renderer
            .gfx
            .queue
            .submit(std::iter::once(encoder.finish()));
        frame.present();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hud_keeps_a_composed_frame() {
        assert_eq!(hud_load_op(true), wgpu::LoadOp::Load);
    }

    #[test]
    fn hud_initializes_an_uncomposed_surface() {
        assert_eq!(
            hud_load_op(false),
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
        );
    }
}
