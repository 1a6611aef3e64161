//! egui HUD: session status plus the few runtime toggles.

use depth_ar::{OcclusionMode, TrackerState};

/// Read-only values shown in the HUD.
#[derive(Debug, Clone, Copy, Default)]
pub struct HudInfo {
    pub fps: f32,
    pub tracker: Option<TrackerState>,
    pub frames_since_hit: u64,
    pub placed: usize,
    pub frames_rendered: u64,
    pub frames_skipped: u64,
    pub depth_size: Option<(u32, u32)>,
    pub depth_reallocs: u64,
}

/// Values the HUD may change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HudControls {
    pub visible: bool,
    pub mode: OcclusionMode,
    pub tracking_lost: bool,
}

fn tracker_label(state: Option<TrackerState>) -> &'static str {
    match state {
        None => "-",
        Some(TrackerState::NoSurface) => "searching for a surface",
        Some(TrackerState::Tracking) => "tracking",
    }
}

pub fn draw_hud(ctx: &egui::Context, info: &HudInfo, controls: &mut HudControls) {
    if !controls.visible {
        return;
    }

    egui::Window::new("AR session")
        .anchor(egui::Align2::LEFT_TOP, [10.0, 10.0])
        .resizable(false)
        .collapsible(true)
        .show(ctx, |ui| {
            ui.label(format!("{:.0} fps", info.fps));
            ui.label(format!("Surface: {}", tracker_label(info.tracker)));
            if info.tracker == Some(TrackerState::Tracking) && info.frames_since_hit > 0 {
                ui.label(format!("Last hit {} frame(s) ago", info.frames_since_hit));
            }
            ui.label(format!("Placed objects: {}", info.placed));
            ui.label(format!(
                "Frames: {} rendered, {} without pose",
                info.frames_rendered, info.frames_skipped
            ));
            match info.depth_size {
                Some((w, h)) => ui.label(format!(
                    "Depth: {}x{} ({} texture alloc(s))",
                    w, h, info.depth_reallocs
                )),
                None => ui.label("Depth: none"),
            };

            ui.separator();
            ui.label("Depth pass");
            ui.radio_value(&mut controls.mode, OcclusionMode::Visualize, "Visualize");
            ui.radio_value(&mut controls.mode, OcclusionMode::Occlude, "Occlude");

            ui.separator();
            ui.checkbox(&mut controls.tracking_lost, "Simulate tracking loss");

            ui.separator();
            ui.small("Left click: place | Right drag: look | WASD/QE: move | H: HUD");
        });
}
