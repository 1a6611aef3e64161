use depth_ar::StepOutcome;
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

pub struct ViewerMetrics {
    pub registry: Registry,
    pub frames_rendered_total: IntCounter,
    pub frames_skipped_total: IntCounter,
    pub depth_uploads_total: IntCounter,
    pub objects_placed_total: IntCounter,
    pub selects_without_surface_total: IntCounter,
    pub backend_errors_total: IntCounter,
    pub frames_since_hit: IntGauge,
}

impl ViewerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("ar_viewer".into()), None)?;

        macro_rules! reg {
            ($m:expr) => {{
                let m = $m?;
                registry.register(Box::new(m.clone()))?;
                m
            }};
        }

        Ok(Self {
            frames_rendered_total: reg!(IntCounter::with_opts(Opts::new(
                "frames_rendered_total",
                "Frames composed and submitted"
            ))),
            frames_skipped_total: reg!(IntCounter::with_opts(Opts::new(
                "frames_skipped_total",
                "Frame callbacks without a viewer pose"
            ))),
            depth_uploads_total: reg!(IntCounter::with_opts(Opts::new(
                "depth_uploads_total",
                "Depth snapshots uploaded to the GPU"
            ))),
            objects_placed_total: reg!(IntCounter::with_opts(Opts::new(
                "objects_placed_total",
                "Objects spawned at the placement indicator"
            ))),
            selects_without_surface_total: reg!(IntCounter::with_opts(Opts::new(
                "selects_without_surface_total",
                "Select events before any surface was hit"
            ))),
            backend_errors_total: reg!(IntCounter::with_opts(Opts::new(
                "backend_errors_total",
                "Frames the GPU backend failed to replay"
            ))),
            frames_since_hit: reg!(IntGauge::with_opts(Opts::new(
                "frames_since_hit",
                "Frames since the last hit-test result"
            ))),
            registry,
        })
    }

    pub fn observe(&self, outcome: &StepOutcome) {
        match outcome {
            StepOutcome::Rendered(report) => {
                self.frames_rendered_total.inc();
                if report.stats.depth_uploaded {
                    self.depth_uploads_total.inc();
                }
                self.frames_since_hit
                    .set(i64::try_from(report.frames_since_hit).unwrap_or(i64::MAX));
            }
            StepOutcome::Skipped => self.frames_skipped_total.inc(),
            StepOutcome::Placed(Some(_)) => self.objects_placed_total.inc(),
            StepOutcome::Placed(None) => self.selects_without_surface_total.inc(),
            StepOutcome::Ended | StepOutcome::Ignored => {}
        }
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depth_ar::render::ComposeStats;
    use depth_ar::{FrameReport, TrackerState};

    fn rendered(depth: bool, since_hit: u64) -> StepOutcome {
        StepOutcome::Rendered(FrameReport {
            frame_index: 0,
            time_ms: 0.0,
            stats: ComposeStats {
                depth_uploaded: depth,
                ..Default::default()
            },
            hits: 0,
            tracker: TrackerState::Tracking,
            frames_since_hit: since_hit,
        })
    }

    #[test]
    fn outcomes_map_to_counters() {
        let m = ViewerMetrics::new().expect("registry");
        m.observe(&rendered(true, 0));
        m.observe(&rendered(false, 4));
        m.observe(&StepOutcome::Skipped);
        m.observe(&StepOutcome::Placed(None));
        m.observe(&StepOutcome::Ended);

        assert_eq!(m.frames_rendered_total.get(), 2);
        assert_eq!(m.depth_uploads_total.get(), 1);
        assert_eq!(m.frames_skipped_total.get(), 1);
        assert_eq!(m.selects_without_surface_total.get(), 1);
        assert_eq!(m.objects_placed_total.get(), 0);
        assert_eq!(m.frames_since_hit.get(), 4);
    }

    #[test]
    fn text_encoding_uses_namespace() {
        let m = ViewerMetrics::new().expect("registry");
        m.observe(&StepOutcome::Skipped);
        let text = m.encode_text().expect("encode");
        assert!(text.contains("ar_viewer_frames_skipped_total 1"));
    }
}
