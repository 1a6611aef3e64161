//! Session loop.
//!
//! Host callbacks arrive as [`HostEvent`]s and are applied one at a time by
//! [`SessionDriver::handle`]. The driver owns the scene, the placement
//! tracker and the render context; it does no pose math of its own.

use crate::config::PipelineConfig;
use crate::host::{
    DepthDataFormat, Feature, GrantedSession, HostFrame, HostPlatform, SessionError,
};
use crate::placement::{PlacementTracker, TrackerState};
use crate::pose::ViewState;
use crate::render::{ComposeStats, Compositor, GpuBackend, OcclusionMode, RenderContext, RenderError};
use crate::scene::{ObjectId, Scene};
use std::collections::VecDeque;

#[derive(Debug)]
pub enum HostEvent<F> {
    /// Animation-frame callback.
    Frame { time_ms: f64, frame: F },
    /// Discrete user select (tap, click, trigger).
    Select,
    /// User or host asked to end the session.
    End,
}

/// FIFO of pending host events.
#[derive(Debug)]
pub struct EventQueue<F> {
    events: VecDeque<HostEvent<F>>,
}

impl<F> Default for EventQueue<F> {
    fn default() -> Self {
        Self {
            events: VecDeque::new(),
        }
    }
}

impl<F> EventQueue<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: HostEvent<F>) {
        self.events.push_back(event);
    }

    pub fn pop(&mut self) -> Option<HostEvent<F>> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Summary of one rendered frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub time_ms: f64,
    pub stats: ComposeStats,
    pub hits: usize,
    pub tracker: TrackerState,
    pub frames_since_hit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    Rendered(FrameReport),
    /// Frame callback without a viewer pose: nothing was drawn.
    Skipped,
    /// Select handled; `None` when no surface had been hit yet.
    Placed(Option<ObjectId>),
    Ended,
    /// Event arrived after the session ended.
    Ignored,
}

/// Drives one AR session against a host platform.
pub struct SessionDriver<H: HostPlatform> {
    host: H,
    granted: GrantedSession,
    config: PipelineConfig,
    ctx: RenderContext,
    compositor: Compositor,
    scene: Scene,
    tracker: PlacementTracker,
    hit_test_active: bool,
    active: bool,
    frames_rendered: u64,
    frames_skipped: u64,
    warned_multiview: bool,
}

impl<H: HostPlatform> SessionDriver<H> {
    /// Negotiates the session and arms the first frame callback.
    ///
    /// Fails when the platform lacks AR support, a required feature was not
    /// granted, depth arrives in an undecodable format, or the hit-test
    /// source cannot be created. A session that was granted but rejected is
    /// ended before returning.
    pub fn start(mut host: H, config: PipelineConfig) -> Result<Self, SessionError> {
        if !host.is_session_supported() {
            log::error!("Immersive AR is not supported on this platform");
            return Err(SessionError::Unsupported);
        }

        let granted = host.request_session(&config.session).map_err(|e| {
            log::error!("Session request failed: {}", e);
            e
        })?;

        if let Err(e) = Self::validate(&mut host, &config, &granted) {
            log::error!("Rejecting AR session: {}", e);
            host.end_session();
            return Err(e);
        }

        let hit_test_active = granted.has(Feature::HitTest);
        log::info!(
            "AR session started (features: {}; depth: {:?}/{:?})",
            granted
                .features
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            granted.depth_usage,
            granted.depth_format
        );
        if !hit_test_active {
            log::warn!("Hit testing unavailable; objects cannot be placed");
        }

        host.request_animation_frame();

        let scene = Scene::new(config.indicator_model.clone(), config.indicator_scale);
        let compositor = Compositor::new(config.compositor);
        Ok(Self {
            host,
            granted,
            config,
            ctx: RenderContext::new(),
            compositor,
            scene,
            tracker: PlacementTracker::new(),
            hit_test_active,
            active: true,
            frames_rendered: 0,
            frames_skipped: 0,
            warned_multiview: false,
        })
    }

    fn validate(
        host: &mut H,
        config: &PipelineConfig,
        granted: &GrantedSession,
    ) -> Result<(), SessionError> {
        if let Some(missing) = config
            .session
            .required
            .iter()
            .copied()
            .find(|f| !granted.has(*f))
        {
            return Err(SessionError::MissingFeature(missing));
        }

        if granted.has(Feature::DepthSensing) {
            match granted.depth_format {
                None | Some(DepthDataFormat::LuminanceAlpha) => {}
                Some(other) => return Err(SessionError::UnsupportedDepthFormat(other)),
            }
        }

        if granted.has(Feature::HitTest) {
            host.request_hit_test_source()?;
        }
        Ok(())
    }

    /// Applies one host event.
    pub fn handle<F, B>(
        &mut self,
        event: HostEvent<F>,
        backend: &mut B,
    ) -> Result<StepOutcome, RenderError>
    where
        F: HostFrame,
        B: GpuBackend,
    {
        if !self.active {
            return Ok(StepOutcome::Ignored);
        }
        match event {
            HostEvent::Frame { time_ms, frame } => self.on_frame(time_ms, &frame, backend),
            HostEvent::Select => Ok(StepOutcome::Placed(self.tracker.commit(
                &mut self.scene,
                self.config.placed_model.clone(),
                self.config.placed_scale,
            ))),
            HostEvent::End => {
                self.end();
                Ok(StepOutcome::Ended)
            }
        }
    }

    /// Applies every queued event in order, stopping at the first render
    /// failure.
    pub fn drain<F, B>(
        &mut self,
        queue: &mut EventQueue<F>,
        backend: &mut B,
    ) -> Result<Vec<StepOutcome>, RenderError>
    where
        F: HostFrame,
        B: GpuBackend,
    {
        let mut outcomes = Vec::with_capacity(queue.len());
        while let Some(event) = queue.pop() {
            outcomes.push(self.handle(event, backend)?);
        }
        Ok(outcomes)
    }

    fn on_frame<F, B>(
        &mut self,
        time_ms: f64,
        frame: &F,
        backend: &mut B,
    ) -> Result<StepOutcome, RenderError>
    where
        F: HostFrame,
        B: GpuBackend,
    {
        self.host.request_animation_frame();

        let Some(pose) = frame.viewer_pose() else {
            self.frames_skipped += 1;
            log::trace!("No viewer pose at t={:.1}ms; skipping frame", time_ms);
            return Ok(StepOutcome::Skipped);
        };
        let Some(view) = pose.views.first() else {
            self.frames_skipped += 1;
            log::trace!("Viewer pose without views at t={:.1}ms", time_ms);
            return Ok(StepOutcome::Skipped);
        };
        if pose.views.len() > 1 && !self.warned_multiview {
            log::warn!(
                "Host reported {} views; rendering the first only",
                pose.views.len()
            );
            self.warned_multiview = true;
        }

        let depth = if self.granted.has(Feature::DepthSensing) {
            frame.depth_info(view)
        } else {
            None
        };
        let hits = if self.hit_test_active {
            frame.hit_test_results()
        } else {
            Vec::new()
        };

        self.tracker.update(&hits);
        self.tracker.sync_indicator(&mut self.scene);

        let view_state = ViewState::from_view(view);
        let mut enc = self.ctx.begin_frame();
        let frame_index = enc.frame_index();
        let stats = self
            .compositor
            .render_view(&mut enc, &view_state, depth.as_ref(), &self.scene)?;
        let commands = enc.finish();
        backend.submit(&commands)?;

        self.frames_rendered += 1;
        Ok(StepOutcome::Rendered(FrameReport {
            frame_index,
            time_ms,
            stats,
            hits: hits.len(),
            tracker: self.tracker.state(),
            frames_since_hit: self.tracker.frames_since_hit(),
        }))
    }

    /// Ends the host session. Later events are ignored and no further frame
    /// is requested.
    pub fn end(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.host.end_session();
        log::info!(
            "AR session ended after {} rendered / {} skipped frame(s), {} object(s) placed",
            self.frames_rendered,
            self.frames_skipped,
            self.scene.placed_count()
        );
    }

    pub fn set_mode(&mut self, mode: OcclusionMode) {
        self.compositor.set_mode(mode);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[inline]
    pub fn host(&self) -> &H {
        &self.host
    }

    #[inline]
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    #[inline]
    pub fn granted(&self) -> &GrantedSession {
        &self.granted
    }

    #[inline]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    #[inline]
    pub fn tracker(&self) -> &PlacementTracker {
        &self.tracker
    }

    #[inline]
    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    #[inline]
    pub fn render_context(&self) -> &RenderContext {
        &self.ctx
    }

    #[inline]
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    #[inline]
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{DepthUsage, SessionRequest};

    #[derive(Default)]
    struct StubHost {
        unsupported: bool,
        features: Vec<Feature>,
        format: Option<DepthDataFormat>,
        hit_source_fails: bool,
        frames_requested: u32,
        ended: u32,
    }

    impl HostPlatform for StubHost {
        fn is_session_supported(&self) -> bool {
            !self.unsupported
        }

        fn request_session(&mut self, _: &SessionRequest) -> Result<GrantedSession, SessionError> {
            Ok(GrantedSession {
                features: self.features.clone(),
                depth_usage: Some(DepthUsage::GpuOptimized),
                depth_format: self.format,
            })
        }

        fn request_hit_test_source(&mut self) -> Result<(), SessionError> {
            if self.hit_source_fails {
                Err(SessionError::HitTestSource("no viewer space".into()))
            } else {
                Ok(())
            }
        }

        fn request_animation_frame(&mut self) {
            self.frames_requested += 1;
        }

        fn end_session(&mut self) {
            self.ended += 1;
        }
    }

    fn full() -> StubHost {
        StubHost {
            features: vec![
                Feature::UnboundedTracking,
                Feature::DepthSensing,
                Feature::HitTest,
            ],
            format: Some(DepthDataFormat::LuminanceAlpha),
            ..Default::default()
        }
    }

    fn start(host: StubHost) -> Result<SessionDriver<StubHost>, SessionError> {
        SessionDriver::start(host, PipelineConfig::default())
    }

    #[test]
    fn start_arms_first_frame() {
        let driver = start(full()).expect("start");
        assert!(driver.is_active());
        assert_eq!(driver.host().frames_requested, 1);
        assert_eq!(driver.host().ended, 0);
    }

    #[test]
    fn unsupported_platform_halts_startup() {
        let host = StubHost {
            unsupported: true,
            ..full()
        };
        assert_eq!(start(host).err(), Some(SessionError::Unsupported));
    }

    #[test]
    fn missing_required_feature_ends_session() {
        let host = StubHost {
            features: vec![Feature::UnboundedTracking, Feature::HitTest],
            ..full()
        };
        let err = start(host).err();
        assert_eq!(err, Some(SessionError::MissingFeature(Feature::DepthSensing)));
    }

    #[test]
    fn float_depth_is_rejected() {
        let host = StubHost {
            format: Some(DepthDataFormat::Float32),
            ..full()
        };
        assert_eq!(
            start(host).err(),
            Some(SessionError::UnsupportedDepthFormat(DepthDataFormat::Float32))
        );
    }

    #[test]
    fn hit_test_source_failure_is_fatal() {
        let host = StubHost {
            hit_source_fails: true,
            ..full()
        };
        assert!(matches!(start(host), Err(SessionError::HitTestSource(_))));
    }

    #[test]
    fn optional_hit_test_may_be_absent() {
        let host = StubHost {
            features: vec![Feature::UnboundedTracking, Feature::DepthSensing],
            ..full()
        };
        assert!(start(host).is_ok());
    }

    #[test]
    fn end_is_idempotent() {
        let mut driver = start(full()).expect("start");
        driver.end();
        driver.end();
        assert!(!driver.is_active());
        assert_eq!(driver.host().ended, 1);
    }
}
