//! Whole-frame behaviour against a scripted host and the CPU backend.

use depth_ar::host::{DepthDataFormat, DepthUsage};
use depth_ar::{
    CompositorConfig, DepthFrame, EventQueue, Feature, GrantedSession, HitTestResult, HostEvent,
    HostFrame, HostPlatform, OcclusionMode, PipelineConfig, Pose, SessionDriver, SessionError,
    SessionRequest, SoftwareBackend, StepOutcome, TrackerState, View, ViewerPose, Viewport,
};
use glam::{Mat4, Quat, Vec3};

#[derive(Default)]
struct ScriptedHost {
    frames_requested: u32,
    ended: u32,
}

impl HostPlatform for ScriptedHost {
    fn is_session_supported(&self) -> bool {
        true
    }

    fn request_session(&mut self, _: &SessionRequest) -> Result<GrantedSession, SessionError> {
        Ok(GrantedSession {
            features: vec![
                Feature::UnboundedTracking,
                Feature::DepthSensing,
                Feature::HitTest,
            ],
            depth_usage: Some(DepthUsage::CpuOptimized),
            depth_format: Some(DepthDataFormat::LuminanceAlpha),
        })
    }

    fn request_hit_test_source(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    fn request_animation_frame(&mut self) {
        self.frames_requested += 1;
    }

    fn end_session(&mut self) {
        self.ended += 1;
    }
}

#[derive(Default)]
struct ScriptedFrame {
    pose: Option<ViewerPose>,
    depth: Option<DepthFrame>,
    hits: Vec<HitTestResult>,
}

impl HostFrame for ScriptedFrame {
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

const W: u32 = 16;
const H: u32 = 12;

fn identity_pose() -> ViewerPose {
    ViewerPose {
        transform: Pose::IDENTITY,
        views: vec![View {
            projection: Mat4::IDENTITY,
            transform: Pose::IDENTITY,
            viewport: Viewport::new(0, 0, W, H),
        }],
    }
}

fn perspective_pose() -> ViewerPose {
    ViewerPose {
        transform: Pose::IDENTITY,
        views: vec![View {
            projection: Mat4::perspective_rh(1.0, W as f32 / H as f32, 0.1, 20.0),
            transform: Pose::IDENTITY,
            viewport: Viewport::new(0, 0, W, H),
        }],
    }
}

fn floor_hit() -> HitTestResult {
    HitTestResult {
        pose: Pose::new(Vec3::new(0.25, -1.0, -2.0), Quat::IDENTITY),
    }
}

fn frame(pose: Option<ViewerPose>, depth: Option<DepthFrame>, hits: Vec<HitTestResult>) -> HostEvent<ScriptedFrame> {
    HostEvent::Frame {
        time_ms: 0.0,
        frame: ScriptedFrame { pose, depth, hits },
    }
}

fn start(mode: OcclusionMode) -> SessionDriver<ScriptedHost> {
    let config = PipelineConfig {
        compositor: CompositorConfig {
            mode,
            ..Default::default()
        },
        ..Default::default()
    };
    SessionDriver::start(ScriptedHost::default(), config).expect("session start")
}

#[test]
fn uniform_two_meters_visualizes_as_quarter_gray() {
    let mut driver = start(OcclusionMode::Visualize);
    let mut backend = SoftwareBackend::new(1, 1);
    let depth = DepthFrame::uniform(8, 6, 2.0, 0.001, Mat4::IDENTITY);

    let outcome = driver
        .handle(frame(Some(identity_pose()), Some(depth), vec![]), &mut backend)
        .expect("frame");
    assert!(matches!(outcome, StepOutcome::Rendered(r) if r.stats.depth_uploaded));

    assert_eq!((backend.width(), backend.height()), (W, H));
    for row in 0..H {
        for col in 0..W {
            let c = backend.color_at(col, row).expect("pixel");
            for g in &c[..3] {
                assert!((g - 0.25).abs() < 1e-4, "({col},{row}) = {g}");
            }
            assert_eq!(c[3], 1.0);
        }
    }
}

#[test]
fn frame_without_pose_draws_nothing_but_rearms() {
    let mut driver = start(OcclusionMode::Visualize);
    let mut backend = SoftwareBackend::new(W, H);
    let armed = driver.host().frames_requested;

    let outcome = driver.handle(frame(None, None, vec![]), &mut backend).expect("frame");
    assert_eq!(outcome, StepOutcome::Skipped);
    assert_eq!(backend.frames(), 0);
    assert_eq!(backend.clears(), 0);
    assert_eq!(driver.host().frames_requested, armed + 1);
    assert_eq!(driver.frames_skipped(), 1);
}

#[test]
fn two_selects_place_two_objects_at_the_indicator_pose() {
    let mut driver = start(OcclusionMode::Visualize);
    let mut backend = SoftwareBackend::new(W, H);

    driver
        .handle(frame(Some(perspective_pose()), None, vec![floor_hit()]), &mut backend)
        .expect("frame");
    let indicator = *driver.scene().indicator().transform();

    let a = driver.handle(HostEvent::<ScriptedFrame>::Select, &mut backend).expect("select");
    let b = driver.handle(HostEvent::<ScriptedFrame>::Select, &mut backend).expect("select");
    let (a, b) = match (a, b) {
        (StepOutcome::Placed(Some(a)), StepOutcome::Placed(Some(b))) => (a, b),
        other => panic!("unexpected {other:?}"),
    };
    assert_ne!(a, b);

    let scene = driver.scene();
    assert_eq!(scene.placed_count(), 2);
    let pa = scene.get(a).map(|o| o.transform().pose());
    let pb = scene.get(b).map(|o| o.transform().pose());
    assert_eq!(pa, pb);
    assert_eq!(pa.map(|p| p.position), Some(floor_hit().pose.position));
    assert_eq!(*scene.indicator().transform(), indicator);

    driver
        .handle(frame(Some(perspective_pose()), None, vec![]), &mut backend)
        .expect("frame");
    let ids: Vec<_> = driver.scene().objects().map(|o| o.id()).collect();
    assert_eq!(backend.object_draws(), ids.as_slice());
}

#[test]
fn select_before_any_hit_places_nothing() {
    let mut driver = start(OcclusionMode::Visualize);
    let mut backend = SoftwareBackend::new(W, H);
    let outcome = driver
        .handle(HostEvent::<ScriptedFrame>::Select, &mut backend)
        .expect("select");
    assert_eq!(outcome, StepOutcome::Placed(None));
    assert_eq!(driver.scene().placed_count(), 0);
}

#[test]
fn lost_surface_keeps_last_indicator_pose() {
    let mut driver = start(OcclusionMode::Visualize);
    let mut backend = SoftwareBackend::new(W, H);

    driver
        .handle(frame(Some(perspective_pose()), None, vec![floor_hit()]), &mut backend)
        .expect("frame");
    let before = *driver.scene().indicator().transform();

    let mut last = None;
    for _ in 0..3 {
        last = Some(
            driver
                .handle(frame(Some(perspective_pose()), None, vec![]), &mut backend)
                .expect("frame"),
        );
    }

    assert_eq!(*driver.scene().indicator().transform(), before);
    assert!(driver.scene().indicator().visible());
    match last {
        Some(StepOutcome::Rendered(r)) => {
            assert_eq!(r.tracker, TrackerState::Tracking);
            assert_eq!(r.frames_since_hit, 3);
            assert_eq!(r.stats.object_draws, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn occlusion_prepass_populates_depth() {
    let mut driver = start(OcclusionMode::Occlude);
    let mut backend = SoftwareBackend::new(W, H);
    let depth = DepthFrame::uniform(8, 6, 1.5, 0.001, Mat4::IDENTITY);

    let outcome = driver
        .handle(
            frame(Some(perspective_pose()), Some(depth), vec![floor_hit()]),
            &mut backend,
        )
        .expect("frame");
    match outcome {
        StepOutcome::Rendered(r) => {
            assert!(r.stats.occluded);
            assert_eq!(r.stats.fullscreen_draws, 1);
        }
        other => panic!("unexpected {other:?}"),
    }

    let d = backend.depth_at(W / 2, H / 2).expect("pixel");
    assert!(d > 0.0 && d < 1.0, "prepass depth {d}");
}

#[test]
fn end_stops_the_loop() {
    let mut driver = start(OcclusionMode::Visualize);
    let mut backend = SoftwareBackend::new(W, H);

    let mut queue = EventQueue::new();
    queue.push(frame(Some(identity_pose()), None, vec![]));
    queue.push(HostEvent::End);
    queue.push(frame(Some(identity_pose()), None, vec![]));
    queue.push(HostEvent::Select);

    let outcomes = driver.drain(&mut queue, &mut backend).expect("drain");
    assert!(matches!(outcomes[0], StepOutcome::Rendered(_)));
    assert_eq!(
        &outcomes[1..],
        &[StepOutcome::Ended, StepOutcome::Ignored, StepOutcome::Ignored]
    );
    assert!(queue.is_empty());

    assert!(!driver.is_active());
    assert_eq!(driver.host().ended, 1);
    // Initial arm plus the single rendered frame.
    assert_eq!(driver.host().frames_requested, 2);
    assert_eq!(backend.frames(), 1);
}

#[test]
fn render_state_is_reset_after_every_frame() {
    let mut driver = start(OcclusionMode::Occlude);
    let mut backend = SoftwareBackend::new(W, H);
    let depth = DepthFrame::uniform(4, 4, 3.0, 0.001, Mat4::IDENTITY);

    driver
        .handle(frame(Some(perspective_pose()), Some(depth), vec![floor_hit()]), &mut backend)
        .expect("frame");
    assert!(driver.render_context().is_reset());
    assert_eq!(driver.render_context().frame_count(), 1);
}

#[test]
fn placed_object_is_hidden_only_behind_nearer_real_surfaces() {
    let mut driver = start(OcclusionMode::Occlude);
    let mut backend = SoftwareBackend::new(W, H);
    let wall = |meters: f32| DepthFrame::uniform(8, 6, meters, 0.001, Mat4::IDENTITY);

    driver
        .handle(frame(Some(perspective_pose()), Some(wall(1.0)), vec![floor_hit()]), &mut backend)
        .expect("frame");
    let id = match driver.handle(HostEvent::<ScriptedFrame>::Select, &mut backend) {
        Ok(StepOutcome::Placed(Some(id))) => id,
        other => panic!("unexpected {other:?}"),
    };

    // The object sits 2 m in front of the viewer.
    driver
        .handle(frame(Some(perspective_pose()), Some(wall(1.0)), vec![floor_hit()]), &mut backend)
        .expect("frame");
    assert_eq!(backend.object_visibility(id), Some(0.0));

    driver
        .handle(frame(Some(perspective_pose()), Some(wall(3.0)), vec![floor_hit()]), &mut backend)
        .expect("frame");
    assert_eq!(backend.object_visibility(id), Some(1.0));
}

#[test]
fn empty_depth_snapshot_skips_the_depth_pass() {
    let mut driver = start(OcclusionMode::Visualize);
    let mut backend = SoftwareBackend::new(W, H);
    let empty = DepthFrame::new(0, 0, Vec::<u8>::new(), 0.001, Mat4::IDENTITY);

    let outcome = driver
        .handle(frame(Some(identity_pose()), Some(empty), vec![]), &mut backend)
        .expect("frame");
    match outcome {
        StepOutcome::Rendered(r) => {
            assert!(!r.stats.depth_uploaded);
            assert_eq!(r.stats.fullscreen_draws, 0);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(backend.color_at(0, 0), Some([0.0; 4]));
}
