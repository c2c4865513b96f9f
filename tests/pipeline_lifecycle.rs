use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;

use driver_watch::camera::{CameraPermission, SyntheticCameraConfig};
use driver_watch::config::{AlertSettings, CameraSettings};
use driver_watch::detect::{Detection, DetectorListener, InferenceEngine};
use driver_watch::error::EngineInitError;
use driver_watch::notify::CollectingNotifier;
use driver_watch::preprocess::PreparedImage;
use driver_watch::{
    Amplitude, AudioAlarm, DetectionOutcome, Facing, Haptics, InitError, MemoryStore, Notice,
    Pipeline, PipelineParts, PipelineSettings, ScriptedEngine, StaticPermission, StoreClient,
    SyntheticCamera,
};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Call {
    Pulse,
    Play,
    Pause,
    AlarmRelease,
    Detect,
    EngineClear,
    Overlay,
}

type CallLog = Arc<Mutex<Vec<Call>>>;

fn count(log: &CallLog, call: Call) -> usize {
    log.lock().unwrap().iter().filter(|c| **c == call).count()
}

struct RecordingHaptics(CallLog);

impl Haptics for RecordingHaptics {
    fn pulse(&mut self, _duration: Duration, _amplitude: Amplitude) {
        self.0.lock().unwrap().push(Call::Pulse);
    }
}

struct RecordingAlarm {
    log: CallLog,
    playing: bool,
}

impl AudioAlarm for RecordingAlarm {
    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn play(&mut self) {
        self.playing = true;
        self.log.lock().unwrap().push(Call::Play);
    }

    fn pause(&mut self) {
        self.playing = false;
        self.log.lock().unwrap().push(Call::Pause);
    }

    fn seek_to_start(&mut self) {}

    fn release(&mut self) {
        self.log.lock().unwrap().push(Call::AlarmRelease);
    }
}

/// Wraps a scripted engine and records detect/clear calls.
struct RecordingEngine {
    inner: ScriptedEngine,
    log: CallLog,
    detect_delay: Duration,
}

impl InferenceEngine for RecordingEngine {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn setup(&mut self) -> Result<(), EngineInitError> {
        self.inner.setup()
    }

    fn detect(&mut self, image: &PreparedImage) -> Result<DetectionOutcome> {
        self.log.lock().unwrap().push(Call::Detect);
        std::thread::sleep(self.detect_delay);
        self.inner.detect(image)
    }

    fn clear(&mut self) {
        self.log.lock().unwrap().push(Call::EngineClear);
        self.inner.clear();
    }
}

struct RecordingListener(CallLog);

impl DetectorListener for RecordingListener {
    fn on_detect(&mut self, _detections: &[Detection], _inference_ms: u64) {
        self.0.lock().unwrap().push(Call::Overlay);
    }

    fn on_empty_detect(&mut self) {
        self.0.lock().unwrap().push(Call::Overlay);
    }
}

struct CountingPermission {
    granted: bool,
    requests: Arc<Mutex<u32>>,
}

impl CameraPermission for CountingPermission {
    fn is_granted(&self) -> bool {
        false
    }

    fn request(&mut self) -> bool {
        *self.requests.lock().unwrap() += 1;
        self.granted
    }
}

struct Fixture {
    log: CallLog,
    store: MemoryStore,
    client: Arc<StoreClient>,
    notifier: CollectingNotifier,
    detect_delay: Duration,
}

impl Fixture {
    fn new() -> Self {
        let store = MemoryStore::new();
        let client = Arc::new(StoreClient::start(store.clone()).unwrap());
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            store,
            client,
            notifier: CollectingNotifier::new(),
            detect_delay: Duration::ZERO,
        }
    }

    fn settings(&self, resync: Duration) -> PipelineSettings {
        PipelineSettings {
            user_id: "driver-1".to_string(),
            alert: AlertSettings {
                haptic_interval: Duration::from_millis(50),
                haptic_pulse: Duration::from_millis(10),
                resync_interval: resync,
                ..AlertSettings::default()
            },
            camera: CameraSettings {
                width: 8,
                height: 6,
                fps: 50,
                ..CameraSettings::default()
            },
        }
    }

    fn parts(
        &self,
        engine: ScriptedEngine,
        camera: SyntheticCameraConfig,
        permission: Box<dyn CameraPermission>,
    ) -> PipelineParts {
        PipelineParts {
            camera: Box::new(SyntheticCamera::new(camera)),
            permission,
            engine: Box::new(RecordingEngine {
                inner: engine,
                log: Arc::clone(&self.log),
                detect_delay: self.detect_delay,
            }),
            haptics: Box::new(RecordingHaptics(Arc::clone(&self.log))),
            alarm: Box::new(RecordingAlarm {
                log: Arc::clone(&self.log),
                playing: false,
            }),
            store: Arc::clone(&self.client),
            notifier: Arc::new(self.notifier.clone()),
            listener: Box::new(RecordingListener(Arc::clone(&self.log))),
        }
    }
}

fn small_camera() -> SyntheticCameraConfig {
    SyntheticCameraConfig {
        width: 8,
        height: 6,
        fps: 50,
        ..SyntheticCameraConfig::default()
    }
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
fn denied_permission_fails_open_without_touching_the_engine() {
    let fx = Fixture::new();
    let requests = Arc::new(Mutex::new(0));
    let permission = CountingPermission {
        granted: false,
        requests: Arc::clone(&requests),
    };
    let result = Pipeline::open(
        fx.settings(Duration::from_secs(20)),
        fx.parts(
            ScriptedEngine::constant(&["distracted"]),
            small_camera(),
            Box::new(permission),
        ),
    );

    assert!(matches!(result, Err(InitError::PermissionDenied)));
    assert_eq!(*requests.lock().unwrap(), 1);
    assert!(fx.log.lock().unwrap().is_empty());
}

#[test]
fn granted_request_opens_the_pipeline() {
    let fx = Fixture::new();
    let permission = CountingPermission {
        granted: true,
        requests: Arc::new(Mutex::new(0)),
    };
    let pipeline = Pipeline::open(
        fx.settings(Duration::from_secs(20)),
        fx.parts(
            ScriptedEngine::constant(&["focused"]),
            small_camera(),
            Box::new(permission),
        ),
    )
    .expect("pipeline opens after grant");
    pipeline.close();
}

#[test]
fn engine_setup_failure_is_an_init_error() {
    let fx = Fixture::new();
    let result = Pipeline::open(
        fx.settings(Duration::from_secs(20)),
        fx.parts(
            ScriptedEngine::new(Vec::new(), Vec::new()),
            small_camera(),
            Box::new(StaticPermission::granted()),
        ),
    );
    assert!(matches!(result, Err(InitError::Engine(_))));
}

#[test]
fn sustained_alert_persists_entry_and_resyncs() {
    let fx = Fixture::new();
    let pipeline = Pipeline::open(
        fx.settings(Duration::from_millis(100)),
        fx.parts(
            ScriptedEngine::constant(&["distracted"]),
            small_camera(),
            Box::new(StaticPermission::granted()),
        ),
    )
    .unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        pipeline
            .snapshot()
            .map(|s| s.events_issued >= 3)
            .unwrap_or(false)
    }));
    let snapshot = pipeline.snapshot().unwrap();
    assert!(snapshot.alert.is_alerting());
    assert!(snapshot.bound);
    assert_eq!(snapshot.facing, Facing::Front);
    pipeline.close();

    assert!(fx.store.len() >= 3);
    for path in fx.store.paths() {
        assert!(path.starts_with("history/driver-1/"));
        let value = fx.store.get(&path).unwrap();
        assert_eq!(value["cls"], "distracted");
        assert_eq!(value["userId"], "driver-1");
    }
    assert_eq!(count(&fx.log, Call::Play), 1);
    assert!(count(&fx.log, Call::Pulse) >= 2);
    assert!(count(&fx.log, Call::Overlay) >= 1);
    assert!(matches!(
        fx.notifier.notices().first(),
        Some(Notice::BehaviorDetected { class }) if class == "distracted"
    ));
}

/// Calls recorded after the engine was cleared.
fn calls_after_engine_clear(log: &CallLog) -> Vec<Call> {
    let log = log.lock().unwrap();
    let cleared_at = log
        .iter()
        .position(|c| *c == Call::EngineClear)
        .expect("engine cleared");
    log[cleared_at + 1..].to_vec()
}

#[test]
fn close_releases_engine_and_alarm_exactly_once_and_goes_quiet() {
    let fx = Fixture::new();
    let pipeline = Pipeline::open(
        fx.settings(Duration::from_millis(100)),
        fx.parts(
            ScriptedEngine::constant(&["distracted"]),
            small_camera(),
            Box::new(StaticPermission::granted()),
        ),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(5), || count(&fx.log, Call::Pulse) >= 1));

    pipeline.close();
    let calls_at_close = fx.log.lock().unwrap().len();
    fx.client.flush().unwrap();
    let stored_at_close = fx.store.len();
    std::thread::sleep(Duration::from_millis(300));

    assert_eq!(count(&fx.log, Call::EngineClear), 1);
    assert_eq!(count(&fx.log, Call::AlarmRelease), 1);
    assert_eq!(fx.log.lock().unwrap().len(), calls_at_close);
    fx.client.flush().unwrap();
    assert_eq!(fx.store.len(), stored_at_close);

    // Once the engine is cleared only the alarm is paused and released.
    let after = calls_after_engine_clear(&fx.log);
    assert!(
        after
            .iter()
            .all(|c| matches!(c, Call::Pause | Call::AlarmRelease)),
        "calls after engine clear: {:?}",
        after
    );
}

#[test]
fn outcome_in_flight_at_close_does_not_start_an_alert() {
    let fx = Fixture {
        detect_delay: Duration::from_millis(400),
        ..Fixture::new()
    };
    let pipeline = Pipeline::open(
        fx.settings(Duration::from_millis(100)),
        fx.parts(
            ScriptedEngine::constant(&["distracted"]),
            small_camera(),
            Box::new(StaticPermission::granted()),
        ),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(5), || count(&fx.log, Call::Detect) >= 1));
    std::thread::sleep(Duration::from_millis(50));

    // The first detect is still running when close begins.
    assert_eq!(count(&fx.log, Call::EngineClear), 0);
    pipeline.close();
    std::thread::sleep(Duration::from_millis(100));
    fx.client.flush().unwrap();

    let after = calls_after_engine_clear(&fx.log);
    assert!(
        after.iter().all(|c| *c == Call::AlarmRelease),
        "calls after engine clear: {:?}",
        after
    );
    assert_eq!(count(&fx.log, Call::Pulse), 0);
    assert_eq!(count(&fx.log, Call::Play), 0);
    assert_eq!(count(&fx.log, Call::AlarmRelease), 1);
    assert!(fx.store.is_empty());
    assert!(!fx
        .notifier
        .notices()
        .iter()
        .any(|n| matches!(n, Notice::BehaviorDetected { .. })));
}

#[test]
fn focused_driver_never_alerts() {
    let fx = Fixture::new();
    let pipeline = Pipeline::open(
        fx.settings(Duration::from_millis(100)),
        fx.parts(
            ScriptedEngine::constant(&["focused"]),
            small_camera(),
            Box::new(StaticPermission::granted()),
        ),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        pipeline.worker_stats().analyzed() >= 5
    }));
    let snapshot = pipeline.snapshot().unwrap();
    pipeline.close();

    assert!(!snapshot.alert.is_alerting());
    assert_eq!(snapshot.events_issued, 0);
    assert!(fx.store.is_empty());
    assert_eq!(count(&fx.log, Call::Pulse), 0);
    assert_eq!(count(&fx.log, Call::AlarmRelease), 1);
}

#[test]
fn toggle_failure_leaves_camera_unbound_and_recoverable() {
    let fx = Fixture::new();
    let camera = SyntheticCameraConfig {
        unavailable: HashSet::from([Facing::Back]),
        ..small_camera()
    };
    let pipeline = Pipeline::open(
        fx.settings(Duration::from_secs(20)),
        fx.parts(
            ScriptedEngine::constant(&["focused"]),
            camera,
            Box::new(StaticPermission::granted()),
        ),
    )
    .unwrap();
    assert!(pipeline.snapshot().unwrap().bound);

    assert!(pipeline.toggle_camera().is_err());
    let snapshot = pipeline.snapshot().unwrap();
    assert!(!snapshot.bound);
    assert_eq!(snapshot.facing, Facing::Back);
    assert!(fx
        .notifier
        .notices()
        .iter()
        .any(|n| matches!(n, Notice::CameraBindingFailed { .. })));

    assert_eq!(pipeline.toggle_camera().unwrap(), Facing::Front);
    assert!(pipeline.snapshot().unwrap().bound);
    pipeline.close();
}

#[test]
fn initial_bind_failure_is_not_fatal() {
    let fx = Fixture::new();
    let camera = SyntheticCameraConfig {
        unavailable: HashSet::from([Facing::Front]),
        ..small_camera()
    };
    let pipeline = Pipeline::open(
        fx.settings(Duration::from_secs(20)),
        fx.parts(
            ScriptedEngine::constant(&["focused"]),
            camera,
            Box::new(StaticPermission::granted()),
        ),
    )
    .expect("binding errors do not block open");

    assert!(!pipeline.snapshot().unwrap().bound);
    assert!(pipeline.rebind().is_err());
    assert_eq!(pipeline.toggle_camera().unwrap(), Facing::Back);
    assert!(pipeline.rebind().is_ok());
    assert!(pipeline.snapshot().unwrap().bound);
    pipeline.close();
}
