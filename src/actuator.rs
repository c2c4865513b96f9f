//! Haptic and audio actuators.
//!
//! `ActuatorController` drives both in lockstep with the alert state:
//! - haptics: a cancelable periodic loop, one fixed-length pulse per tick
//! - audio: a looping alarm clip; stopping pauses and rewinds, it does not release
//!
//! `release` is unconditional teardown and happens exactly once.

use std::time::{Duration, Instant};

use anyhow::Result;

use crate::alert::PeriodicTask;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Amplitude {
    Default,
}

/// Platform vibration primitive.
pub trait Haptics: Send {
    fn pulse(&mut self, duration: Duration, amplitude: Amplitude);
}

/// Platform audio primitive for one looped clip.
pub trait AudioAlarm: Send {
    /// Prepare the clip for looped playback.
    fn load(&mut self) -> Result<()>;

    fn is_playing(&self) -> bool;

    fn play(&mut self);

    fn pause(&mut self);

    fn seek_to_start(&mut self);

    fn release(&mut self);
}

/// Haptics for hosts without a vibrator: logs each pulse.
#[derive(Debug, Default)]
pub struct LogHaptics {
    pulses: u64,
}

impl Haptics for LogHaptics {
    fn pulse(&mut self, duration: Duration, amplitude: Amplitude) {
        self.pulses += 1;
        log::info!(
            "haptics: pulse #{} ({}ms, {:?})",
            self.pulses,
            duration.as_millis(),
            amplitude
        );
    }
}

/// Alarm for hosts without audio output: tracks play state and logs it.
#[derive(Debug)]
pub struct LogAlarm {
    clip: String,
    loaded: bool,
    playing: bool,
}

impl LogAlarm {
    pub fn new(clip: impl Into<String>) -> Self {
        Self {
            clip: clip.into(),
            loaded: false,
            playing: false,
        }
    }
}

impl AudioAlarm for LogAlarm {
    fn load(&mut self) -> Result<()> {
        self.loaded = true;
        log::debug!("alarm: loaded '{}' (looping)", self.clip);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn play(&mut self) {
        if self.loaded {
            self.playing = true;
            log::warn!("alarm: playing '{}'", self.clip);
        }
    }

    fn pause(&mut self) {
        self.playing = false;
        log::info!("alarm: paused '{}'", self.clip);
    }

    fn seek_to_start(&mut self) {}

    fn release(&mut self) {
        self.playing = false;
        self.loaded = false;
        log::debug!("alarm: released '{}'", self.clip);
    }
}

pub struct ActuatorController {
    haptics: Box<dyn Haptics>,
    alarm: Option<Box<dyn AudioAlarm>>,
    haptic_loop: PeriodicTask,
    pulse: Duration,
    amplitude: Amplitude,
    released: bool,
}

impl ActuatorController {
    /// An alarm that fails to load is dropped with a warning; alerts continue
    /// with haptics only.
    pub fn new(
        haptics: Box<dyn Haptics>,
        alarm: Box<dyn AudioAlarm>,
        haptic_interval: Duration,
        pulse: Duration,
    ) -> Self {
        let mut alarm = alarm;
        let alarm = match alarm.load() {
            Ok(()) => Some(alarm),
            Err(e) => {
                log::warn!("alarm clip unavailable, continuing without audio: {}", e);
                None
            }
        };
        Self {
            haptics,
            alarm,
            haptic_loop: PeriodicTask::new(haptic_interval),
            pulse,
            amplitude: Amplitude::Default,
            released: false,
        }
    }

    /// Begin the haptic loop (first pulse right away) and the alarm.
    pub fn engage(&mut self, now: Instant) {
        if self.released {
            return;
        }
        if self.haptic_loop.start_immediate(now) {
            self.poll(now);
        }
        if let Some(alarm) = self.alarm.as_mut() {
            if !alarm.is_playing() {
                alarm.play();
            }
        }
    }

    /// Cancel the haptic loop, pause and rewind the alarm.
    pub fn disengage(&mut self) {
        self.haptic_loop.cancel();
        if let Some(alarm) = self.alarm.as_mut() {
            if alarm.is_playing() {
                alarm.pause();
                alarm.seek_to_start();
            }
        }
    }

    /// Fire a pulse if the haptic loop is due.
    pub fn poll(&mut self, now: Instant) {
        if self.released {
            return;
        }
        if self.haptic_loop.poll(now) {
            self.haptics.pulse(self.pulse, self.amplitude);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.haptic_loop.next_due()
    }

    /// Cancel the haptic loop and release the alarm. Returns `false` if already released.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.haptic_loop.cancel();
        if let Some(mut alarm) = self.alarm.take() {
            alarm.release();
        }
        self.released = true;
        true
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum ActuatorCall {
        Pulse,
        Load,
        Play,
        Pause,
        Seek,
        Release,
    }

    pub type CallLog = Arc<Mutex<Vec<ActuatorCall>>>;

    pub struct RecordingHaptics(pub CallLog);

    impl Haptics for RecordingHaptics {
        fn pulse(&mut self, _duration: Duration, _amplitude: Amplitude) {
            self.0.lock().unwrap().push(ActuatorCall::Pulse);
        }
    }

    pub struct RecordingAlarm {
        pub log: CallLog,
        pub playing: bool,
        pub fail_load: bool,
    }

    impl AudioAlarm for RecordingAlarm {
        fn load(&mut self) -> Result<()> {
            self.log.lock().unwrap().push(ActuatorCall::Load);
            if self.fail_load {
                anyhow::bail!("clip missing");
            }
            Ok(())
        }

        fn is_playing(&self) -> bool {
            self.playing
        }

        fn play(&mut self) {
            self.playing = true;
            self.log.lock().unwrap().push(ActuatorCall::Play);
        }

        fn pause(&mut self) {
            self.playing = false;
            self.log.lock().unwrap().push(ActuatorCall::Pause);
        }

        fn seek_to_start(&mut self) {
            self.log.lock().unwrap().push(ActuatorCall::Seek);
        }

        fn release(&mut self) {
            self.log.lock().unwrap().push(ActuatorCall::Release);
        }
    }

    pub fn recording_controller(log: &CallLog) -> ActuatorController {
        ActuatorController::new(
            Box::new(RecordingHaptics(Arc::clone(log))),
            Box::new(RecordingAlarm {
                log: Arc::clone(log),
                playing: false,
                fail_load: false,
            }),
            Duration::from_millis(1000),
            Duration::from_millis(500),
        )
    }

    pub fn count(log: &CallLog, call: ActuatorCall) -> usize {
        log.lock().unwrap().iter().filter(|c| **c == call).count()
    }
}
