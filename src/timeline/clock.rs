// Playback clock
// Single-writer transport that publishes the playback position to any number of readers

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::sync::watch;

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "stopped"),
            TransportState::Playing => write!(f, "playing"),
            TransportState::Paused => write!(f, "paused"),
        }
    }
}

/// One published reading of the clock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackTick {
    /// Position in seconds, within [0, duration]
    pub time: f64,
    pub state: TransportState,
    /// Set once playback has run to the end of the composition
    pub ended: bool,
}

impl PlaybackTick {
    fn stopped_at(time: f64) -> Self {
        PlaybackTick {
            time,
            state: TransportState::Stopped,
            ended: false,
        }
    }
}

/// Transport over a fixed duration.
///
/// The clock is the only writer of the playback position. Readers obtained
/// from [`PlaybackClock::subscribe`] see every value published by `tick`,
/// `seek` and the transport controls.
pub struct PlaybackClock {
    duration: f64,
    state: TransportState,
    /// Position at the moment `anchor` was taken
    offset: f64,
    anchor: Option<Instant>,
    ended: bool,
    tx: watch::Sender<PlaybackTick>,
}

impl PlaybackClock {
    pub fn new(duration: f64) -> Self {
        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        let (tx, _) = watch::channel(PlaybackTick::stopped_at(0.0));

        PlaybackClock {
            duration,
            state: TransportState::Stopped,
            offset: 0.0,
            anchor: None,
            ended: false,
            tx,
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn subscribe(&self) -> PlaybackPosition {
        PlaybackPosition {
            rx: self.tx.subscribe(),
        }
    }

    /// Position at `now` without publishing it
    pub fn position_at(&self, now: Instant) -> f64 {
        let elapsed = match (self.state, self.anchor) {
            (TransportState::Playing, Some(anchor)) => {
                now.saturating_duration_since(anchor).as_secs_f64()
            }
            _ => 0.0,
        };

        (self.offset + elapsed).min(self.duration)
    }

    pub fn position(&self) -> f64 {
        self.position_at(Instant::now())
    }

    /// Start or resume. Playing from the end restarts at 0.
    pub fn play_at(&mut self, now: Instant) {
        if self.state == TransportState::Playing {
            return;
        }
        if self.offset >= self.duration {
            self.offset = 0.0;
        }

        self.state = TransportState::Playing;
        self.anchor = Some(now);
        self.ended = false;
        log::debug!("Transport playing from {:.3}s", self.offset);
        self.publish(self.offset);
    }

    pub fn pause_at(&mut self, now: Instant) {
        if self.state != TransportState::Playing {
            return;
        }

        self.offset = self.position_at(now);
        self.state = TransportState::Paused;
        self.anchor = None;
        log::debug!("Transport paused at {:.3}s", self.offset);
        self.publish(self.offset);
    }

    pub fn toggle_at(&mut self, now: Instant) {
        if self.is_playing() {
            self.pause_at(now);
        } else {
            self.play_at(now);
        }
    }

    pub fn play(&mut self) {
        self.play_at(Instant::now());
    }

    pub fn pause(&mut self) {
        self.pause_at(Instant::now());
    }

    pub fn toggle(&mut self) {
        self.toggle_at(Instant::now());
    }

    /// Stop and rewind to 0
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.offset = 0.0;
        self.anchor = None;
        self.ended = false;
        self.publish(0.0);
    }

    /// Move to `time`, clamped to [0, duration]. A playing transport keeps playing.
    pub fn seek_at(&mut self, time: f64, now: Instant) {
        let time = if time.is_finite() {
            time.clamp(0.0, self.duration)
        } else {
            0.0
        };

        self.offset = time;
        self.ended = false;
        if self.state == TransportState::Playing {
            self.anchor = Some(now);
        }
        self.publish(time);
    }

    pub fn seek(&mut self, time: f64) {
        self.seek_at(time, Instant::now());
    }

    /// Scrubber mapping: `percent` in 0..=100 to `percent / 100 * duration`
    pub fn seek_percent(&mut self, percent: f64) {
        self.seek(percent / 100.0 * self.duration);
    }

    /// Advance to `now` and publish the position.
    ///
    /// Reaching the duration stops the transport and reports `ended`.
    pub fn tick_at(&mut self, now: Instant) -> PlaybackTick {
        let time = self.position_at(now);

        if self.state == TransportState::Playing && time >= self.duration {
            self.offset = self.duration;
            self.state = TransportState::Stopped;
            self.anchor = None;
            self.ended = true;
            log::debug!("Transport reached end at {:.3}s", self.duration);
        }

        self.publish(time)
    }

    pub fn tick(&mut self) -> PlaybackTick {
        self.tick_at(Instant::now())
    }

    fn publish(&self, time: f64) -> PlaybackTick {
        let tick = PlaybackTick {
            time,
            state: self.state,
            ended: self.ended,
        };
        self.tx.send_replace(tick);
        tick
    }
}

/// Read side of a [`PlaybackClock`]
#[derive(Clone)]
pub struct PlaybackPosition {
    rx: watch::Receiver<PlaybackTick>,
}

impl PlaybackPosition {
    /// Latest published reading
    pub fn current(&self) -> PlaybackTick {
        *self.rx.borrow()
    }

    pub fn time(&self) -> f64 {
        self.current().time
    }

    /// Wait for the next published reading. Returns `None` once the clock is dropped.
    pub async fn changed(&mut self) -> Option<PlaybackTick> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

/// Format seconds as `m:ss`
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

/// Position as a 0..=100 scrubber value; 0 when there is nothing to play
pub fn progress_percent(time: f64, duration: f64) -> f64 {
    if duration <= 0.0 || !time.is_finite() {
        return 0.0;
    }
    (time / duration * 100.0).clamp(0.0, 100.0)
}
