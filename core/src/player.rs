//! The narrow capability the engine consumes from the audio subsystem.

use std::path::Path;

use crate::errors::PlayerError;

/// A seek the player should perform on its own clock: at (or as close as
/// possible to) `transition_time`, move the playhead to `target_time`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledJump {
    pub target_time: f64,
    pub transition_time: f64,
}

/// The player capability.
///
/// All times are seconds on the player's own clock. A scheduled jump is
/// superseded by any later [`schedule_jump`](Player::schedule_jump) or
/// explicit [`seek`](Player::seek), canceled by [`stop`](Player::stop), and
/// a no-op while paused. The engine calls [`poll`](Player::poll) once per
/// driver tick (~50 ms), which bounds the jitter of implementations that
/// service their scheduled jumps there; if jitter ever exceeds a beat, the
/// driver's resync path restores alignment on the next tick.
pub trait Player: Send + 'static {
    fn play(&mut self);
    fn pause(&mut self);
    /// Halt playback and return the playhead to 0.
    fn stop(&mut self);
    /// Move the playhead immediately; if playing, continue from there.
    fn seek(&mut self, position: f64);
    fn schedule_jump(&mut self, jump: ScheduledJump);
    /// Give the player a chance to service due scheduled jumps.
    #[inline]
    fn poll(&mut self) {}
    fn current_time(&self) -> f64;
    fn is_playing(&self) -> bool;
    fn duration_seconds(&self) -> Option<f64>;
    /// Decode and ready the sample buffer. Progress is reported as integer
    /// percent 0-99 while loading, then 100 when ready.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or decoded.
    fn load_file(&mut self, path: &Path, progress: &mut dyn FnMut(u8)) -> Result<(), PlayerError>;
    /// Tear down native resources.
    fn release(&mut self);
    /// Drop any loaded audio.
    fn clear(&mut self);
}

/// A player with a hand-driven clock and no audio device.
///
/// Used by tests and by the cli's headless simulate mode: the caller owns
/// the clock ([`set_time`](Self::set_time) / [`advance`](Self::advance)) and
/// can inspect every jump the engine scheduled.
#[derive(Debug, Default)]
pub struct MockPlayer {
    time: f64,
    playing: bool,
    duration: Option<f64>,
    pending_jump: Option<ScheduledJump>,
    /// Every jump ever scheduled, in order.
    pub scheduled: Vec<ScheduledJump>,
    /// Every explicit seek, in order.
    pub seeks: Vec<f64>,
}

impl MockPlayer {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// Move the clock forward, servicing a due scheduled jump the way a real
    /// player would.
    #[inline]
    pub fn advance(&mut self, dt: f64) {
        self.time += dt;
        self.poll();
    }

    #[inline]
    pub fn set_duration(&mut self, duration: Option<f64>) {
        self.duration = duration;
    }

    #[must_use]
    #[inline]
    pub const fn pending_jump(&self) -> Option<ScheduledJump> {
        self.pending_jump
    }
}

impl Player for MockPlayer {
    #[inline]
    fn play(&mut self) {
        self.playing = true;
    }

    #[inline]
    fn pause(&mut self) {
        self.playing = false;
    }

    #[inline]
    fn stop(&mut self) {
        self.playing = false;
        self.time = 0.0;
        self.pending_jump = None;
    }

    #[inline]
    fn seek(&mut self, position: f64) {
        self.time = position.max(0.0);
        self.pending_jump = None;
        self.seeks.push(self.time);
    }

    #[inline]
    fn schedule_jump(&mut self, jump: ScheduledJump) {
        if !self.playing {
            return;
        }
        self.pending_jump = Some(jump);
        self.scheduled.push(jump);
    }

    #[inline]
    fn poll(&mut self) {
        if let Some(jump) = self.pending_jump {
            if self.playing && self.time >= jump.transition_time {
                // carry over however far past the transition the clock ran
                self.time = jump.target_time + (self.time - jump.transition_time);
                self.pending_jump = None;
            }
        }
    }

    #[inline]
    fn current_time(&self) -> f64 {
        self.time
    }

    #[inline]
    fn is_playing(&self) -> bool {
        self.playing
    }

    #[inline]
    fn duration_seconds(&self) -> Option<f64> {
        self.duration
    }

    #[inline]
    fn load_file(&mut self, _path: &Path, progress: &mut dyn FnMut(u8)) -> Result<(), PlayerError> {
        progress(0);
        progress(100);
        Ok(())
    }

    #[inline]
    fn release(&mut self) {
        self.clear();
    }

    #[inline]
    fn clear(&mut self) {
        self.playing = false;
        self.time = 0.0;
        self.duration = None;
        self.pending_jump = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scheduled_jump_fires_at_transition() {
        let mut player = MockPlayer::new();
        player.play();
        player.set_time(1.9);
        player.schedule_jump(ScheduledJump {
            target_time: 0.05,
            transition_time: 2.0,
        });

        player.advance(0.05); // 1.95, before the transition
        assert_eq!(player.current_time(), 1.95);
        assert!(player.pending_jump().is_some());

        player.advance(0.06); // 2.01, past it
        assert!((player.current_time() - 0.06).abs() < 1e-9);
        assert!(player.pending_jump().is_none());
    }

    #[test]
    fn test_schedule_while_paused_is_a_noop() {
        let mut player = MockPlayer::new();
        player.schedule_jump(ScheduledJump {
            target_time: 0.0,
            transition_time: 1.0,
        });
        assert!(player.pending_jump().is_none());
        assert!(player.scheduled.is_empty());
    }

    #[test]
    fn test_stop_cancels_pending_jump() {
        let mut player = MockPlayer::new();
        player.play();
        player.set_time(0.5);
        player.schedule_jump(ScheduledJump {
            target_time: 0.1,
            transition_time: 1.0,
        });
        player.stop();
        assert!(player.pending_jump().is_none());
        assert_eq!(player.current_time(), 0.0);
        assert!(!player.is_playing());
    }

    #[test]
    fn test_seek_supersedes_pending_jump() {
        let mut player = MockPlayer::new();
        player.play();
        player.schedule_jump(ScheduledJump {
            target_time: 0.1,
            transition_time: 1.0,
        });
        player.seek(5.0);
        assert!(player.pending_jump().is_none());
        assert_eq!(player.current_time(), 5.0);
    }

    #[test]
    fn test_later_schedule_supersedes_earlier() {
        let mut player = MockPlayer::new();
        player.play();
        let first = ScheduledJump {
            target_time: 0.1,
            transition_time: 1.0,
        };
        let second = ScheduledJump {
            target_time: 0.2,
            transition_time: 2.0,
        };
        player.schedule_jump(first);
        player.schedule_jump(second);
        assert_eq!(player.pending_jump(), Some(second));
        assert_eq!(player.scheduled, vec![first, second]);
    }
}
