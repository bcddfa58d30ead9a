//! The rodio-backed player.
//!
//! One output stream, one sink, one seekable decoder. Scheduled jumps are
//! serviced from [`Player::poll`], which the driver calls every tick, so
//! their jitter is bounded by the tick interval.
#![allow(clippy::module_name_repetitions)]

use std::{fs::File, io::BufReader, path::Path, time::Duration};

use log::{debug, error};
use rodio::{Source, decoder::DecoderBuilder, source::SeekError};

use crate::errors::PlayerError;
use crate::player::{Player, ScheduledJump};

pub struct RodioPlayer {
    /// this is not used, but is needed to keep the stream alive
    _music_output: rodio::OutputStream,
    sink: rodio::Sink,
    duration: Option<f64>,
    pending_jump: Option<ScheduledJump>,
}

impl RodioPlayer {
    /// Open the default audio device.
    ///
    /// # Errors
    ///
    /// Returns an error if no output stream can be opened.
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn new() -> Result<Self, PlayerError> {
        let stream = rodio::OutputStreamBuilder::open_default_stream()
            .map_err(|e| PlayerError::Device(e.to_string()))?;
        let sink = rodio::Sink::connect_new(stream.mixer());
        sink.pause();

        Ok(Self {
            _music_output: stream,
            sink,
            duration: None,
            pending_jump: None,
        })
    }

    fn seek_to(&mut self, position: f64) {
        let target = Duration::from_secs_f64(position.max(0.0));
        match self.sink.try_seek(target) {
            Ok(()) => debug!("seek to {position:.3}s"),
            Err(SeekError::NotSupported { underlying_source }) => {
                error!("Seek not supported by source: {underlying_source}");
            }
            Err(err) => {
                error!("Seeking failed with error: {err}");
            }
        }
    }
}

impl Player for RodioPlayer {
    #[inline]
    fn play(&mut self) {
        if !self.sink.empty() {
            self.sink.play();
        }
    }

    #[inline]
    fn pause(&mut self) {
        self.sink.pause();
    }

    #[inline]
    fn stop(&mut self) {
        self.sink.pause();
        self.pending_jump = None;
        self.seek_to(0.0);
    }

    #[inline]
    fn seek(&mut self, position: f64) {
        self.pending_jump = None;
        self.seek_to(position);
    }

    #[inline]
    fn schedule_jump(&mut self, jump: ScheduledJump) {
        if !self.is_playing() {
            return;
        }
        self.pending_jump = Some(jump);
    }

    #[inline]
    fn poll(&mut self) {
        let Some(jump) = self.pending_jump else {
            return;
        };
        if !self.is_playing() {
            return;
        }
        if self.current_time() >= jump.transition_time {
            self.pending_jump = None;
            self.seek_to(jump.target_time);
        }
    }

    #[inline]
    fn current_time(&self) -> f64 {
        self.sink.get_pos().as_secs_f64()
    }

    #[inline]
    fn is_playing(&self) -> bool {
        !self.sink.is_paused() && !self.sink.empty()
    }

    #[inline]
    fn duration_seconds(&self) -> Option<f64> {
        self.duration
    }

    #[allow(clippy::missing_inline_in_public_items)]
    fn load_file(&mut self, path: &Path, progress: &mut dyn FnMut(u8)) -> Result<(), PlayerError> {
        progress(0);
        let file = File::open(path)?;
        let byte_len = file.metadata()?.len();
        progress(10);

        let decoder = DecoderBuilder::new()
            .with_data(BufReader::new(file))
            .with_byte_len(byte_len)
            .with_seekable(true)
            .with_coarse_seek(true)
            .with_gapless(true)
            .build()
            .map_err(|e| PlayerError::Decode(e.to_string()))?;
        self.duration = decoder.total_duration().map(|d| d.as_secs_f64());
        progress(99);

        self.sink.clear();
        self.sink.append(decoder);
        progress(100);
        debug!(
            "loaded {} ({:?}s)",
            path.display(),
            self.duration.map(|d| d.round())
        );

        Ok(())
    }

    #[inline]
    fn release(&mut self) {
        self.clear();
    }

    #[inline]
    fn clear(&mut self) {
        self.sink.clear();
        self.duration = None;
        self.pending_jump = None;
    }
}
