//! Audio output: a music sink with volume control and a separate voice sink
//! for announcement clips.

use crate::error::{RadioError, Result};
use crate::track::Track;
use lofty::file::AudioFile;
use lofty::probe::Probe;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Fade resolution.
pub const FADE_STEP: Duration = Duration::from_millis(50);
const CLIP_POLL: Duration = Duration::from_millis(50);
/// Extra time a clip may run past its expected length before it is abandoned.
pub const CLIP_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

pub trait AudioOutput {
    /// Start `track` from the beginning on a fresh sink, replacing whatever
    /// was playing.
    fn play_track(&mut self, track: &Track, volume: f32) -> Result<()>;
    fn stop_track(&mut self);
    fn set_volume(&mut self, volume: f32);
    fn volume(&self) -> f32;
    /// Elapsed time in the current track.
    fn position(&self) -> Duration;
    /// True when the music sink has drained (or was never started).
    fn track_finished(&self) -> bool;

    fn play_clip(&mut self, bytes: &[u8]) -> Result<()>;
    fn clip_finished(&self) -> bool;
    fn stop_clip(&mut self);
}

/// Runtime audio output wrapping rodio. Created once per session.
pub struct RodioOutput {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    music: Option<Sink>,
    voice: Option<Sink>,
    volume: f32,
}

impl RodioOutput {
    pub fn new() -> Result<Self> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| RadioError::Playback(format!("failed to open audio output: {}", e)))?;
        Ok(RodioOutput {
            _stream: stream,
            handle,
            music: None,
            voice: None,
            volume: 1.0,
        })
    }

    fn create_sink(&self) -> Result<Sink> {
        Sink::try_new(&self.handle)
            .map_err(|e| RadioError::Playback(format!("failed to create sink: {}", e)))
    }
}

impl AudioOutput for RodioOutput {
    fn play_track(&mut self, track: &Track, volume: f32) -> Result<()> {
        let file = File::open(&track.path).map_err(|e| {
            RadioError::Playback(format!("cannot open '{}': {}", track.path.display(), e))
        })?;
        let source = Decoder::new(BufReader::new(file)).map_err(|e| {
            RadioError::Playback(format!("cannot decode '{}': {}", track.path.display(), e))
        })?;

        let sink = self.create_sink()?;
        sink.set_volume(volume);
        sink.append(source);
        sink.play();

        if let Some(old) = self.music.replace(sink) {
            old.stop();
        }
        self.volume = volume;
        Ok(())
    }

    fn stop_track(&mut self) {
        if let Some(sink) = self.music.take() {
            sink.stop();
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(sink) = &self.music {
            sink.set_volume(self.volume);
        }
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn position(&self) -> Duration {
        self.music.as_ref().map(Sink::get_pos).unwrap_or_default()
    }

    fn track_finished(&self) -> bool {
        self.music.as_ref().is_none_or(Sink::empty)
    }

    fn play_clip(&mut self, bytes: &[u8]) -> Result<()> {
        let source = Decoder::new(Cursor::new(bytes.to_vec()))
            .map_err(|e| RadioError::Playback(format!("cannot decode announcement clip: {}", e)))?;
        let sink = self.create_sink()?;
        sink.append(source);
        sink.play();
        if let Some(old) = self.voice.replace(sink) {
            old.stop();
        }
        Ok(())
    }

    fn clip_finished(&self) -> bool {
        self.voice.as_ref().is_none_or(Sink::empty)
    }

    fn stop_clip(&mut self) {
        if let Some(sink) = self.voice.take() {
            sink.stop();
        }
    }
}

/// Length of an encoded clip, read from its container headers.
pub fn decode_duration(bytes: &[u8]) -> Option<Duration> {
    let probe = Probe::new(Cursor::new(bytes)).guess_file_type().ok()?;
    let tagged = probe.read().ok()?;
    let duration = tagged.properties().duration();
    (!duration.is_zero()).then_some(duration)
}

/// Step the music volume from its current level to `target` over
/// `duration`, about 50ms per step.
pub async fn fade_volume<O: AudioOutput + ?Sized>(output: &mut O, target: f32, duration: Duration) {
    let start = output.volume();
    let steps = (duration.as_millis() / FADE_STEP.as_millis()).max(1) as u32;
    let step_duration = duration / steps;

    for step in 1..=steps {
        let t = step as f32 / steps as f32;
        output.set_volume(start + (target - start) * t);
        tokio::time::sleep(step_duration).await;
    }
    output.set_volume(target);
}

/// Play one clip and wait for it to drain. Gives up `CLIP_TIMEOUT_SLACK`
/// after its expected length. `on_poll` runs on every poll while waiting.
pub async fn play_clip_through<O, F>(
    output: &mut O,
    bytes: &[u8],
    expected: Duration,
    mut on_poll: F,
) -> Result<()>
where
    O: AudioOutput + ?Sized,
    F: FnMut(&mut O) -> Result<()>,
{
    output.play_clip(bytes)?;
    let deadline = Instant::now() + expected + CLIP_TIMEOUT_SLACK;
    loop {
        on_poll(output)?;
        if output.clip_finished() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            warn!(?expected, "announcement clip overran, stopping it");
            output.stop_clip();
            return Err(RadioError::Playback("announcement clip did not finish".into()));
        }
        tokio::time::sleep(CLIP_POLL).await;
    }
}

/// Wait `duration`, running `on_poll` at the usual poll rate and once more
/// at the end.
pub async fn hold<O, F>(output: &mut O, duration: Duration, mut on_poll: F) -> Result<()>
where
    O: AudioOutput + ?Sized,
    F: FnMut(&mut O) -> Result<()>,
{
    let deadline = Instant::now() + duration;
    loop {
        on_poll(output)?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        tokio::time::sleep((deadline - now).min(CLIP_POLL)).await;
    }
}
