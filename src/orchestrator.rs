//! Transition orchestrator: decides when an announcement is due, generates it
//! behind the playing track, and choreographs the fade/announce/fade-in
//! sequence at the track boundary.
//!
//! Runs as a single task. User commands arrive over an unbounded channel
//! (`OrchestratorHandle`); the track position is polled on a fixed tick.
//! Generation runs in one spawned task at a time and is never cancelled:
//! a discarded task drains in the background and no new one starts until it
//! has settled.

use crate::announcer::{AnnouncementResult, Announcer};
use crate::config::RadioSettings;
use crate::context::TransitionContext;
use crate::error::{RadioError, Result};
use crate::playback::{AudioOutput, fade_volume, hold, play_clip_through};
use crate::playlist::TrackCatalog;
use crate::track::Track;
use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Remaining play time at which a ready announcement starts its fade.
pub const ANTICIPATION_WINDOW: Duration = Duration::from_secs(5);
/// Music level under an announcement. Never zero: the bed stays audible.
pub const BACKGROUND_VOLUME: f32 = 0.2;
pub const DIALOGUE_GAP: Duration = Duration::from_millis(350);
/// The next track comes in this long before the announcement ends...
pub const BRING_UP_LEAD: Duration = Duration::from_secs(15);
/// ...but never earlier than this after it starts.
pub const BRING_UP_FLOOR: Duration = Duration::from_secs(3);
/// Minimum hold at background level between the end of speech and the fade-in.
pub const POST_SILENCE_FLOOR: Duration = Duration::from_secs(5);
/// Fade used when the decision is made at the track end.
pub const REACTIVE_FADE: Duration = Duration::from_millis(1500);
/// "Previous" sent within this long after announcement speech ends replays it.
pub const REPLAY_WINDOW: Duration = Duration::from_secs(5);
const REPLAY_DUCK: Duration = Duration::from_millis(800);
pub const MONITOR_TICK: Duration = Duration::from_millis(250);

// ── Phases ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Playing,
    PendingGeneration,
    FadingOut,
    PreSilence,
    Announcing,
    BackgroundBringUp,
    PostSilence,
    FadingIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    PreGenerationStarted,
    PreGenerationSettled,
    FadeTriggered,
    FadeOutComplete,
    PreSilenceElapsed,
    BackgroundCueReached,
    SpeechFinished,
    PostSilenceElapsed,
    FadeInComplete,
    Failed,
}

impl Phase {
    /// Pure transition function. Events that make no sense in the current
    /// phase leave it unchanged.
    pub fn on(self, event: PhaseEvent) -> Phase {
        use Phase::*;
        use PhaseEvent::*;
        match (self, event) {
            (_, Failed) => Playing,
            (Playing, PreGenerationStarted) => PendingGeneration,
            (PendingGeneration, PreGenerationSettled) => Playing,
            (Playing | PendingGeneration, FadeTriggered) => FadingOut,
            (FadingOut, FadeOutComplete) => PreSilence,
            (PreSilence, PreSilenceElapsed) => Announcing,
            (Announcing, BackgroundCueReached) => BackgroundBringUp,
            (BackgroundBringUp, SpeechFinished) => PostSilence,
            (PostSilence, PostSilenceElapsed) => FadingIn,
            (FadingIn, FadeInComplete) => Playing,
            (phase, _) => phase,
        }
    }
}

/// Delay from announcement start to starting the next track under it.
pub fn bring_up_delay(total: Duration, lead: Duration, floor: Duration) -> Duration {
    total.saturating_sub(lead).max(floor)
}

// ── Generation slot ──────────────────────────────────────────────────────────

/// The single pending-announcement slot. Every variant but `Idle` remembers
/// which upcoming track it was made for.
enum GenerationSlot {
    Idle,
    InFlight {
        target: Track,
        handle: JoinHandle<Result<AnnouncementResult>>,
    },
    Ready {
        target: Track,
        result: AnnouncementResult,
    },
    /// Generation for `target` failed; that boundary is skipped.
    Failed { target: Track },
}

impl GenerationSlot {
    fn is_idle(&self) -> bool {
        matches!(self, GenerationSlot::Idle)
    }

    fn is_in_flight(&self) -> bool {
        matches!(self, GenerationSlot::InFlight { .. })
    }

    fn target(&self) -> Option<&Track> {
        match self {
            GenerationSlot::Idle => None,
            GenerationSlot::InFlight { target, .. }
            | GenerationSlot::Ready { target, .. }
            | GenerationSlot::Failed { target } => Some(target),
        }
    }

    async fn join(&mut self) -> std::result::Result<Result<AnnouncementResult>, JoinError> {
        match self {
            GenerationSlot::InFlight { handle, .. } => handle.await,
            _ => std::future::pending().await,
        }
    }
}

// ── Commands ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Next,
    Previous,
    SetRadioEnabled(bool),
    ResetSession,
    Stop,
}

/// A command stamped with when it was sent. Commands wait while a
/// transition runs, so time-sensitive ones are judged by `sent_at`.
#[derive(Debug, Clone, Copy)]
pub struct Request {
    pub command: Command,
    pub sent_at: Instant,
}

/// Cloneable sender for orchestrator commands.
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<Request>,
}

impl OrchestratorHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Request>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (OrchestratorHandle { tx }, rx)
    }

    pub fn send(&self, command: Command) {
        let _ = self.tx.send(Request {
            command,
            sent_at: Instant::now(),
        });
    }

    pub fn next(&self) {
        self.send(Command::Next);
    }

    pub fn previous(&self) {
        self.send(Command::Previous);
    }

    pub fn set_radio_enabled(&self, enabled: bool) {
        self.send(Command::SetRadioEnabled(enabled));
    }

    pub fn reset_session(&self) {
        self.send(Command::ResetSession);
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }
}

async fn drain(handle: &mut Option<JoinHandle<Result<AnnouncementResult>>>) {
    match handle {
        Some(handle) => {
            let _ = handle.await;
        }
        None => std::future::pending().await,
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

pub struct Orchestrator<O: AudioOutput> {
    output: O,
    catalog: Box<dyn TrackCatalog>,
    announcer: Arc<Announcer>,
    settings: RadioSettings,
    phase: Phase,
    slot: GenerationSlot,
    /// A discarded in-flight generation, left to finish on its own.
    draining: Option<JoinHandle<Result<AnnouncementResult>>>,
    /// Last announcement and when its speech ended.
    last_played: Option<(AnnouncementResult, Instant)>,
    /// The gate has already counted the boundary after the current track.
    gate_consumed: bool,
    fading: bool,
    announcing: Arc<AtomicBool>,
}

impl<O: AudioOutput> Orchestrator<O> {
    pub fn new(
        output: O,
        catalog: Box<dyn TrackCatalog>,
        announcer: Arc<Announcer>,
        settings: RadioSettings,
    ) -> Self {
        Orchestrator {
            output,
            catalog,
            announcer,
            settings,
            phase: Phase::Playing,
            slot: GenerationSlot::Idle,
            draining: None,
            last_played: None,
            gate_consumed: false,
            fading: false,
            announcing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &RadioSettings {
        &self.settings
    }

    pub fn current_track(&self) -> Option<Track> {
        self.catalog.current()
    }

    /// True while announcement speech is audible.
    pub fn announcing_flag(&self) -> Arc<AtomicBool> {
        self.announcing.clone()
    }

    /// Play until the catalog runs out or `Stop` arrives.
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<Request>) -> Result<()> {
        if !self.start_current() {
            info!("nothing to play");
            return Ok(());
        }

        let mut tick = tokio::time::interval(MONITOR_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                request = commands.recv() => match request {
                    None => break,
                    Some(Request { command: Command::Stop, .. }) => break,
                    Some(request) => {
                        if !self.handle_command(request).await {
                            break;
                        }
                    }
                },
                joined = self.slot.join(), if self.slot.is_in_flight() => {
                    self.settle_generation(joined);
                }
                _ = drain(&mut self.draining), if self.draining.is_some() => {
                    self.draining = None;
                    debug!("discarded generation settled");
                    if !self.gate_consumed {
                        self.maybe_pregenerate();
                    }
                }
                _ = tick.tick() => {
                    if !self.on_tick().await {
                        info!("playlist finished");
                        break;
                    }
                }
            }
        }

        self.output.stop_clip();
        self.output.stop_track();
        self.announcing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn transition(&mut self, event: PhaseEvent) {
        let next = self.phase.on(event);
        if next != self.phase {
            debug!(from = ?self.phase, to = ?next, ?event, "phase change");
        }
        self.phase = next;
    }

    /// Settings are re-read at the start of every transition cycle so edits
    /// made elsewhere take effect.
    fn refresh_settings(&mut self) {
        if let Some(path) = self.settings.state_path().map(|p| p.to_path_buf()) {
            self.settings = RadioSettings::load_from(&path);
        }
    }

    fn consume_gate(&mut self) -> bool {
        self.gate_consumed = true;
        let due = self.settings.gate.consume();
        if let Err(e) = self.settings.save() {
            warn!("could not persist gate counter: {}", e);
        }
        debug!(due, count = self.settings.gate.songs_since_last, "gate consumed");
        due
    }

    fn record_song(&self, track: &Track) {
        self.announcer.script().record_song(&track.title, &track.artist);
    }

    // ── Track lifecycle ──────────────────────────────────────────────────────

    /// Start the catalog's current track at the listener's volume, skipping
    /// forward past tracks that fail to play. False when nothing is left.
    fn start_current(&mut self) -> bool {
        let volume = self.settings.target_volume();
        loop {
            let Some(track) = self.catalog.current() else {
                return false;
            };
            match self.output.play_track(&track, volume) {
                Ok(()) => {
                    info!(title = %track.title, artist = %track.artist, duration = %track.duration_display(), "now playing");
                    self.on_track_started();
                    return true;
                }
                Err(e) => {
                    warn!("{}: {}, skipping", track.title, e);
                    if self.catalog.advance().is_none() {
                        return false;
                    }
                }
            }
        }
    }

    fn on_track_started(&mut self) {
        self.gate_consumed = false;
        self.refresh_settings();

        let next = self.catalog.peek_next();
        let applies = match (self.slot.target(), &next) {
            (Some(target), Some(next)) => target.same_as(next),
            (None, _) => true,
            _ => false,
        };
        if !applies && !self.slot.is_in_flight() {
            debug!("dropping announcement made for another track");
            self.slot = GenerationSlot::Idle;
        }
        self.maybe_pregenerate();
    }

    /// Start generating the announcement for the upcoming boundary if the
    /// gate says it will be due and nothing else is outstanding.
    fn maybe_pregenerate(&mut self) {
        if !self.slot.is_idle() || !self.settings.radio_enabled() || !self.settings.gate.peek() {
            return;
        }
        if self.draining.is_some() {
            debug!("waiting for a discarded generation to settle");
            return;
        }
        let Some(next) = self.catalog.peek_next() else {
            return;
        };
        let Some(context) = self.build_context() else {
            return;
        };

        info!(next = %next.title, "pre-generating announcement");
        let announcer = self.announcer.clone();
        let settings = self.settings.clone();
        let handle = tokio::spawn(async move { announcer.produce(&context, &settings).await });
        self.slot = GenerationSlot::InFlight {
            target: next,
            handle,
        };
        self.transition(PhaseEvent::PreGenerationStarted);
    }

    fn build_context(&self) -> Option<TransitionContext> {
        let session = self.announcer.script().session();
        let memory = session.lock().unwrap_or_else(|e| e.into_inner());
        TransitionContext::for_next(self.catalog.as_ref(), &memory)
    }

    fn settle_generation(&mut self, joined: std::result::Result<Result<AnnouncementResult>, JoinError>) {
        let GenerationSlot::InFlight { target, .. } =
            std::mem::replace(&mut self.slot, GenerationSlot::Idle)
        else {
            return;
        };
        self.transition(PhaseEvent::PreGenerationSettled);

        let still_next = self
            .catalog
            .peek_next()
            .is_some_and(|next| next.same_as(&target));
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => Err(RadioError::Playback(format!("announcement task died: {}", e))),
        };
        match outcome {
            Ok(result) if still_next => {
                debug!(next = %target.title, "announcement cached");
                self.slot = GenerationSlot::Ready { target, result };
            }
            Ok(_) => {
                debug!(target = %target.title, "discarding announcement for a track no longer next");
                self.maybe_pregenerate();
            }
            Err(e) if still_next => {
                warn!("announcement generation failed, skipping: {}", e);
                self.slot = GenerationSlot::Failed { target };
            }
            Err(e) => {
                debug!("stale announcement generation failed: {}", e);
                self.maybe_pregenerate();
            }
        }
    }

    /// Take the slot's result for `next`, waiting for an in-flight job or
    /// generating on the spot when nothing applies.
    async fn announcement_for(&mut self, next: &Track) -> Option<AnnouncementResult> {
        match std::mem::replace(&mut self.slot, GenerationSlot::Idle) {
            GenerationSlot::Ready { target, result } if target.same_as(next) => Some(result),
            GenerationSlot::Failed { target } if target.same_as(next) => None,
            GenerationSlot::InFlight { target, handle } if target.same_as(next) => {
                debug!("waiting for in-flight announcement");
                match handle.await {
                    Ok(Ok(result)) => Some(result),
                    Ok(Err(e)) => {
                        warn!("announcement generation failed, skipping: {}", e);
                        None
                    }
                    Err(e) => {
                        warn!("announcement task died: {}", e);
                        None
                    }
                }
            }
            stale => {
                self.park(stale);
                let context = self.build_context()?;
                info!(next = %next.title, "generating announcement on demand");
                self.transition(PhaseEvent::PreGenerationStarted);
                match self.announcer.produce(&context, &self.settings).await {
                    Ok(result) => Some(result),
                    Err(e) => {
                        warn!("announcement generation failed, skipping: {}", e);
                        None
                    }
                }
            }
        }
    }

    fn discard_slot(&mut self) {
        if !self.slot.is_idle() {
            debug!("discarding pending announcement");
        }
        let slot = std::mem::replace(&mut self.slot, GenerationSlot::Idle);
        self.park(slot);
        if self.phase == Phase::PendingGeneration {
            self.transition(PhaseEvent::PreGenerationSettled);
        }
    }

    /// Keep an unwanted in-flight task around until it finishes so that only
    /// one generation is ever outstanding.
    fn park(&mut self, slot: GenerationSlot) {
        if let GenerationSlot::InFlight { target, handle } = slot {
            debug!(target = %target.title, "letting discarded generation drain");
            self.draining = Some(handle);
        }
    }

    // ── Monitor ──────────────────────────────────────────────────────────────

    async fn on_tick(&mut self) -> bool {
        if self.fading {
            return true;
        }
        if self.output.track_finished() {
            return self.on_track_end().await;
        }

        let GenerationSlot::Ready { .. } = &self.slot else {
            return true;
        };
        let Some(current) = self.catalog.current() else {
            return true;
        };
        let remaining = current.duration.saturating_sub(self.output.position());
        if !self.gate_consumed && !current.duration.is_zero() && remaining <= ANTICIPATION_WINDOW {
            self.anticipated_transition().await;
        }
        true
    }

    /// The pending announcement is ready and the track is nearly over: fade
    /// now rather than waiting for the end.
    async fn anticipated_transition(&mut self) {
        self.refresh_settings();
        let Some(next) = self.catalog.peek_next() else {
            return;
        };
        if !self.settings.radio_enabled() {
            self.discard_slot();
            return;
        }
        if !self.consume_gate() {
            self.discard_slot();
            return;
        }
        let GenerationSlot::Ready { target, result } =
            std::mem::replace(&mut self.slot, GenerationSlot::Idle)
        else {
            return;
        };
        if !target.same_as(&next) {
            debug!("cached announcement is for another track");
            self.maybe_pregenerate();
            return;
        }

        info!(next = %next.title, "anticipated transition");
        let fade_out = result.timing.fade_out;
        self.run_transition(next, result, fade_out).await;
    }

    /// The current track ended without an anticipated transition.
    async fn on_track_end(&mut self) -> bool {
        let Some(next) = self.catalog.peek_next() else {
            return false;
        };
        self.refresh_settings();

        if !self.gate_consumed && self.consume_gate() {
            if let Some(result) = self.announcement_for(&next).await {
                info!(next = %next.title, "reactive transition");
                self.run_transition(next, result, REACTIVE_FADE).await;
                return true;
            }
            self.transition(PhaseEvent::Failed);
        } else {
            self.discard_slot();
        }
        self.advance_plainly()
    }

    /// Move to the next track with no announcement.
    fn advance_plainly(&mut self) -> bool {
        if let Some(current) = self.catalog.current() {
            self.record_song(&current);
        }
        if self.catalog.advance().is_none() {
            return false;
        }
        self.start_current()
    }

    // ── Transition sequence ──────────────────────────────────────────────────

    async fn fade_to(&mut self, target: f32, duration: Duration) {
        if self.fading {
            return;
        }
        self.fading = true;
        fade_volume(&mut self.output, target, duration).await;
        self.fading = false;
    }

    async fn run_transition(&mut self, next: Track, result: AnnouncementResult, fade_out: Duration) {
        let timing = result.timing;
        let target_volume = self.settings.target_volume();

        // The old track's tail keeps playing at background level until it
        // runs out or the next track replaces it.
        self.transition(PhaseEvent::FadeTriggered);
        self.fade_to(BACKGROUND_VOLUME, fade_out).await;
        self.transition(PhaseEvent::FadeOutComplete);

        tokio::time::sleep(timing.pre_silence).await;
        if let Some(previous) = self.catalog.current() {
            self.record_song(&previous);
        }
        if !self
            .catalog
            .advance()
            .is_some_and(|track| track.same_as(&next))
        {
            // The catalog changed under us; play whatever is current now.
            warn!("next track changed during transition");
            self.recover(false, RadioError::Playback("catalog moved".into()));
            return;
        }
        self.transition(PhaseEvent::PreSilenceElapsed);

        self.announcing.store(true, Ordering::SeqCst);
        let speech = self.play_announcement(&result, &next).await;
        self.announcing.store(false, Ordering::SeqCst);

        let speech_end = match speech {
            Ok(speech_end) => speech_end,
            Err((brought_up, e)) => {
                self.recover(brought_up, e);
                return;
            }
        };
        self.transition(PhaseEvent::SpeechFinished);

        tokio::time::sleep_until(speech_end + timing.post_silence.max(POST_SILENCE_FLOOR)).await;
        self.transition(PhaseEvent::PostSilenceElapsed);

        self.fade_to(target_volume, timing.fade_in).await;
        self.transition(PhaseEvent::FadeInComplete);
        info!(title = %next.title, "transition complete");

        self.last_played = Some((result, speech_end));
        self.on_track_started();
    }

    /// Play every clip in order, starting `next` under them at the bring-up
    /// cue. Returns when speech ended; the next track is always up by then.
    /// On error, also reports whether the next track had already started.
    async fn play_announcement(
        &mut self,
        result: &AnnouncementResult,
        next: &Track,
    ) -> std::result::Result<Instant, (bool, RadioError)> {
        let start = Instant::now();
        let cue_at = start + bring_up_delay(result.total_duration(), BRING_UP_LEAD, BRING_UP_FLOOR);
        let brought_up: Cell<Option<Instant>> = Cell::new(None);
        let bring_up = |output: &mut O| -> Result<()> {
            if brought_up.get().is_none() && Instant::now() >= cue_at {
                output.play_track(next, BACKGROUND_VOLUME)?;
                brought_up.set(Some(Instant::now()));
                info!(title = %next.title, "next track up under announcement");
            }
            Ok(())
        };

        for (i, clip) in result.clips.iter().enumerate() {
            if i > 0 {
                hold(&mut self.output, DIALOGUE_GAP, bring_up)
                    .await
                    .map_err(|e| (brought_up.get().is_some(), e))?;
            }
            let before = brought_up.get().is_some();
            play_clip_through(&mut self.output, &clip.bytes, clip.duration(), bring_up)
                .await
                .map_err(|e| (brought_up.get().is_some(), e))?;
            if !before && brought_up.get().is_some() {
                self.transition(PhaseEvent::BackgroundCueReached);
            }
        }
        let speech_end = Instant::now();

        // `hold` always polls at its deadline, so the cue fires here at the latest.
        if brought_up.get().is_none() {
            let wait = cue_at.saturating_duration_since(speech_end);
            hold(&mut self.output, wait, bring_up)
                .await
                .map_err(|e| (brought_up.get().is_some(), e))?;
            self.transition(PhaseEvent::BackgroundCueReached);
        }
        Ok(speech_end)
    }

    /// Abandon the transition: next track at normal volume, no announcement.
    fn recover(&mut self, next_started: bool, error: RadioError) {
        warn!("transition failed, skipping announcement: {}", error);
        self.output.stop_clip();
        self.announcing.store(false, Ordering::SeqCst);
        self.fading = false;
        self.transition(PhaseEvent::Failed);

        if next_started {
            self.output.set_volume(self.settings.target_volume());
            self.on_track_started();
        } else if !self.start_current() {
            info!("nothing left to play after failed transition");
        }
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    /// False when playback should end.
    async fn handle_command(&mut self, request: Request) -> bool {
        match request.command {
            Command::Next => {
                info!("skip requested");
                self.discard_slot();
                self.advance_plainly()
            }
            Command::Previous => {
                self.previous(request.sent_at).await;
                true
            }
            Command::SetRadioEnabled(enabled) => {
                self.set_radio_enabled(enabled);
                true
            }
            Command::ResetSession => {
                self.announcer.script().reset_session();
                true
            }
            Command::Stop => false,
        }
    }

    async fn previous(&mut self, sent_at: Instant) {
        let recent = self
            .last_played
            .as_ref()
            .is_some_and(|(_, ended)| sent_at.saturating_duration_since(*ended) <= REPLAY_WINDOW);
        if recent {
            if let Some((result, at)) = self.last_played.take() {
                self.replay(&result).await;
                self.last_played = Some((result, at));
                return;
            }
        }

        if self.catalog.go_back().is_none() {
            debug!("already at the first track");
            return;
        }
        self.discard_slot();
        self.start_current();
    }

    /// Duck the music, play the last announcement again, restore the volume.
    async fn replay(&mut self, result: &AnnouncementResult) {
        info!("replaying last announcement");
        let target = self.settings.target_volume();
        self.fade_to(BACKGROUND_VOLUME, REPLAY_DUCK).await;

        self.announcing.store(true, Ordering::SeqCst);
        let mut outcome = Ok(());
        for (i, clip) in result.clips.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(DIALOGUE_GAP).await;
            }
            outcome = play_clip_through(&mut self.output, &clip.bytes, clip.duration(), |_| Ok(())).await;
            if outcome.is_err() {
                break;
            }
        }
        self.announcing.store(false, Ordering::SeqCst);

        match outcome {
            Ok(()) => self.fade_to(target, REPLAY_DUCK).await,
            Err(e) => {
                warn!("replay failed: {}", e);
                self.output.set_volume(target);
            }
        }
    }

    fn set_radio_enabled(&mut self, enabled: bool) {
        self.refresh_settings();
        let was_enabled = self.settings.radio_enabled();
        self.settings.gate.enabled = enabled;
        if let Err(e) = self.settings.save() {
            warn!("could not save radio setting: {}", e);
        }
        info!(enabled, "radio toggled");

        if !enabled {
            self.discard_slot();
            return;
        }
        if !was_enabled {
            self.announcer.script().reset_session();
        }
        if !self.gate_consumed {
            self.maybe_pregenerate();
        }
    }
}
