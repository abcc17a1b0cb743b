//! Produces a complete announcement for one transition: script, speech
//! clips, prefetched audio, and the timing the orchestrator plays it with.

use crate::clip::encode_refs;
use crate::config::{HostProfile, RadioSettings};
use crate::context::TransitionContext;
use crate::error::Result;
use crate::playback::decode_duration;
use crate::proxy::AudioFetcher;
use crate::script::{Host, ScriptGenerator, dialogue_transcript};
use crate::tts::SpeechSynthesizer;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const FADE_OUT_MIN: Duration = Duration::from_secs(3);
const FADE_OUT_MAX: Duration = Duration::from_secs(5);
const FADE_IN_MIN: Duration = Duration::from_secs(2);
const FADE_IN_MAX: Duration = Duration::from_secs(4);

#[derive(Debug, Clone)]
pub struct SpeechClip {
    pub audio_ref: String,
    pub text: String,
    pub estimated: Duration,
    /// Length read from the fetched audio, when its headers allow it.
    pub decoded: Option<Duration>,
    pub bytes: Arc<Vec<u8>>,
}

impl SpeechClip {
    pub fn duration(&self) -> Duration {
        self.decoded.unwrap_or(self.estimated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionTiming {
    pub pre_silence: Duration,
    pub post_silence: Duration,
    pub fade_out: Duration,
    pub fade_in: Duration,
}

impl TransitionTiming {
    /// Longer announcements get slightly longer fades.
    pub fn for_speech(settings: &RadioSettings, speech: Duration) -> Self {
        TransitionTiming {
            pre_silence: settings.pre_silence(),
            post_silence: settings.post_silence(),
            fade_out: (speech / 10).clamp(FADE_OUT_MIN, FADE_OUT_MAX),
            fade_in: (speech / 8).clamp(FADE_IN_MIN, FADE_IN_MAX),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnnouncementResult {
    pub clips: Vec<SpeechClip>,
    pub transcript: String,
    pub timing: TransitionTiming,
}

impl AnnouncementResult {
    pub fn total_duration(&self) -> Duration {
        self.clips.iter().map(SpeechClip::duration).sum()
    }

    /// All clip refs packed into one string (`multi:` for dialogue).
    pub fn audio_url(&self) -> String {
        let refs: Vec<&str> = self.clips.iter().map(|c| c.audio_ref.as_str()).collect();
        encode_refs(&refs)
    }
}

pub struct Announcer {
    script: ScriptGenerator,
    synth: SpeechSynthesizer,
    fetcher: Arc<dyn AudioFetcher>,
}

impl Announcer {
    pub fn new(script: ScriptGenerator, synth: SpeechSynthesizer, fetcher: Arc<dyn AudioFetcher>) -> Self {
        Announcer {
            script,
            synth,
            fetcher,
        }
    }

    pub fn script(&self) -> &ScriptGenerator {
        &self.script
    }

    pub async fn produce(
        &self,
        context: &TransitionContext,
        settings: &RadioSettings,
    ) -> Result<AnnouncementResult> {
        let (lines, transcript): (Vec<(String, &HostProfile)>, String) = if settings.dual_mode {
            let dialogue = self.script.generate_dialogue(settings, context).await?;
            let transcript = dialogue_transcript(&dialogue);
            let lines = dialogue
                .into_iter()
                .map(|line| {
                    let host = match line.host {
                        Host::Primary => &settings.primary_host,
                        Host::Secondary => &settings.secondary_host,
                    };
                    (line.text, host)
                })
                .collect();
            (lines, transcript)
        } else {
            let line = self.script.generate_single_line(settings, context).await?;
            (vec![(line.clone(), &settings.primary_host)], line)
        };

        let mut clips = Vec::with_capacity(lines.len());
        for (text, host) in &lines {
            let synthesized = self.synth.synthesize(text, &host.voice, settings.speech_speed).await?;
            let bytes = self.fetcher.fetch(&synthesized.audio_ref).await?;
            let decoded = decode_duration(&bytes);
            clips.push(SpeechClip {
                audio_ref: synthesized.audio_ref,
                text: synthesized.text,
                estimated: synthesized.duration,
                decoded,
                bytes,
            });
        }

        let speech: Duration = clips.iter().map(SpeechClip::duration).sum();
        info!(clips = clips.len(), ?speech, next = %context.next.title, "announcement ready");
        Ok(AnnouncementResult {
            clips,
            transcript,
            timing: TransitionTiming::for_speech(settings, speech),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SongInfo;
    use crate::error::RadioError;
    use crate::llm::{CompletionRequest, TextGenerator};
    use crate::session::SessionMemory;
    use crate::tts::{JobOutput, JobStatus, SpeechBackend, SpeechRequest, Submission};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedLlm(&'static str);

    #[async_trait]
    impl TextGenerator for FixedLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            if request.json_mode {
                return Ok(r#"{"name":"Test FM","mood":"calm","hook":"h","style":"s"}"#.into());
            }
            Ok(self.0.to_string())
        }
    }

    /// Finishes every job immediately; the audio ref names the voice used.
    #[derive(Default)]
    struct InstantBackend {
        voices: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechBackend for InstantBackend {
        async fn submit(&self, request: &SpeechRequest) -> Result<Submission> {
            let mut voices = self.voices.lock().unwrap();
            voices.push(request.voice.clone());
            Ok(Submission::Finished(JobStatus::Succeeded(JobOutput {
                audio_ref: format!("{}-{}.wav", voices.len(), request.voice),
                duration: Some(Duration::from_secs(6)),
            })))
        }

        async fn poll(&self, _job_id: &str) -> Result<JobStatus> {
            Ok(JobStatus::Running)
        }
    }

    struct StubFetcher {
        fail: bool,
    }

    #[async_trait]
    impl AudioFetcher for StubFetcher {
        async fn fetch(&self, audio_ref: &str) -> Result<Arc<Vec<u8>>> {
            if self.fail {
                return Err(RadioError::Transport("offline".into()));
            }
            Ok(Arc::new(audio_ref.as_bytes().to_vec()))
        }
    }

    fn announcer(reply: &'static str, backend: Arc<InstantBackend>, fail_fetch: bool) -> Announcer {
        let script = ScriptGenerator::new(Arc::new(FixedLlm(reply)), SessionMemory::shared());
        Announcer::new(
            script,
            SpeechSynthesizer::new(backend),
            Arc::new(StubFetcher { fail: fail_fetch }),
        )
    }

    fn context() -> TransitionContext {
        TransitionContext {
            previous: None,
            next: SongInfo {
                title: "Next".into(),
                artist: "Band".into(),
                album: None,
                genre: None,
                year: None,
                description: None,
                rank: None,
            },
            upcoming: vec![],
            session_elapsed: Duration::ZERO,
            songs_played: 0,
        }
    }

    #[tokio::test]
    async fn single_host_makes_one_clip() {
        let backend = Arc::new(InstantBackend::default());
        let result = announcer("Here comes Next.", backend.clone(), false)
            .produce(&context(), &RadioSettings::new())
            .await
            .unwrap();

        assert_eq!(result.clips.len(), 1);
        assert_eq!(result.transcript, "Here comes Next.");
        assert_eq!(result.total_duration(), Duration::from_secs(6));
        assert!(!result.audio_url().starts_with("multi:"));
        assert_eq!(*backend.voices.lock().unwrap(), vec!["af_bella".to_string()]);
    }

    #[tokio::test]
    async fn dialogue_alternates_voices_and_packs_refs() {
        let backend = Arc::new(InstantBackend::default());
        let mut settings = RadioSettings::new();
        settings.dual_mode = true;

        let result = announcer("HOST1: a\nHOST2: b\nHOST1: c", backend.clone(), false)
            .produce(&context(), &settings)
            .await
            .unwrap();

        assert_eq!(result.clips.len(), 3);
        assert_eq!(result.total_duration(), Duration::from_secs(18));
        assert_eq!(
            result.audio_url(),
            "multi:1-af_bella.wav|2-am_michael.wav|3-af_bella.wav"
        );
        assert_eq!(result.transcript, "HOST1: a\nHOST2: b\nHOST1: c");
    }

    #[tokio::test]
    async fn fetch_failure_fails_the_announcement() {
        let backend = Arc::new(InstantBackend::default());
        let result = announcer("Hi.", backend, true)
            .produce(&context(), &RadioSettings::new())
            .await;
        assert!(matches!(result, Err(RadioError::Transport(_))));
    }

    #[test]
    fn fades_scale_with_speech_within_bounds() {
        let settings = RadioSettings::new();
        let short = TransitionTiming::for_speech(&settings, Duration::from_secs(5));
        assert_eq!(short.fade_out, FADE_OUT_MIN);
        assert_eq!(short.fade_in, FADE_IN_MIN);

        let mid = TransitionTiming::for_speech(&settings, Duration::from_secs(24));
        assert_eq!(mid.fade_out, FADE_OUT_MIN);
        assert_eq!(mid.fade_in, Duration::from_secs(3));

        let long = TransitionTiming::for_speech(&settings, Duration::from_secs(120));
        assert_eq!(long.fade_out, FADE_OUT_MAX);
        assert_eq!(long.fade_in, FADE_IN_MAX);
        assert_eq!(long.pre_silence, settings.pre_silence());
    }

    #[test]
    fn decoded_length_wins_over_estimate() {
        let clip = SpeechClip {
            audio_ref: "a".into(),
            text: "t".into(),
            estimated: Duration::from_secs(3),
            decoded: Some(Duration::from_millis(2500)),
            bytes: Arc::new(vec![]),
        };
        assert_eq!(clip.duration(), Duration::from_millis(2500));
    }
}
