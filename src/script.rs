//! DJ script generation: prompt assembly and reply parsing.

use crate::config::RadioSettings;
use crate::context::TransitionContext;
use crate::error::{RadioError, Result};
use crate::llm::{CompletionRequest, TextGenerator};
use crate::session::{SessionHandle, SessionIdentity, SessionMemory};
use chrono::{Local, Timelike};
use serde::Deserialize;
use std::sync::{Arc, MutexGuard};
use tracing::{debug, info, warn};

/// Number of dialogue lines requested in dual-host mode.
pub const DIALOGUE_LINES: usize = 3;

const HOST_TAGS: [(&str, Host); 4] = [
    ("HOST1:", Host::Primary),
    ("HOST2:", Host::Secondary),
    ("[HOST1]", Host::Primary),
    ("[HOST2]", Host::Secondary),
];

const SYSTEM_PROMPT: &str = "You write short spoken links for a personal music radio show. \
    Output only the words the host(s) will say aloud: no stage directions, no emoji, \
    no markdown, no sound effects.";

const IDENTITY_SYSTEM_PROMPT: &str = "You invent radio show identities. \
    Reply with a single JSON object and nothing else.";

/// Used when the model cannot produce an identity.
const FALLBACK_IDENTITIES: &[(&str, &str, &str, &str)] = &[
    ("The Late Shift", "warm and unhurried", "songs for the hours nobody else is awake", "low, conversational, a little wry"),
    ("Needle Drop", "curious and upbeat", "every record has a story worth a minute", "bright, quick, friendly"),
    ("Static & Gold", "nostalgic", "tuning the dial for hidden gems", "smooth, reflective, unhurried"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueLine {
    pub host: Host,
    pub text: String,
}

#[derive(Deserialize)]
struct IdentityReply {
    name: String,
    mood: String,
    hook: String,
    style: String,
}

/// Builds generation requests from session memory and the transition
/// context, and records successful transcripts back into memory.
pub struct ScriptGenerator {
    llm: Arc<dyn TextGenerator>,
    session: SessionHandle,
}

impl ScriptGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>, session: SessionHandle) -> Self {
        ScriptGenerator { llm, session }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn record_song(&self, title: &str, artist: &str) {
        self.memory().record_song(title, artist);
    }

    pub fn reset_session(&self) {
        info!("session memory reset");
        self.memory().reset();
    }

    fn memory(&self) -> MutexGuard<'_, SessionMemory> {
        // A poisoned lock only means a panic mid-append; the data is still usable.
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the session identity, generating it on first use.
    ///
    /// A malformed reply or an unreachable model yields a canned identity so
    /// the show still has a name. Missing credentials are passed up.
    pub async fn ensure_identity(&self, settings: &RadioSettings) -> Result<SessionIdentity> {
        let epoch = self.memory().epoch();
        self.identity_for(settings, epoch).await
    }

    async fn identity_for(&self, settings: &RadioSettings, epoch: u64) -> Result<SessionIdentity> {
        if let Some(identity) = self.memory().identity().cloned() {
            return Ok(identity);
        }

        let request = CompletionRequest::json(IDENTITY_SYSTEM_PROMPT, identity_prompt(settings));
        let identity = match self.llm.complete(&request).await {
            Ok(raw) => parse_identity(&raw).unwrap_or_else(|e| {
                warn!("identity reply unusable, using fallback: {}", e);
                fallback_identity()
            }),
            Err(RadioError::Configuration(msg)) => return Err(RadioError::Configuration(msg)),
            Err(e) => {
                warn!("identity generation failed, using fallback: {}", e);
                fallback_identity()
            }
        };

        info!(show = %identity.name, "session identity set");
        let mut memory = self.memory();
        if memory.epoch() != epoch {
            debug!("session reset during identity generation, not storing it");
            return Ok(identity);
        }
        // Another transition may have set it while we were waiting.
        if let Some(existing) = memory.identity() {
            return Ok(existing.clone());
        }
        memory.set_identity(identity.clone());
        Ok(identity)
    }

    pub async fn generate_single_line(
        &self,
        settings: &RadioSettings,
        context: &TransitionContext,
    ) -> Result<String> {
        let epoch = self.memory().epoch();
        let identity = self.identity_for(settings, epoch).await?;
        let prompt = {
            let memory = self.memory();
            single_host_prompt(settings, &identity, &memory, context)
        };

        let raw = self
            .llm
            .complete(&CompletionRequest::text(SYSTEM_PROMPT, prompt))
            .await?;
        let line = clean_line(&strip_tags(&raw));
        if line.is_empty() {
            return Err(RadioError::Parse("empty script".to_string()));
        }

        debug!(chars = line.len(), "single-host script ready");
        self.record_transcript(epoch, &line);
        Ok(line)
    }

    /// Dual-host script. Returns 1 to 3 lines; callers must not assume 3.
    pub async fn generate_dialogue(
        &self,
        settings: &RadioSettings,
        context: &TransitionContext,
    ) -> Result<Vec<DialogueLine>> {
        let epoch = self.memory().epoch();
        let identity = self.identity_for(settings, epoch).await?;
        let prompt = {
            let memory = self.memory();
            dialogue_prompt(settings, &identity, &memory, context)
        };

        let raw = self
            .llm
            .complete(&CompletionRequest::text(SYSTEM_PROMPT, prompt))
            .await?;
        let lines = parse_dialogue(&raw);
        if lines.is_empty() {
            return Err(RadioError::Parse("empty dialogue".to_string()));
        }

        debug!(lines = lines.len(), "dialogue script ready");
        self.record_transcript(epoch, &dialogue_transcript(&lines));
        Ok(lines)
    }

    /// Transcripts from a session that has since been reset are dropped.
    fn record_transcript(&self, epoch: u64, transcript: &str) {
        let mut memory = self.memory();
        if memory.epoch() == epoch {
            memory.record_announcement(transcript);
        } else {
            debug!("session reset during generation, transcript not recorded");
        }
    }
}

/// Extract tagged host lines in order. With no recognized tags, the whole
/// reply (tags stripped) becomes a single primary-host line.
pub fn parse_dialogue(raw: &str) -> Vec<DialogueLine> {
    let tagged: Vec<DialogueLine> = raw
        .lines()
        .filter_map(|line| {
            let (host, rest) = split_tag(line.trim())?;
            let text = clean_line(rest);
            (!text.is_empty()).then_some(DialogueLine { host, text })
        })
        .take(DIALOGUE_LINES)
        .collect();

    if !tagged.is_empty() {
        return tagged;
    }

    let fallback = clean_line(&strip_tags(raw));
    if fallback.is_empty() {
        return Vec::new();
    }
    vec![DialogueLine {
        host: Host::Primary,
        text: fallback,
    }]
}

/// "HOST1: ...\nHOST2: ..." as stored in session memory.
pub fn dialogue_transcript(lines: &[DialogueLine]) -> String {
    lines
        .iter()
        .map(|l| {
            let tag = match l.host {
                Host::Primary => "HOST1",
                Host::Secondary => "HOST2",
            };
            format!("{}: {}", tag, l.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn split_tag(line: &str) -> Option<(Host, &str)> {
    HOST_TAGS.iter().find_map(|(tag, host)| {
        let head = line.get(..tag.len())?;
        head.eq_ignore_ascii_case(tag)
            .then(|| (*host, &line[tag.len()..]))
    })
}

/// Remove every host tag, wherever it appears.
pub fn strip_tags(raw: &str) -> String {
    let mut out = raw.to_string();
    for (tag, _) in HOST_TAGS {
        out = remove_case_insensitive(&out, tag);
    }
    out
}

fn remove_case_insensitive(haystack: &str, needle: &str) -> String {
    let lower = haystack.to_ascii_lowercase();
    let needle = needle.to_ascii_lowercase();
    let mut out = String::with_capacity(haystack.len());
    let mut pos = 0;
    while let Some(found) = lower[pos..].find(&needle) {
        out.push_str(&haystack[pos..pos + found]);
        pos += found + needle.len();
    }
    out.push_str(&haystack[pos..]);
    out
}

/// Collapse whitespace and drop wrapping quotes the model likes to add.
fn clean_line(text: &str) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    joined
        .trim_matches(|c| c == '"' || c == '\u{201c}' || c == '\u{201d}')
        .trim()
        .to_string()
}

fn parse_identity(raw: &str) -> Result<SessionIdentity> {
    let start = raw.find('{').ok_or_else(|| RadioError::Parse("no JSON object".into()))?;
    let end = raw.rfind('}').ok_or_else(|| RadioError::Parse("no JSON object".into()))?;
    if end < start {
        return Err(RadioError::Parse("no JSON object".into()));
    }
    let reply: IdentityReply = serde_json::from_str(&raw[start..=end])?;
    if reply.name.trim().is_empty() {
        return Err(RadioError::Parse("identity has no name".into()));
    }
    Ok(SessionIdentity {
        name: reply.name.trim().to_string(),
        mood: reply.mood.trim().to_string(),
        hook: reply.hook.trim().to_string(),
        style: reply.style.trim().to_string(),
    })
}

fn fallback_identity() -> SessionIdentity {
    let (name, mood, hook, style) = FALLBACK_IDENTITIES[fastrand::usize(..FALLBACK_IDENTITIES.len())];
    SessionIdentity {
        name: name.to_string(),
        mood: mood.to_string(),
        hook: hook.to_string(),
        style: style.to_string(),
    }
}

fn identity_prompt(settings: &RadioSettings) -> String {
    let hosts = settings
        .active_hosts()
        .iter()
        .map(|h| format!("- {}", h.personality))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Invent an identity for tonight's show, hosted by:\n{}\n\n\
         Return JSON with string fields \"name\" (show name), \"mood\", \
         \"hook\" (a running theme for the session) and \"style\" (how the host(s) speak).",
        hosts
    )
}

fn time_of_day() -> &'static str {
    match Local::now().hour() {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=21 => "evening",
        _ => "late night",
    }
}

/// Everything both prompt flavors share.
fn shared_context(
    settings: &RadioSettings,
    identity: &SessionIdentity,
    memory: &SessionMemory,
    context: &TransitionContext,
) -> String {
    let mut out = String::new();
    out.push_str(&identity.summary());
    out.push_str(&format!("\nIt is {}.", time_of_day()));

    if let Some(name) = &settings.listener_name {
        out.push_str(&format!("\nThe listener's name is {}. Use it sparingly.", name));
    }
    if let Some(extra) = &settings.custom_instructions {
        out.push_str(&format!("\nListener instructions: {}", extra));
    }

    let minutes = context.session_elapsed.as_secs() / 60;
    out.push_str(&format!(
        "\nThe session has run {} minutes, {} songs so far.",
        minutes, context.songs_played
    ));

    if memory.is_first_announcement() {
        out.push_str("\nThis is the first link of the show: open it and introduce the show by name.");
    }

    if let Some(prev) = &context.previous {
        out.push_str(&format!("\n\nJust played: {}", prev.describe()));
    }
    out.push_str(&format!("\nPlaying next: {}", context.next.describe()));

    if !context.upcoming.is_empty() {
        out.push_str(&format!("\nLater on: {}", context.upcoming.join("; ")));
    }

    let songs = memory.song_history();
    if !songs.is_empty() {
        out.push_str(&format!("\nEarlier tonight: {}", songs.join("; ")));
    }

    out.push_str(&format!(
        "\n\nYour previous links this session (do not repeat their jokes, facts or phrasing):\n{}",
        memory.formatted_history()
    ));
    out
}

fn single_host_prompt(
    settings: &RadioSettings,
    identity: &SessionIdentity,
    memory: &SessionMemory,
    context: &TransitionContext,
) -> String {
    format!(
        "You are the host. Personality: {}\n\n{}\n\n\
         Write one spoken link of two to four sentences that bridges the songs \
         and introduces the next one.",
        settings.primary_host.personality,
        shared_context(settings, identity, memory, context)
    )
}

fn dialogue_prompt(
    settings: &RadioSettings,
    identity: &SessionIdentity,
    memory: &SessionMemory,
    context: &TransitionContext,
) -> String {
    format!(
        "Two hosts share the mic.\nHOST1: {}\nHOST2: {}\n\n{}\n\n\
         Write exactly {} lines of dialogue, alternating HOST1, HOST2, HOST1. \
         Start each line with its tag, e.g. \"HOST1: ...\". One or two sentences per line. \
         The last line introduces the next song.",
        settings.primary_host.personality,
        settings.secondary_host.personality,
        shared_context(settings, identity, memory, context),
        DIALOGUE_LINES
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SongInfo;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned replies in order and records the requests it saw.
    struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(ScriptedLlm {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RadioError::Transport("no more replies".into())))
        }
    }

    fn identity_json() -> Result<String> {
        Ok(r#"{"name":"Night Bus","mood":"hazy","hook":"last stop","style":"soft"}"#.to_string())
    }

    fn context() -> TransitionContext {
        let song = |title: &str| SongInfo {
            title: title.to_string(),
            artist: "Band".to_string(),
            album: None,
            genre: None,
            year: None,
            description: None,
            rank: None,
        };
        TransitionContext {
            previous: Some(song("Before")),
            next: song("After"),
            upcoming: vec!["Later – Band".to_string()],
            session_elapsed: Duration::from_secs(600),
            songs_played: 3,
        }
    }

    #[test]
    fn parses_three_tagged_lines_in_order() {
        let raw = "HOST1: Welcome back.  \nHOST2:   That was loud!\nHOST1: Here's something softer.";
        let lines = parse_dialogue(raw);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "Welcome back.");
        assert_eq!(lines[0].host, Host::Primary);
        assert_eq!(lines[1].text, "That was loud!");
        assert_eq!(lines[1].host, Host::Secondary);
        assert_eq!(lines[2].text, "Here's something softer.");
    }

    #[test]
    fn accepts_bracket_and_lowercase_tags() {
        let raw = "[host1] Hi there\n\n[HOST2] Hello\nhost1: Bye";
        let texts: Vec<_> = parse_dialogue(raw).into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["Hi there", "Hello", "Bye"]);
    }

    #[test]
    fn drops_empty_tagged_lines_and_untagged_chatter() {
        let raw = "Sure! Here's the script:\nHOST1:\nHOST2: Only line";
        let lines = parse_dialogue(raw);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].host, Host::Secondary);
        assert_eq!(lines[0].text, "Only line");
    }

    #[test]
    fn untagged_reply_falls_back_to_single_line() {
        let raw = "Coming up next, a classic.";
        let lines = parse_dialogue(raw);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, strip_tags(raw).trim());
        assert_eq!(lines[0].host, Host::Primary);
    }

    #[test]
    fn inline_tags_are_stripped_in_fallback() {
        let lines = parse_dialogue("And now HOST2: says hi");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "And now says hi");
    }

    #[test]
    fn keeps_at_most_three_tagged_lines() {
        let raw = "HOST1: a\nHOST2: b\nHOST1: c\nHOST2: d\nHOST1: e";
        let texts: Vec<_> = parse_dialogue(raw).into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn blank_reply_parses_to_nothing() {
        assert!(parse_dialogue("   \n ").is_empty());
    }

    #[test]
    fn identity_parse_tolerates_wrapping_text() {
        let raw = "Here you go:\n{\"name\":\"Deep Cuts\",\"mood\":\"m\",\"hook\":\"h\",\"style\":\"s\"}\nEnjoy";
        assert_eq!(parse_identity(raw).unwrap().name, "Deep Cuts");
        assert!(parse_identity("no json here").is_err());
        assert!(parse_identity("{\"name\": 3}").is_err());
    }

    #[tokio::test]
    async fn single_line_records_transcript() {
        let llm = ScriptedLlm::new(vec![identity_json(), Ok("\"That was Before. Here's After.\"".into())]);
        let session = SessionMemory::shared();
        let generator = ScriptGenerator::new(llm.clone(), session.clone());

        let line = generator
            .generate_single_line(&RadioSettings::new(), &context())
            .await
            .unwrap();
        assert_eq!(line, "That was Before. Here's After.");

        let memory = session.lock().unwrap();
        assert_eq!(memory.identity().unwrap().name, "Night Bus");
        assert!(memory.formatted_history().contains("Here's After."));

        let seen = llm.seen.lock().unwrap();
        assert!(seen[0].json_mode);
        assert!(seen[1].prompt.contains("first link of the show"));
        assert!(seen[1].prompt.contains("\"After\" by Band"));
    }

    #[tokio::test]
    async fn failure_leaves_memory_untouched() {
        let llm = ScriptedLlm::new(vec![identity_json(), Err(RadioError::Transport("timeout".into()))]);
        let session = SessionMemory::shared();
        let generator = ScriptGenerator::new(llm, session.clone());

        let result = generator
            .generate_dialogue(&RadioSettings::new(), &context())
            .await;
        assert!(matches!(result, Err(RadioError::Transport(_))));
        assert!(session.lock().unwrap().is_first_announcement());
    }

    /// Resets the session while the script request is outstanding, like a
    /// radio off/on toggle landing mid-generation.
    struct ResettingLlm {
        session: SessionHandle,
    }

    #[async_trait]
    impl TextGenerator for ResettingLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            if request.json_mode {
                return identity_json();
            }
            self.session.lock().unwrap().reset();
            Ok("HOST1: From the old session.".into())
        }
    }

    #[tokio::test]
    async fn reset_during_generation_keeps_new_session_clean() {
        let session = SessionMemory::shared();
        let llm = Arc::new(ResettingLlm {
            session: session.clone(),
        });
        let generator = ScriptGenerator::new(llm, session.clone());

        let line = generator
            .generate_single_line(&RadioSettings::new(), &context())
            .await
            .unwrap();
        assert_eq!(line, "From the old session.");

        let memory = session.lock().unwrap();
        assert!(memory.is_first_announcement());
        assert!(memory.identity().is_none());
    }

    #[tokio::test]
    async fn missing_credentials_propagate_from_identity() {
        let llm = ScriptedLlm::new(vec![Err(RadioError::Configuration("no key".into()))]);
        let session = SessionMemory::shared();
        let generator = ScriptGenerator::new(llm, session.clone());

        let result = generator
            .generate_single_line(&RadioSettings::new(), &context())
            .await;
        assert!(matches!(result, Err(RadioError::Configuration(_))));
        assert!(session.lock().unwrap().identity().is_none());
    }

    #[tokio::test]
    async fn malformed_identity_uses_fallback() {
        let llm = ScriptedLlm::new(vec![Ok("not json at all".into())]);
        let generator = ScriptGenerator::new(llm, SessionMemory::shared());
        let identity = generator.ensure_identity(&RadioSettings::new()).await.unwrap();
        assert!(FALLBACK_IDENTITIES.iter().any(|(name, ..)| *name == identity.name));
    }

    #[tokio::test]
    async fn identity_is_generated_once() {
        let llm = ScriptedLlm::new(vec![identity_json()]);
        let generator = ScriptGenerator::new(llm.clone(), SessionMemory::shared());
        let settings = RadioSettings::new();
        generator.ensure_identity(&settings).await.unwrap();
        generator.ensure_identity(&settings).await.unwrap();
        assert_eq!(llm.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dialogue_prompt_names_both_hosts_and_records_tagged_transcript() {
        let reply = "HOST1: One.\nHOST2: Two.\nHOST1: Three.";
        let llm = ScriptedLlm::new(vec![identity_json(), Ok(reply.into())]);
        let session = SessionMemory::shared();
        let generator = ScriptGenerator::new(llm.clone(), session.clone());
        let mut settings = RadioSettings::new();
        settings.dual_mode = true;
        settings.listener_name = Some("Robin".into());

        let lines = generator.generate_dialogue(&settings, &context()).await.unwrap();
        assert_eq!(lines.len(), DIALOGUE_LINES);
        assert!(session.lock().unwrap().formatted_history().contains("HOST2: Two."));

        let seen = llm.seen.lock().unwrap();
        assert!(seen[1].prompt.contains(&settings.secondary_host.personality));
        assert!(seen[1].prompt.contains("Robin"));
    }
}
