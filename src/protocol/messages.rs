use serde::{Deserialize, Deserializer, Serialize};

// Outbound tags
pub const SESSION_UPDATE: &str = "session.update";
pub const INPUT_AUDIO_BUFFER_APPEND: &str = "input_audio_buffer.append";
pub const INPUT_AUDIO_BUFFER_CLEAR: &str = "input_audio_buffer.clear";

// Inbound tags
pub const SESSION_UPDATED: &str = "session.updated";
pub const RESPONSE_AUDIO_DELTA: &str = "response.audio.delta";
pub const RESPONSE_AUDIO_TRANSCRIPT_DELTA: &str = "response.audio_transcript.delta";
pub const RESPONSE_DONE: &str = "response.done";
pub const INPUT_AUDIO_TRANSCRIPTION_COMPLETED: &str =
    "conversation.item.input_audio_transcription.completed";
pub const MIDDLE_TIER_TOOL_RESPONSE: &str = "extension.middle_tier_tool_response";
pub const SPEECH_STARTED: &str = "input_audio_buffer.speech_started";
pub const ERROR: &str = "error";

/// Every inbound tag the dispatcher routes; anything else is ignored
pub const KNOWN_SERVER_TAGS: &[&str] = &[
    SESSION_UPDATED,
    RESPONSE_AUDIO_DELTA,
    RESPONSE_AUDIO_TRANSCRIPT_DELTA,
    RESPONSE_DONE,
    INPUT_AUDIO_TRANSCRIPTION_COMPLETED,
    MIDDLE_TIER_TOOL_RESPONSE,
    SPEECH_STARTED,
    ERROR,
];

/// Command sent to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionSettings },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded PCM16LE
        audio: String,
    },

    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear,
}

impl ClientEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => SESSION_UPDATE,
            Self::InputAudioBufferAppend { .. } => INPUT_AUDIO_BUFFER_APPEND,
            Self::InputAudioBufferClear => INPUT_AUDIO_BUFFER_CLEAR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub turn_detection: TurnDetection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
}

impl TurnDetection {
    /// The backend segments caller speech into turns
    pub fn server_vad() -> Self {
        Self {
            kind: "server_vad".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

/// Event received from the backend, one variant per routed tag
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.updated")]
    SessionUpdated {},

    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta(AudioDelta),

    #[serde(rename = "response.audio_transcript.delta")]
    ResponseAudioTranscriptDelta(TranscriptDelta),

    #[serde(rename = "response.done")]
    ResponseDone(ResponseDone),

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputAudioTranscriptionCompleted(TranscriptionCompleted),

    #[serde(rename = "extension.middle_tier_tool_response")]
    MiddleTierToolResponse(ToolResponse),

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {},

    #[serde(rename = "error")]
    Error(ServerError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AudioDelta {
    /// Base64-encoded PCM16LE
    #[serde(default)]
    pub delta: String,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptDelta {
    #[serde(default)]
    pub delta: String,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponseDone {
    pub response: ResponseResource,
}

impl ResponseDone {
    /// Transcript of the first content part of the first output item
    pub fn transcript(&self) -> Option<&str> {
        self.response
            .output
            .first()?
            .content
            .first()?
            .transcript
            .as_deref()
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponseResource {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub output: Vec<OutputItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputItem {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: Vec<ContentPart>,
}

/// Treat an explicit `null` list like a missing one
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContentPart {
    #[serde(default)]
    pub transcript: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptionCompleted {
    pub item_id: String,
    #[serde(default)]
    pub transcript: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolResponse {
    #[serde(default)]
    pub tool_name: Option<String>,
    /// JSON document encoded as a string
    pub tool_result: String,
}

/// Payload of an `error` event; the backend decides which fields are set
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

impl ServerError {
    pub fn message(&self) -> String {
        match &self.error {
            Some(detail) => detail.to_string(),
            None => "unspecified server error".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = self.message.as_deref().unwrap_or("unspecified");
        match self.code.as_deref().or(self.error_type.as_deref()) {
            Some(code) => write!(f, "{}: {}", code, message),
            None => write!(f, "{}", message),
        }
    }
}
