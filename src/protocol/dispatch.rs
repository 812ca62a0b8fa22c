//! Inbound frame parsing and routing.
//!
//! Frames are classified by their `type` tag. Each routed tag invokes exactly
//! one [`EventHandler`] method; unrecognized tags are ignored so newer
//! backends stay compatible. A frame that fails to parse is logged and
//! dropped without affecting the frames after it.

use serde_json::Value;
use tracing::{debug, warn};

use super::messages::{
    AudioDelta, ResponseDone, ServerError, ServerEvent, ToolResponse, TranscriptDelta,
    TranscriptionCompleted, KNOWN_SERVER_TAGS,
};
use crate::error::ParseError;

/// Outcome of parsing one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(ServerEvent),
    /// Well-formed frame with a tag this client does not route
    Unrecognized(String),
}

/// Parse a raw text frame
pub fn parse(frame: &str) -> Result<Inbound, ParseError> {
    let value: Value = serde_json::from_str(frame)?;

    let tag = value.get("type").and_then(Value::as_str).unwrap_or_default();
    if !KNOWN_SERVER_TAGS.contains(&tag) {
        return Ok(Inbound::Unrecognized(tag.to_string()));
    }

    Ok(Inbound::Event(serde_json::from_value(value)?))
}

/// Per-tag callbacks. Every method defaults to a no-op.
pub trait EventHandler {
    fn on_session_updated(&mut self) {}

    fn on_audio_delta(&mut self, _delta: AudioDelta) {}

    fn on_transcript_delta(&mut self, _delta: TranscriptDelta) {}

    fn on_response_done(&mut self, _done: ResponseDone) {}

    fn on_input_transcription_completed(&mut self, _completed: TranscriptionCompleted) {}

    fn on_tool_response(&mut self, _response: ToolResponse) {}

    fn on_speech_started(&mut self) {}

    fn on_error(&mut self, _error: ServerError) {}
}

/// Route an already-parsed event to its handler method
pub fn route<H: EventHandler + ?Sized>(event: ServerEvent, handler: &mut H) {
    match event {
        ServerEvent::SessionUpdated {} => handler.on_session_updated(),
        ServerEvent::ResponseAudioDelta(delta) => handler.on_audio_delta(delta),
        ServerEvent::ResponseAudioTranscriptDelta(delta) => handler.on_transcript_delta(delta),
        ServerEvent::ResponseDone(done) => handler.on_response_done(done),
        ServerEvent::InputAudioTranscriptionCompleted(completed) => {
            handler.on_input_transcription_completed(completed)
        }
        ServerEvent::MiddleTierToolResponse(response) => handler.on_tool_response(response),
        ServerEvent::SpeechStarted {} => handler.on_speech_started(),
        ServerEvent::Error(error) => handler.on_error(error),
    }
}

/// Parse one frame and route it. Returns `false` if the frame was dropped.
pub fn dispatch<H: EventHandler + ?Sized>(frame: &str, handler: &mut H) -> bool {
    match parse(frame) {
        Ok(Inbound::Event(event)) => {
            route(event, handler);
            true
        }
        Ok(Inbound::Unrecognized(tag)) => {
            debug!("Ignoring unrecognized frame type {:?}", tag);
            true
        }
        Err(e) => {
            warn!("Dropping inbound frame: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse("{not json").is_err());
    }

    #[test]
    fn test_parse_unknown_tag() {
        let inbound = parse(r#"{"type": "rate_limits.updated", "rate_limits": []}"#).unwrap();
        assert_eq!(inbound, Inbound::Unrecognized("rate_limits.updated".to_string()));
    }

    #[test]
    fn test_parse_missing_tag_is_unrecognized() {
        assert_eq!(parse("{}").unwrap(), Inbound::Unrecognized(String::new()));
        assert_eq!(parse("[1, 2]").unwrap(), Inbound::Unrecognized(String::new()));
    }

    #[test]
    fn test_parse_known_tag_with_wrong_shape() {
        // response.done requires a response object
        assert!(parse(r#"{"type": "response.done"}"#).is_err());
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<&'static str>,
        transcripts: Vec<String>,
    }

    impl EventHandler for Recorder {
        fn on_session_updated(&mut self) {
            self.calls.push("session_updated");
        }

        fn on_audio_delta(&mut self, _delta: AudioDelta) {
            self.calls.push("audio_delta");
        }

        fn on_input_transcription_completed(&mut self, completed: TranscriptionCompleted) {
            self.calls.push("user_transcript");
            self.transcripts.push(completed.transcript);
        }

        fn on_error(&mut self, _error: ServerError) {
            self.calls.push("error");
        }
    }

    #[test]
    fn test_dispatch_routes_each_tag_once() {
        let mut recorder = Recorder::default();

        assert!(dispatch(r#"{"type": "session.updated", "session": {}}"#, &mut recorder));
        assert!(dispatch(
            r#"{"type": "response.audio.delta", "delta": "AAA="}"#,
            &mut recorder
        ));
        assert!(dispatch(
            r#"{"type": "conversation.item.input_audio_transcription.completed",
                "item_id": "item_1", "transcript": "hi"}"#,
            &mut recorder
        ));
        assert!(dispatch(r#"{"type": "error"}"#, &mut recorder));

        assert_eq!(
            recorder.calls,
            vec!["session_updated", "audio_delta", "user_transcript", "error"]
        );
        assert_eq!(recorder.transcripts, vec!["hi"]);
    }

    #[test]
    fn test_dropped_frame_does_not_affect_next() {
        let mut recorder = Recorder::default();

        assert!(!dispatch("{not json", &mut recorder));
        assert!(dispatch(r#"{"type": "unknown.thing"}"#, &mut recorder));
        assert!(dispatch(r#"{"type": "session.updated"}"#, &mut recorder));

        assert_eq!(recorder.calls, vec!["session_updated"]);
    }

    #[test]
    fn test_unhandled_events_default_to_no_op() {
        let mut recorder = Recorder::default();

        assert!(dispatch(r#"{"type": "input_audio_buffer.speech_started"}"#, &mut recorder));
        assert!(recorder.calls.is_empty());
    }
}
