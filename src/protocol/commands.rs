//! Builders for the commands this client sends. All pure.

use super::messages::{ClientEvent, InputAudioTranscription, SessionSettings, TurnDetection};
use crate::audio::{encode_pcm16, AudioChunk};

/// Configure the session: server-side VAD, and input transcription when a
/// transcription model is given.
pub fn session_update(transcription_model: Option<&str>) -> ClientEvent {
    ClientEvent::SessionUpdate {
        session: SessionSettings {
            turn_detection: TurnDetection::server_vad(),
            input_audio_transcription: transcription_model.map(|model| InputAudioTranscription {
                model: model.to_string(),
            }),
        },
    }
}

/// Append one captured chunk to the backend's input buffer
pub fn audio_append(chunk: &AudioChunk) -> ClientEvent {
    ClientEvent::InputAudioBufferAppend {
        audio: encode_pcm16(&chunk.samples),
    }
}

/// Discard input audio the backend has buffered but not processed
pub fn audio_buffer_clear() -> ClientEvent {
    ClientEvent::InputAudioBufferClear
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_update_with_transcription() {
        let json = serde_json::to_value(session_update(Some("whisper-1"))).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "session.update",
                "session": {
                    "turn_detection": {"type": "server_vad"},
                    "input_audio_transcription": {"model": "whisper-1"}
                }
            })
        );
    }

    #[test]
    fn test_session_update_without_transcription() {
        let json = serde_json::to_value(session_update(None)).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "session.update",
                "session": {"turn_detection": {"type": "server_vad"}}
            })
        );
    }

    #[test]
    fn test_audio_append_wraps_base64_pcm() {
        let command = audio_append(&AudioChunk::new(vec![1, -1]));
        let json = serde_json::to_value(command).unwrap();
        assert_eq!(
            json,
            json!({"type": "input_audio_buffer.append", "audio": "AQD//w=="})
        );
    }
}
