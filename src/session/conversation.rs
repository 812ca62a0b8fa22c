use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::messages::ResponseDone;
use crate::protocol::GroundingReference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One attributed entry in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Server-assigned item id (user) or response id (assistant)
    pub id: String,
    pub role: Role,
    pub transcript: String,
    /// Sources cited while this turn was being produced
    pub grounding: Vec<GroundingReference>,
    pub received_at: DateTime<Utc>,
}

/// Append-only transcript of both sides of the conversation
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    /// Every reference received this session
    grounding: Vec<GroundingReference>,
    /// References not yet attached to an assistant turn
    pending_grounding: Vec<GroundingReference>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed user transcription
    pub fn append_user(&mut self, item_id: String, transcript: String) -> &Turn {
        self.push(Turn {
            id: item_id,
            role: Role::User,
            transcript,
            grounding: Vec::new(),
            received_at: Utc::now(),
        })
    }

    /// Record a finished assistant response
    ///
    /// Responses without a transcript are not recorded.
    pub fn complete_response(&mut self, done: &ResponseDone) -> Option<&Turn> {
        let transcript = done.transcript()?.to_string();
        let grounding = std::mem::take(&mut self.pending_grounding);

        Some(self.push(Turn {
            id: done.response.id.clone(),
            role: Role::Assistant,
            transcript,
            grounding,
            received_at: Utc::now(),
        }))
    }

    pub fn add_grounding(&mut self, references: &[GroundingReference]) {
        self.grounding.extend_from_slice(references);
        self.pending_grounding.extend_from_slice(references);
    }

    fn push(&mut self, turn: Turn) -> &Turn {
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn grounding(&self) -> &[GroundingReference] {
        &self.grounding
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.grounding.clear();
        self.pending_grounding.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{ContentPart, OutputItem, ResponseResource};

    fn response(id: &str, transcript: Option<&str>) -> ResponseDone {
        ResponseDone {
            response: ResponseResource {
                id: id.to_string(),
                output: vec![OutputItem {
                    content: vec![ContentPart {
                        transcript: transcript.map(str::to_string),
                    }],
                }],
            },
        }
    }

    fn reference(id: &str) -> GroundingReference {
        GroundingReference {
            id: id.to_string(),
            name: id.to_string(),
            content: String::new(),
        }
    }

    #[test]
    fn test_turns_keep_arrival_order() {
        let mut conversation = Conversation::new();
        conversation.append_user("item_1".into(), "How do I check the oil?".into());
        conversation.complete_response(&response("resp_1", Some("Pull the dipstick.")));

        let roles: Vec<Role> = conversation.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(conversation.turns()[1].id, "resp_1");
    }

    #[test]
    fn test_response_without_transcript_is_dropped() {
        let mut conversation = Conversation::new();
        assert!(conversation.complete_response(&response("r", None)).is_none());
        assert!(conversation.complete_response(&response("r", Some(""))).is_none());
        assert!(conversation.is_empty());
    }

    #[test]
    fn test_grounding_attaches_to_next_assistant_turn() {
        let mut conversation = Conversation::new();
        conversation.add_grounding(&[reference("a"), reference("b")]);

        let turn = conversation
            .complete_response(&response("r1", Some("answer")))
            .unwrap();
        assert_eq!(turn.grounding.len(), 2);

        let turn = conversation
            .complete_response(&response("r2", Some("follow-up")))
            .unwrap();
        assert!(turn.grounding.is_empty());
        assert_eq!(conversation.grounding().len(), 2);
    }
}
