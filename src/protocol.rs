//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Catalog, Channel, PresentationMode, Position, QuestionKind};
use crate::flow::{CurrentQuestion, PaletteEntry, Report};
use crate::grader::GradeRequest;
use crate::responses::ResponseRecord;

/// Shown instead of the prompt while the sentence is being played back.
pub const LISTEN_PROMPT: &str = "Listen carefully...";
pub const REPEAT_PROMPT: &str = "Now, repeat what you heard.";

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Start,
    Current,
    JumpTo {
        section: usize,
        question: usize,
    },
    Advance,
    /// Partial typed input, kept for the deadline.
    Draft {
        text: String,
    },
    Submit {
        text: String,
    },
    /// Final transcript from the speech capture collaborator.
    Transcript {
        text: String,
    },
    CaptureError {
        code: String,
    },
    Palette,
    Report,
}

/// Messages the server sends back over WebSocket.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Question {
        question: QuestionOut,
        palette: Vec<PaletteEntry>,
    },
    Grading {
        #[serde(rename = "globalIndex")]
        global_index: usize,
    },
    Feedback {
        #[serde(rename = "globalIndex")]
        global_index: usize,
        #[serde(rename = "userResponse")]
        user_response: String,
        feedback: String,
    },
    /// Stop listening; the deadline passed on a spoken question.
    CancelCapture,
    Finished {
        report: Report,
    },
    Report {
        report: Report,
    },
    Palette {
        palette: Vec<PaletteEntry>,
    },
    Error {
        code: String,
        message: String,
    },
}

/// Renderer-facing view of the current question. Expected answers stay server-side.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOut {
    pub position: Position,
    pub global_index: usize,
    pub total: usize,
    pub section_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    pub kind: QuestionKind,
    pub mode: PresentationMode,
    pub display_text: String,
    /// Text for the playback collaborator (listen-and-repeat only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speak: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_playback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passage: Option<String>,
    pub time_limit_secs: u64,
    pub grading: bool,
    /// Earlier result when the question is revisited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<ResponseRecord>,
}

pub fn to_question_out(
    cur: &CurrentQuestion<'_>,
    time_limit_secs: u64,
    grading: bool,
    record: Option<&ResponseRecord>,
) -> QuestionOut {
    let q = cur.question;
    let listen_first = cur.mode == PresentationMode::ListenAndRepeat;
    QuestionOut {
        position: cur.position,
        global_index: cur.global_index,
        total: cur.total,
        section_title: cur.section.title.clone(),
        instruction: cur.section.instruction.clone(),
        kind: q.kind,
        mode: cur.mode,
        display_text: if listen_first { LISTEN_PROMPT.to_string() } else { q.prompt.clone() },
        speak: listen_first.then(|| q.prompt.clone()),
        after_playback: listen_first.then(|| REPEAT_PROMPT.to_string()),
        context: q.context.clone(),
        options: q.options.clone(),
        passage: q.passage.clone(),
        time_limit_secs,
        grading,
        record: record.filter(|r| r.completed).cloned(),
    }
}

//
// HTTP request/response DTOs
//

/// Browsable catalog for `/api/catalog`, without answer keys.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogOut {
    pub total: usize,
    pub sections: Vec<SectionOut>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionOut {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    pub questions: Vec<CatalogQuestionOut>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuestionOut {
    pub position: Position,
    pub global_index: usize,
    pub kind: QuestionKind,
    pub mode: PresentationMode,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passage: Option<String>,
}

pub fn to_catalog_out(catalog: &Catalog) -> CatalogOut {
    let mut sections: Vec<SectionOut> = catalog
        .sections()
        .iter()
        .map(|s| SectionOut {
            title: s.title.clone(),
            instruction: s.instruction.clone(),
            questions: Vec::with_capacity(s.questions.len()),
        })
        .collect();
    for (position, global_index, _, q) in catalog.iter() {
        sections[position.section].questions.push(CatalogQuestionOut {
            position,
            global_index,
            kind: q.kind,
            mode: q.mode(),
            prompt: q.prompt.clone(),
            context: q.context.clone(),
            options: q.options.clone(),
            passage: q.passage.clone(),
        });
    }
    CatalogOut { total: catalog.total_questions(), sections }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessIn {
    pub prompt: String,
    pub user_response: String,
    #[serde(default)]
    pub section_title: Option<String>,
    #[serde(default)]
    pub question_kind: Option<QuestionKind>,
    #[serde(default)]
    pub expected_answer: Option<String>,
    #[serde(default)]
    pub mode: Option<PresentationMode>,
}

impl AssessIn {
    pub fn into_request(self, channel: Channel) -> GradeRequest {
        GradeRequest {
            channel,
            prompt: self.prompt,
            user_response: self.user_response,
            section_title: self.section_title,
            question_kind: self.question_kind,
            mode: self.mode,
            expected_answer: self.expected_answer,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssessOut {
    pub feedback: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub grader: &'static str,
}

#[derive(Serialize)]
pub struct LlmTestOut {
    pub message: String,
    pub response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let m: ClientWsMessage = serde_json::from_str(r#"{"type":"jump_to","section":2,"question":1}"#).expect("json");
        assert!(matches!(m, ClientWsMessage::JumpTo { section: 2, question: 1 }));
        let m: ClientWsMessage = serde_json::from_str(r#"{"type":"capture_error","code":"no-speech"}"#).expect("json");
        assert!(matches!(m, ClientWsMessage::CaptureError { ref code } if code == "no-speech"));
    }

    #[test]
    fn feedback_frame_uses_camel_case_fields() {
        let m = ServerWsMessage::Feedback { global_index: 3, user_response: "hi".into(), feedback: "ok".into() };
        let v = serde_json::to_value(&m).expect("json");
        assert_eq!(v["type"], "feedback");
        assert_eq!(v["globalIndex"], 3);
        assert_eq!(v["userResponse"], "hi");
        let v = serde_json::to_value(ServerWsMessage::CancelCapture).expect("json");
        assert_eq!(v["type"], "cancel_capture");
    }

    #[test]
    fn catalog_view_hides_answer_keys() {
        let catalog = crate::seeds::default_catalog().expect("catalog");
        let v = serde_json::to_value(to_catalog_out(&catalog)).expect("json");
        assert_eq!(v["total"], 24);
        let q = &v["sections"][3]["questions"][1];
        assert_eq!(q["kind"], "multiple_choice");
        assert_eq!(q["options"][1], "To wait out the storm");
        assert!(q.get("expectedAnswer").is_none());
        let leaked = v["sections"]
            .as_array()
            .into_iter()
            .flatten()
            .flat_map(|s| s["questions"].as_array().into_iter().flatten())
            .any(|q| q.get("expectedAnswer").is_some());
        assert!(!leaked);
    }

    #[test]
    fn assess_body_accepts_original_shape() {
        let body: AssessIn = serde_json::from_str(
            r#"{"prompt":"Describe a trip.","userResponse":"I went to Rome","sectionTitle":"Speaking"}"#,
        )
        .expect("json");
        let req = body.into_request(Channel::Voice);
        assert_eq!(req.section_title.as_deref(), Some("Speaking"));
        assert_eq!(req.mode, None);
        assert_eq!(req.channel, Channel::Voice);
    }
}
