//! Instruction text, declared output schema and request assembly.

use serde_json::{json, Value};

use super::AnalysisRequest;
use crate::llm::ModelPart;

pub const RESPONSE_MIME_TYPE: &str = "application/json";

/// Built-in coaching instruction
pub const DEFAULT_INSTRUCTION: &str = r#"You are an elite surf coach reviewing footage of a single ride.

Evaluate the surfer's technique and return ONLY a JSON object that follows the declared schema:
- score: overall performance from 0 to 10 (decimals allowed)
- summary: two or three sentences on what went well and what to fix first
- posture: exactly 5 entries, one per axis (Stance, Balance, Compression, Arm Position, Head/Vision), value 0-10, fullMark 10
- telemetry: about 10 points across the ride, time as "m:ss", flow and power from 0 to 100
- maneuvers: every maneuver you can identify, with time as "m:ss", its name and an execution grade from 0 to 10
- drills: exactly 3 training drills targeting the biggest weaknesses, each with title, description and focus

Judge only what is visible. Do not add commentary outside the JSON object."#;

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": required,
    })
}

fn array_of(item: Value) -> Value {
    json!({ "type": "ARRAY", "items": item })
}

/// Output schema declared with every request
pub fn response_schema() -> Value {
    let number = json!({ "type": "NUMBER" });
    let string = json!({ "type": "STRING" });

    let posture = object(
        json!({ "subject": string, "value": number, "fullMark": number }),
        &["subject", "value", "fullMark"],
    );
    let telemetry = object(
        json!({ "time": string, "flow": number, "power": number }),
        &["time", "flow", "power"],
    );
    let maneuver = object(
        json!({ "time": string, "name": string, "execution": number }),
        &["time", "name", "execution"],
    );
    let drill = object(
        json!({ "title": string, "description": string, "focus": string }),
        &["title", "description", "focus"],
    );

    object(
        json!({
            "score": number,
            "summary": string,
            "posture": array_of(posture),
            "telemetry": array_of(telemetry),
            "maneuvers": array_of(maneuver),
            "drills": array_of(drill),
        }),
        &["score", "summary", "posture", "telemetry", "maneuvers", "drills"],
    )
}

/// Instruction first, then the media in order
pub fn build_parts(request: &AnalysisRequest, instruction: &str) -> Vec<ModelPart> {
    match request {
        AnalysisRequest::RawVideo { bytes, mime_type } => vec![
            ModelPart::Text(instruction.to_string()),
            ModelPart::InlineData {
                mime_type: mime_type.clone(),
                data: bytes.clone(),
            },
        ],
        AnalysisRequest::FrameSequence { frames } => {
            let mut parts = Vec::with_capacity(frames.len() * 2 + 1);
            parts.push(ModelPart::Text(format!(
                "{}\n\nThe ride is provided as {} still frames in chronological order.",
                instruction,
                frames.len()
            )));
            for (index, frame) in frames.iter().enumerate() {
                parts.push(ModelPart::Text(format!(
                    "Frame {} of {} at {:.2}s",
                    index + 1,
                    frames.len(),
                    frame.timestamp_seconds
                )));
                parts.push(ModelPart::InlineData {
                    mime_type: frame.mime_type.clone(),
                    data: frame.image_bytes.clone(),
                });
            }
            parts
        }
    }
}
