use tracing::warn;

use super::AnalysisResult;

const EXPECTED_POSTURE_AXES: usize = 5;
const EXPECTED_DRILLS: usize = 3;

/// Slice from the first `{` to the last `}`.
/// Models sometimes wrap the JSON body in prose or code fences.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn check_grade(field: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && (0.0..=10.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{} must be within [0, 10], got {}", field, value))
    }
}

/// Parse and validate the model's answer
pub fn parse_analysis(text: &str) -> Result<AnalysisResult, String> {
    let body = extract_json_object(text)
        .ok_or_else(|| "response does not contain a JSON object".to_string())?;

    let result: AnalysisResult = serde_json::from_str(body)
        .map_err(|e| format!("response JSON does not match the analysis schema: {}", e))?;

    validate(&result)?;
    Ok(result)
}

fn validate(result: &AnalysisResult) -> Result<(), String> {
    check_grade("score", result.score)?;

    if result.summary.trim().is_empty() {
        return Err("summary is empty".to_string());
    }

    for metric in &result.posture {
        check_grade(&format!("posture '{}'", metric.subject), metric.value)?;
    }

    for maneuver in &result.maneuvers {
        check_grade(&format!("maneuver '{}' execution", maneuver.name), maneuver.execution)?;
    }

    if result.posture.len() != EXPECTED_POSTURE_AXES {
        warn!(
            "Expected {} posture axes, model returned {}",
            EXPECTED_POSTURE_AXES,
            result.posture.len()
        );
    }

    if result.drills.len() != EXPECTED_DRILLS {
        warn!(
            "Expected {} drills, model returned {}",
            EXPECTED_DRILLS,
            result.drills.len()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "score": 8.5,
        "summary": "Committed bottom turn, rushed the top turn.",
        "posture": [
            {"subject": "Stance", "value": 8, "fullMark": 10},
            {"subject": "Balance", "value": 7.5, "fullMark": 10},
            {"subject": "Compression", "value": 6, "fullMark": 10},
            {"subject": "Arm Position", "value": 9, "fullMark": 10},
            {"subject": "Head/Vision", "value": 7, "fullMark": 10}
        ],
        "telemetry": [
            {"time": "0:01", "flow": 40, "power": 30},
            {"time": "0:02", "flow": 55, "power": 60}
        ],
        "maneuvers": [
            {"time": "0:02", "name": "Bottom Turn", "execution": 8.0},
            {"time": "0:04", "name": "Cutback", "execution": 6.5}
        ],
        "drills": [
            {"title": "Pop-up reps", "description": "20 pop-ups on land", "focus": "Speed"},
            {"title": "Skate carves", "description": "Carve drills on a surfskate", "focus": "Rotation"},
            {"title": "Balance board", "description": "5 minutes daily", "focus": "Balance"}
        ]
    }"#;

    #[test]
    fn test_extract_ignores_prefix_and_suffix() {
        let text = format!("Here is the analysis:\n```json\n{}\n```\nGood luck!", FIXTURE);
        let body = extract_json_object(&text).unwrap();
        assert!(body.starts_with('{'));
        assert!(body.ends_with('}'));

        let result = parse_analysis(&text).unwrap();
        assert_eq!(result.score, 8.5);
    }

    #[test]
    fn test_extract_inline_object() {
        let text = r#"prefix {"score":8.5} suffix"#;
        assert_eq!(extract_json_object(text), Some(r#"{"score":8.5}"#));
    }

    #[test]
    fn test_no_braces_is_an_error_not_a_panic() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
        assert!(parse_analysis("I could not analyze this video.").is_err());
        assert!(parse_analysis("").is_err());
    }

    #[test]
    fn test_fixture_keeps_posture_and_drills() {
        let result = parse_analysis(FIXTURE).unwrap();
        assert_eq!(result.posture.len(), 5);
        assert_eq!(result.drills.len(), 3);
        assert_eq!(result.posture[3].subject, "Arm Position");
        assert_eq!(result.posture[0].full_mark, 10.0);
        assert_eq!(result.drills[2].focus, "Balance");
        assert_eq!(result.maneuvers[1].name, "Cutback");
    }

    #[test]
    fn test_serialized_result_uses_full_mark_name() {
        let result = parse_analysis(FIXTURE).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["posture"][0]["fullMark"], 10.0);
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let text = r#"{"score": 7, "summary": "ok", "posture": [], "telemetry": [], "maneuvers": []}"#;
        let err = parse_analysis(text).unwrap_err();
        assert!(err.contains("drills"));
    }

    #[test]
    fn test_out_of_range_grades_are_rejected() {
        let score = FIXTURE.replace("\"score\": 8.5", "\"score\": 85");
        assert!(parse_analysis(&score).unwrap_err().contains("score"));

        let execution = FIXTURE.replace("\"execution\": 6.5", "\"execution\": -1");
        assert!(parse_analysis(&execution).unwrap_err().contains("Cutback"));
    }

    #[test]
    fn test_unexpected_counts_only_warn() {
        let mut value: serde_json::Value = serde_json::from_str(FIXTURE).unwrap();
        value["drills"].as_array_mut().unwrap().pop();
        let result = parse_analysis(&value.to_string()).unwrap();
        assert_eq!(result.drills.len(), 2);
    }
}
