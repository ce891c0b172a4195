//! Tolerant decoding of external analysis payloads.
//!
//! Providers drift: they rename keys, nest scores under sections, or wrap
//! the JSON in markdown fences. Every reader here checks a fixed list of
//! key locations in priority order and degrades to `None`/empty instead of
//! failing the frame.

use serde_json::Value;

use crate::error::VisionError;
use crate::pipeline::detection::{Alert, AlertSeverity};

/// Recovers a JSON object from provider text. Accepts clean JSON, JSON in
/// markdown code fences, and JSON embedded in surrounding prose.
pub fn recover_json(text: &str) -> Result<Value, VisionError> {
    let trimmed = text.trim();

    let candidate = if let Some(stripped) = strip_fences(trimmed) {
        stripped
    } else {
        trimmed
    };

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        if value.is_object() {
            return Ok(value);
        }
    }

    // Last resort: the widest brace-delimited span.
    if let (Some(start), Some(end)) = (candidate.find('{'), candidate.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&candidate[start..=end]) {
                if value.is_object() {
                    return Ok(value);
                }
            }
        }
    }

    Err(VisionError::MalformedResponse(format!(
        "no JSON object in {} bytes of response",
        text.len()
    )))
}

fn strip_fences(text: &str) -> Option<&str> {
    let rest = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))?;
    let rest = rest.strip_suffix("```")?;
    Some(rest.trim())
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `safety_score` at the top level, falling back to `safety.safety_score`.
pub fn safety_score(payload: &Value) -> Option<f64> {
    payload
        .get("safety_score")
        .and_then(as_f64)
        .or_else(|| {
            payload
                .get("safety")
                .and_then(|s| s.get("safety_score"))
                .and_then(as_f64)
        })
        .map(|s| s.clamp(0.0, 100.0))
}

/// `overall_score` at the top level, falling back to
/// `technique.quality_score`.
pub fn technique_score(payload: &Value) -> Option<f64> {
    payload
        .get("overall_score")
        .and_then(as_f64)
        .or_else(|| {
            payload
                .get("technique")
                .and_then(|t| t.get("quality_score"))
                .and_then(as_f64)
        })
        .map(|s| s.clamp(0.0, 100.0))
}

/// First non-empty array among the known instrument keys.
pub fn instruments(payload: &Value) -> Vec<Value> {
    for key in ["instruments", "instruments_visible", "instruments_detected"] {
        if let Some(Value::Array(items)) = payload.get(key) {
            if !items.is_empty() {
                return items.clone();
            }
        }
    }
    Vec::new()
}

/// Alerts gathered from every known alert key, each with a default severity
/// implied by the key it came from. Entries may be plain strings or objects
/// carrying their own severity.
pub fn alerts(payload: &Value) -> Vec<Alert> {
    let sources = [
        ("alerts", AlertSeverity::Info),
        ("critical_alerts", AlertSeverity::Critical),
        ("warnings", AlertSeverity::Warning),
        ("proximity_warnings", AlertSeverity::Warning),
    ];

    let mut collected = Vec::new();
    for (key, default_severity) in sources {
        let Some(Value::Array(items)) = payload.get(key) else {
            continue;
        };
        for item in items {
            if let Some(alert) = decode_alert(item, key, default_severity) {
                collected.push(alert);
            }
        }
    }
    collected
}

fn decode_alert(item: &Value, category: &str, default_severity: AlertSeverity) -> Option<Alert> {
    match item {
        Value::String(message) => Some(Alert::new(default_severity, category, message.clone())),
        Value::Object(map) => {
            let message = map
                .get("message")
                .or_else(|| map.get("text"))
                .or_else(|| map.get("description"))
                .and_then(Value::as_str)?
                .to_string();
            let severity = map
                .get("severity")
                .and_then(Value::as_str)
                .map(AlertSeverity::parse)
                .unwrap_or(default_severity);
            let mut alert = Alert::new(
                severity,
                map.get("category")
                    .and_then(Value::as_str)
                    .unwrap_or(category),
                message,
            );
            if let Some(voice) = map.get("voice_message").and_then(Value::as_str) {
                alert = alert.with_voice(voice);
            }
            Some(alert)
        }
        _ => None,
    }
}

/// One entry from the structure arrays. A bare string carries only a name;
/// object entries may attach geometry, confidence and criticality.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureEntry {
    pub name: String,
    pub bounding_box: Option<(u32, u32, u32, u32)>,
    pub confidence: Option<f32>,
    pub safety_margin_mm: Option<f32>,
    pub safety_critical: bool,
}

/// Structure entries from the known structure keys, including the nested
/// `anatomy.structures` form. Order preserved, duplicate names dropped.
pub fn structure_entries(payload: &Value) -> Vec<StructureEntry> {
    let mut entries = Vec::new();

    for key in ["structures_identified", "structures", "regions"] {
        collect_entries(payload.get(key), &mut entries);
    }
    collect_entries(
        payload.get("anatomy").and_then(|a| a.get("structures")),
        &mut entries,
    );

    entries
}

fn collect_entries(value: Option<&Value>, entries: &mut Vec<StructureEntry>) {
    let Some(Value::Array(items)) = value else {
        return;
    };
    for item in items {
        if let Some(entry) = decode_structure(item) {
            if !entries.iter().any(|e| e.name == entry.name) {
                entries.push(entry);
            }
        }
    }
}

fn decode_structure(item: &Value) -> Option<StructureEntry> {
    match item {
        Value::String(name) => Some(StructureEntry {
            name: name.clone(),
            bounding_box: None,
            confidence: None,
            safety_margin_mm: None,
            safety_critical: false,
        }),
        Value::Object(map) => Some(StructureEntry {
            name: map
                .get("name")
                .or_else(|| map.get("structure"))
                .and_then(Value::as_str)?
                .to_string(),
            bounding_box: map.get("bounding_box").and_then(decode_box),
            confidence: map.get("confidence").and_then(as_f64).map(|v| v as f32),
            safety_margin_mm: map
                .get("safety_margin_mm")
                .and_then(as_f64)
                .map(|v| v as f32),
            safety_critical: map
                .get("safety_critical")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }),
        _ => None,
    }
}

fn decode_box(value: &Value) -> Option<(u32, u32, u32, u32)> {
    let items = value.as_array()?;
    if items.len() != 4 {
        return None;
    }
    let mut fields = [0u32; 4];
    for (field, item) in fields.iter_mut().zip(items) {
        *field = as_f64(item)? as u32;
    }
    Some((fields[0], fields[1], fields[2], fields[3]))
}

/// `guidance`, falling back to `real_time_feedback`.
pub fn guidance(payload: &Value) -> Option<String> {
    for key in ["guidance", "real_time_feedback"] {
        if let Some(text) = payload.get(key).and_then(Value::as_str) {
            if !text.trim().is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

/// `voice_alert`, falling back to `voice_feedback`.
pub fn voice_alert(payload: &Value) -> Option<String> {
    for key in ["voice_alert", "voice_feedback"] {
        if let Some(text) = payload.get(key).and_then(Value::as_str) {
            if !text.trim().is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recovers_fenced_json() {
        let text = "```json\n{\"safety_score\": 87}\n```";
        let payload = recover_json(text).unwrap();
        assert_eq!(safety_score(&payload), Some(87.0));
    }

    #[test]
    fn recovers_json_embedded_in_prose() {
        let text = "Here is my assessment: {\"safety_score\": 42, \"guidance\": \"hold\"} done.";
        let payload = recover_json(text).unwrap();
        assert_eq!(safety_score(&payload), Some(42.0));
        assert_eq!(guidance(&payload).as_deref(), Some("hold"));
    }

    #[test]
    fn rejects_text_without_an_object() {
        assert!(recover_json("all clear, no concerns").is_err());
        assert!(recover_json("[1, 2, 3]").is_err());
    }

    #[test]
    fn safety_score_falls_back_to_nested_section() {
        let payload = json!({"safety": {"safety_score": 55}});
        assert_eq!(safety_score(&payload), Some(55.0));
        assert_eq!(safety_score(&json!({})), None);
    }

    #[test]
    fn scores_are_clamped() {
        assert_eq!(safety_score(&json!({"safety_score": 180})), Some(100.0));
        assert_eq!(technique_score(&json!({"overall_score": -5})), Some(0.0));
    }

    #[test]
    fn technique_score_reads_both_shapes() {
        assert_eq!(technique_score(&json!({"overall_score": 71})), Some(71.0));
        assert_eq!(
            technique_score(&json!({"technique": {"quality_score": "64"}})),
            Some(64.0)
        );
    }

    #[test]
    fn instruments_tries_alternate_keys() {
        let payload = json!({"instruments_visible": ["suction", "bipolar"]});
        assert_eq!(instruments(&payload).len(), 2);
        assert!(instruments(&json!({"instruments": []})).is_empty());
    }

    #[test]
    fn alerts_inherit_severity_from_their_key() {
        let payload = json!({
            "critical_alerts": ["vessel proximity"],
            "warnings": [{"message": "glare on lens", "severity": "caution"}],
        });
        let alerts = alerts(&payload);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(alerts[1].severity, AlertSeverity::Caution);
    }

    #[test]
    fn structure_entries_merge_flat_and_nested_keys() {
        let payload = json!({
            "structures": ["vessels", {"name": "dura"}],
            "anatomy": {"structures": ["vessels", "cortex"]},
        });
        let names: Vec<_> = structure_entries(&payload)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["vessels", "dura", "cortex"]);
    }

    #[test]
    fn structure_entries_decode_geometry_and_criticality() {
        let payload = json!({
            "structures": [
                {
                    "name": "carotid",
                    "bounding_box": [10, 20, 30, 40],
                    "confidence": 0.9,
                    "safety_margin_mm": 3.0,
                    "safety_critical": true,
                },
                "dura",
            ],
        });
        let entries = structure_entries(&payload);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].bounding_box, Some((10, 20, 30, 40)));
        assert_eq!(entries[0].safety_margin_mm, Some(3.0));
        assert!(entries[0].safety_critical);
        assert!(!entries[1].safety_critical);
        assert_eq!(entries[1].bounding_box, None);
    }

    #[test]
    fn voice_alert_ignores_blank_strings() {
        assert_eq!(voice_alert(&json!({"voice_alert": "  "})), None);
        assert_eq!(
            voice_alert(&json!({"voice_feedback": "stop"})).as_deref(),
            Some("stop")
        );
    }
}
