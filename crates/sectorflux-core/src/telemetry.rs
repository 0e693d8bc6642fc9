//! Telemetry extraction from upstream response bodies.

use sectorflux_types::ResponseTelemetry;

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Parse token counts and phase durations out of an Ollama response body.
///
/// Streaming responses are NDJSON whose final line is a summary object;
/// scanning the lines back-to-front finds it without parsing every chunk, and
/// also handles single-object bodies. The scan stops at the first line (from
/// the end) that carries any telemetry field or `"done": true`. Lines that do
/// not parse as JSON are skipped. Missing fields stay 0.
pub fn extract(body: &str) -> ResponseTelemetry {
    let mut telemetry = ResponseTelemetry::default();

    for line in body.lines().rev() {
        let line = line.trim();
        if !line.starts_with('{') {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };

        let mut found = false;
        if let Some(n) = value.get("prompt_eval_count").and_then(|v| v.as_i64()) {
            telemetry.prompt_tokens = n;
            found = true;
        }
        if let Some(n) = value.get("eval_count").and_then(|v| v.as_i64()) {
            telemetry.completion_tokens = n;
            found = true;
        }
        if let Some(n) = value.get("prompt_eval_duration").and_then(|v| v.as_i64()) {
            telemetry.prompt_eval_duration_ms = n / NANOS_PER_MILLI;
            found = true;
        }
        if let Some(n) = value.get("eval_duration").and_then(|v| v.as_i64()) {
            telemetry.eval_duration_ms = n / NANOS_PER_MILLI;
            found = true;
        }

        if found || value.get("done").and_then(|v| v.as_bool()) == Some(true) {
            break;
        }
    }

    telemetry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_ndjson_summary() {
        let body = concat!(
            "{\"model\":\"llama3\",\"response\":\"Hel\",\"done\":false}\n",
            "{\"model\":\"llama3\",\"response\":\"lo\",\"done\":false}\n",
            "{\"model\":\"llama3\",\"response\":\"!\",\"done\":false}\n",
            "{\"done\":true,\"prompt_eval_count\":5,\"eval_count\":7,",
            "\"prompt_eval_duration\":200000000,\"eval_duration\":400000000}\n",
        );
        let t = extract(body);
        assert_eq!(t.prompt_tokens, 5);
        assert_eq!(t.completion_tokens, 7);
        assert_eq!(t.prompt_eval_duration_ms, 200);
        assert_eq!(t.eval_duration_ms, 400);
    }

    #[test]
    fn extracts_from_single_object_body() {
        let body = r#"{"done":true,"prompt_eval_count":11,"eval_count":3}"#;
        let t = extract(body);
        assert_eq!(t.prompt_tokens, 11);
        assert_eq!(t.completion_tokens, 3);
        assert_eq!(t.prompt_eval_duration_ms, 0);
        assert_eq!(t.eval_duration_ms, 0);
    }

    #[test]
    fn body_without_summary_yields_zeros() {
        let body = "{\"response\":\"a\"}\n{\"response\":\"b\"}\n";
        assert_eq!(extract(body), ResponseTelemetry::default());
    }

    #[test]
    fn empty_body_yields_zeros() {
        assert_eq!(extract(""), ResponseTelemetry::default());
    }

    #[test]
    fn skips_garbage_lines() {
        let body = concat!(
            "{\"response\":\"x\",\"done\":false}\n",
            "{\"done\":true,\"prompt_eval_count\":2,\"eval_count\":4}\n",
            "not json at all\n",
            "{truncated\n",
        );
        let t = extract(body);
        assert_eq!(t.prompt_tokens, 2);
        assert_eq!(t.completion_tokens, 4);
    }

    #[test]
    fn done_without_metrics_stops_the_scan() {
        // The summary line wins even when an earlier chunk happens to carry a
        // telemetry-looking field.
        let body = concat!(
            "{\"prompt_eval_count\":99,\"done\":false}\n",
            "{\"done\":true}\n",
        );
        assert_eq!(extract(body), ResponseTelemetry::default());
    }

    #[test]
    fn trailing_whitespace_is_tolerated() {
        let body = "  {\"done\":true,\"eval_count\":6}  \n\n";
        assert_eq!(extract(body).completion_tokens, 6);
    }
}
