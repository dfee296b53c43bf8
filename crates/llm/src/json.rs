//! Pull a JSON object out of free-form model output.

/// Extract JSON from an LLM response, handling markdown code blocks
/// and chatty prefixes/suffixes around a bare object.
///
/// Returns the trimmed input unchanged when nothing JSON-shaped is found;
/// the caller's parser reports the failure.
pub fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    // ```json ... ``` (any case on the language tag)
    if let Some(start) = find_ignore_ascii_case(trimmed, "```json") {
        let json_start = start + "```json".len();
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // ``` ... ``` with an optional language tag on the fence line
    if let Some(start) = trimmed.find("```") {
        let after_tick = &trimmed[start + 3..];
        let content_start = after_tick.find('\n').map_or(0, |n| n + 1);
        if let Some(end) = after_tick[content_start..].find("```") {
            return after_tick[content_start..content_start + end].trim();
        }
    }

    // Bare object somewhere in prose: the first complete one wins, so braces
    // in trailing text are not swallowed
    if let Some(object) = first_complete_object(trimmed) {
        return object;
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }

    trimmed
}

fn first_complete_object(text: &str) -> Option<&str> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut stream =
            serde_json::Deserializer::from_str(&text[start..]).into_iter::<serde_json::Value>();
        match stream.next() {
            Some(Ok(value)) if value.is_object() => {
                Some(&text[start..start + stream.byte_offset()])
            }
            _ => None,
        }
    })
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_raw() {
        let input = r#"{"tools_to_use": []}"#;
        assert_eq!(extract_json(input), r#"{"tools_to_use": []}"#);
    }

    #[test]
    fn extract_json_code_block() {
        let input = "Here is my decision:\n```json\n{\"tools_to_use\": []}\n```\nDone.";
        assert_eq!(extract_json(input), r#"{"tools_to_use": []}"#);
    }

    #[test]
    fn extract_json_uppercase_fence() {
        let input = "```JSON\n{\"a\": 1}\n```";
        assert_eq!(extract_json(input), r#"{"a": 1}"#);
    }

    #[test]
    fn extract_json_plain_fence() {
        let input = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(input), r#"{"a": 1}"#);
    }

    #[test]
    fn extract_json_with_prefix_and_suffix() {
        let input = "Sure! {\"a\": {\"b\": 2}} Hope this helps.";
        assert_eq!(extract_json(input), r#"{"a": {"b": 2}}"#);
    }

    #[test]
    fn extract_json_ignores_braces_after_the_object() {
        let input = "Here you go: {\"tools_to_use\": [\"detect_metrics\"], \"reasoning\": \"cpu\"} \
                     Tell me if you want {more} checks.";
        assert_eq!(
            extract_json(input),
            r#"{"tools_to_use": ["detect_metrics"], "reasoning": "cpu"}"#
        );
    }

    #[test]
    fn extract_json_skips_braces_before_the_object() {
        let input = "Using {placeholders} is fine: {\"a\": \"}\"} done";
        assert_eq!(extract_json(input), r#"{"a": "}"}"#);
    }

    #[test]
    fn extract_json_malformed_object_kept_for_the_parser() {
        let input = "Decision: {\"tools_to_use\": [\"detect_errors\",]} ok";
        assert_eq!(extract_json(input), r#"{"tools_to_use": ["detect_errors",]}"#);
    }

    #[test]
    fn extract_json_nothing_found() {
        assert_eq!(extract_json("  I cannot help with that.  "), "I cannot help with that.");
        assert_eq!(extract_json("} backwards {"), "} backwards {");
    }
}
