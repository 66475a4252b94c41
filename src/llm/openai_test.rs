use super::*;

#[test]
fn parse_text_response() {
    let json = serde_json::json!({
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": "{\"reply\":\"hi\"}" },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5 }
    })
    .to_string();
    let resp = parse_response(&json).unwrap();
    assert_eq!(resp.text(), "{\"reply\":\"hi\"}");
    assert_eq!(resp.stop_reason, "end_turn");
    assert_eq!(resp.input_tokens, 10);
    assert_eq!(resp.output_tokens, 5);
}

#[test]
fn parse_length_finish_maps_to_max_tokens() {
    let json = serde_json::json!({
        "model": "gpt-4o",
        "choices": [{ "message": { "content": "truncated" }, "finish_reason": "length" }]
    })
    .to_string();
    let resp = parse_response(&json).unwrap();
    assert_eq!(resp.stop_reason, "max_tokens");
    assert_eq!(resp.input_tokens, 0);
}

#[test]
fn parse_null_content_yields_no_blocks() {
    let json = serde_json::json!({
        "model": "gpt-4o",
        "choices": [{ "message": { "content": null }, "finish_reason": "stop" }]
    })
    .to_string();
    let resp = parse_response(&json).unwrap();
    assert!(resp.content.is_empty());
    assert_eq!(resp.text(), "");
}

#[test]
fn parse_missing_choices() {
    let json = serde_json::json!({ "model": "gpt-4o", "choices": [] }).to_string();
    assert!(matches!(parse_response(&json), Err(LlmError::ApiParse(_))));
}

#[test]
fn build_messages_prepends_system() {
    let messages = vec![Message::user("q"), Message::assistant("a")];
    let out = build_messages("be terse", &messages);
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].role, "system");
    assert_eq!(out[0].content, "be terse");
    assert_eq!(out[2].role, "assistant");
}

#[test]
fn build_messages_skips_blank_system() {
    let messages = vec![Message::user("q")];
    let out = build_messages("  ", &messages);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].role, "user");
}
