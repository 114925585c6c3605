use smithrun_core::SmithrunError;

#[test]
fn error_display_for_tool_call_failed() {
    let err = SmithrunError::ToolCallFailed {
        tool_name: "search".to_string(),
        reason: "timeout".to_string(),
    };
    assert_eq!(format!("{err}"), "Tool call failed for 'search': timeout");
}

#[test]
fn error_display_for_panicked() {
    let err = SmithrunError::Panicked("index out of bounds".to_string());
    assert_eq!(format!("{err}"), "Operation panicked: index out of bounds");
}

#[test]
fn error_display_for_serde() {
    let parse_error = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
    let err = SmithrunError::from(parse_error);
    assert!(format!("{err}").starts_with("Serialization/deserialization error: "));
}

#[test]
fn custom_error_displays_message_verbatim() {
    assert_eq!(format!("{}", SmithrunError::custom("something odd")), "something odd");
}
