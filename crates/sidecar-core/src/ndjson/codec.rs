//! Line-level encode/decode of envelopes.

use serde::Serialize;
use serde::de::DeserializeOwned;
use sidecar_proto::v1::{ClientEnvelope, ServerEnvelope};

use crate::error::{Error, Result};

/// Parse one inbound line. Returns `Ok(None)` for blank lines.
pub fn parse_server_line(line: &str) -> Result<Option<ServerEnvelope>> {
    parse_line(line)
}

/// Parse one outbound line (used by the service side and test harnesses).
pub fn parse_client_line(line: &str) -> Result<Option<ClientEnvelope>> {
    parse_line(line)
}

/// Encode an outbound envelope as a single line, without the trailing newline.
pub fn encode_client_line(envelope: &ClientEnvelope) -> Result<String> {
    encode_line(envelope)
}

/// Encode an inbound envelope as a single line, without the trailing newline.
pub fn encode_server_line(envelope: &ServerEnvelope) -> Result<String> {
    encode_line(envelope)
}

fn parse_line<T: DeserializeOwned>(line: &str) -> Result<Option<T>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let raw: serde_json::Value = serde_json::from_str(trimmed)?;
    if raw.get("type").and_then(serde_json::Value::as_str).is_none() {
        return Err(Error::NdjsonParse("Missing 'type' field".into()));
    }
    serde_json::from_value(raw)
        .map(Some)
        .map_err(|e| Error::NdjsonParse(e.to_string()))
}

fn encode_line<T: Serialize>(envelope: &T) -> Result<String> {
    Ok(serde_json::to_string(envelope)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use sidecar_proto::v1::{
        ClientEvent, ServerEvent, SetModelRequest, StderrLine, ToolInvocation,
    };

    #[test]
    fn blank_lines_are_skipped() {
        assert!(parse_server_line("").unwrap().is_none());
        assert!(parse_server_line("   \t").unwrap().is_none());
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = parse_server_line(r#"{"request_id":"r"}"#).unwrap_err();
        assert!(matches!(err, Error::NdjsonParse(msg) if msg.contains("type")));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = parse_server_line(r#"{"type":"telepathy"}"#).unwrap_err();
        assert!(matches!(err, Error::NdjsonParse(_)));
    }

    #[test]
    fn invalid_json_is_json_error() {
        let err = parse_server_line("{nope").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn parses_tool_invocation_line() {
        let line = r#"{"type":"tool_invocation","request_id":"req_1","turn_id":"t1","invocation_id":"inv-1","tool_id":"mcp__echo__ping","input":{"x":1}}"#;
        let env = parse_server_line(line).unwrap().unwrap();
        assert_eq!(env.request_id(), Some("req_1"));
        let ServerEvent::ToolInvocation(ToolInvocation {
            invocation_id,
            tool_id,
            ..
        }) = env.event
        else {
            panic!("expected tool invocation");
        };
        assert_eq!(invocation_id, "inv-1");
        assert_eq!(tool_id, "mcp__echo__ping");
    }

    #[test]
    fn encoded_lines_have_no_newline() {
        let env = ServerEnvelope::new(ServerEvent::StderrLine(StderrLine {
            line: "multi\nline".into(),
        }));
        let line = encode_server_line(&env).unwrap();
        assert!(!line.contains('\n'));
        let back = parse_server_line(&line).unwrap().unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn client_lines_decode_on_the_service_side() {
        let env = ClientEnvelope::new(ClientEvent::SetModel(SetModelRequest {
            model: "opus".into(),
        }))
        .with_session("sess-1");
        let line = encode_client_line(&env).unwrap();
        assert_eq!(parse_client_line(&line).unwrap().unwrap(), env);
    }
}
