use serde::Serialize;

/// The realtime wire envelope for `error` events: `{code, message, requiredAction?}`.
#[derive(Debug, Clone, Serialize)]
pub struct WireError {
    pub code: &'static str,
    pub message: String,
    #[serde(rename = "requiredAction", skip_serializing_if = "Option::is_none")]
    pub required_action: Option<&'static str>,
}

impl WireError {
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            required_action: None,
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: &'static str) -> Self {
        self.required_action = Some(action);
        self
    }
}

/// Bridges a component-local error enum (which also derives
/// `error_codes::ErrorCode` for HTTP/logging purposes) to the realtime wire
/// envelope. The two representations are allowed to diverge: the derive
/// macro produces `EnumName::Variant` strings for internal use, while
/// `to_wire_error` returns the stable `SCREAMING_SNAKE_CASE` codes named in
/// the wire protocol.
pub trait ToWireError {
    fn to_wire_error(&self) -> WireError;
}
