use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// A captured HTTP response, as handed to the validation engine.
///
/// Headers are kept as an ordered list of `(name, value)` pairs so the
/// original casing and duplicates survive, but lookups through
/// [`ResponseData::header`] are case-insensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    /// Numeric status code
    pub status: u16,

    /// Response headers in arrival order
    #[serde(default)]
    pub headers: Vec<(String, String)>,

    /// Response body text (possibly base64-encoded, see `body_is_base64`)
    #[serde(default)]
    pub body: String,

    /// When set, the body is base64-encoded and is decoded transparently
    /// before any body rule runs
    #[serde(default)]
    pub body_is_base64: bool,

    /// Elapsed time for the request in milliseconds
    #[serde(default)]
    pub elapsed_ms: u64,

    /// Response size in bytes
    #[serde(default)]
    pub size_bytes: u64,
}

impl ResponseData {
    /// Create a response with the given status and no headers or body
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
            body_is_base64: false,
            elapsed_ms: 0,
            size_bytes: 0,
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body text
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.size_bytes = self.body.len() as u64;
        self
    }

    /// Set a base64-encoded body
    pub fn with_base64_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.body_is_base64 = true;
        self.size_bytes = self.body.len() as u64;
        self
    }

    /// Set the elapsed time in milliseconds
    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Case-insensitive header lookup; returns the first match
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The body text with the base64 layer removed, if flagged.
    ///
    /// An undecodable body is an error so the calling rule can fail with an
    /// explanation instead of silently checking ciphertext.
    pub fn decoded_body(&self) -> Result<String, String> {
        if !self.body_is_base64 {
            return Ok(self.body.clone());
        }
        let bytes = BASE64
            .decode(self.body.trim())
            .map_err(|e| format!("Failed to decode base64 body: {}", e))?;
        String::from_utf8(bytes).map_err(|e| format!("Decoded body is not valid UTF-8: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = ResponseData::new(200)
            .with_header("Content-Type", "application/json")
            .with_header("X-Request-Id", "abc-123");

        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(response.header("x-request-id"), Some("abc-123"));
        assert_eq!(response.header("missing"), None);
    }

    #[test]
    fn test_duplicate_headers_return_first() {
        let response = ResponseData::new(200)
            .with_header("Set-Cookie", "a=1")
            .with_header("Set-Cookie", "b=2");

        assert_eq!(response.header("set-cookie"), Some("a=1"));
        assert_eq!(response.headers.len(), 2);
    }

    #[test]
    fn test_decoded_body_passthrough() {
        let response = ResponseData::new(200).with_body("plain text");
        assert_eq!(response.decoded_body().unwrap(), "plain text");
    }

    #[test]
    fn test_decoded_body_base64() {
        // "hello world"
        let response = ResponseData::new(200).with_base64_body("aGVsbG8gd29ybGQ=");
        assert_eq!(response.decoded_body().unwrap(), "hello world");
    }

    #[test]
    fn test_decoded_body_invalid_base64_is_error() {
        let response = ResponseData::new(200).with_base64_body("not!!valid!!base64");
        let err = response.decoded_body().unwrap_err();
        assert!(err.contains("base64"));
    }

    #[test]
    fn test_serialization_round_trip() {
        let response = ResponseData::new(404)
            .with_header("Content-Type", "text/plain")
            .with_body("not found")
            .with_elapsed_ms(42);

        let json = serde_json::to_string(&response).unwrap();
        let back: ResponseData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
        assert!(json.contains("elapsedMs"));
    }
}
