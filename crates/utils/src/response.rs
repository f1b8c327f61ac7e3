use serde::Deserialize;

/// Error body returned by the API on non-2xx responses.
///
/// Only `message` is relied upon; some endpoints use `error` or `detail`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ApiErrorBody {
    pub fn into_message(self) -> Option<String> {
        [self.message, self.error, self.detail]
            .into_iter()
            .flatten()
            .map(|m| m.trim().to_string())
            .find(|m| !m.is_empty())
    }
}

/// Pull a human-readable message out of an error response body.
///
/// Returns `None` when the body is not JSON or carries no message.
pub fn extract_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(ApiErrorBody::into_message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_message_field() {
        assert_eq!(
            extract_error_message(r#"{"message": "الاسم مطلوب"}"#).as_deref(),
            Some("الاسم مطلوب")
        );
    }

    #[test]
    fn test_extract_fallback_fields() {
        assert_eq!(
            extract_error_message(r#"{"message": "  ", "detail": "Not found."}"#).as_deref(),
            Some("Not found.")
        );
    }

    #[test]
    fn test_extract_non_json() {
        assert_eq!(extract_error_message("<html>502</html>"), None);
        assert_eq!(extract_error_message("{}"), None);
    }
}
