use serde::Deserialize;

use crate::error::RequestError;

/// One synthesis request, as read from a single input line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Request {
    pub id: u32,
    #[serde(rename = "modelPath")]
    pub model_path: String,
    #[serde(rename = "inputText")]
    pub input_text: String,
}

/// Parse one input line. Blank lines yield `Ok(None)` and are skipped.
pub fn parse_request(line: &[u8]) -> Result<Option<Request>, RequestError> {
    let text = std::str::from_utf8(line)
        .map_err(|e| RequestError::Malformed(format!("Request is not valid UTF-8: {e}")))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let request: Request = serde_json::from_str(text)
        .map_err(|e| RequestError::Malformed(format!("Error parsing request \"{text}\": {e}")))?;
    validate_request(&request)?;
    Ok(Some(request))
}

/// Validate fields serde cannot check on its own
pub fn validate_request(request: &Request) -> Result<(), RequestError> {
    if request.model_path.trim().is_empty() {
        return Err(RequestError::Malformed(format!(
            "Request {} has an empty \"modelPath\" member",
            request.id
        )));
    }
    Ok(())
}
