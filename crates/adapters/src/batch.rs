//! Multipart batch protocol client
//!
//! The tenant accepts many operations in a single `$batch` request: GETs ride
//! directly under the outer multipart boundary, state-changing operations are
//! wrapped together in a nested changeset. Responses come back as multipart
//! bodies whose parts are themselves HTTP messages, so the parser here reads
//! HTTP-in-HTTP payloads, tolerating both CRLF and bare LF line endings.
//!
//! Response ordering matches operation ordering within each section (queries
//! vs changeset); callers that interleave must correlate via Content-ID.

use std::sync::atomic::{AtomicU64, Ordering};

use skybridge_ports::{HttpMethod, TenantRequest, TenantTransport};
use tracing::{debug, warn};

/// Maximum operations per submitted batch; larger inputs are chunked.
pub const DEFAULT_BATCH_SIZE: usize = 90;

const BATCH_ENDPOINT: &str = "/api/v1/$batch";

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_boundary(prefix: &str) -> String {
    format!("{}{}", prefix, BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// A single operation inside a batch request
#[derive(Debug, Clone)]
pub struct BatchOperation {
    pub method: HttpMethod,
    pub path: String,
    pub body: Vec<u8>,
    pub content_id: String,
    pub headers: Vec<(String, String)>,
    /// GETs travel in the query section outside the changeset.
    pub is_query: bool,
}

/// Parsed response for a single batch operation
#[derive(Debug, Clone, Default)]
pub struct BatchOperationResponse {
    pub content_id: String,
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Set when this sub-part could not be parsed; siblings are unaffected.
    pub error: Option<String>,
}

impl BatchOperationResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status_code)
    }

    fn malformed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Batch protocol error
#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    #[error("batch request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("unauthorized (status {0})")]
    Unauthorized(u16),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Client for executing batches over a tenant transport
pub struct BatchClient<'a, T: TenantTransport> {
    transport: &'a T,
}

impl<'a, T: TenantTransport> BatchClient<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Execute one batch of operations and return per-operation responses.
    pub async fn execute(
        &self,
        operations: &[BatchOperation],
    ) -> Result<Vec<BatchOperationResponse>, BatchError> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }

        let batch_boundary = next_boundary("batch_");
        let changeset_boundary = next_boundary("changeset_");
        let body = build_batch_body(operations, &batch_boundary, &changeset_boundary);

        debug!(
            "Executing batch of {} operation(s), boundary {}",
            operations.len(),
            batch_boundary
        );

        let request = TenantRequest::new(HttpMethod::Post, BATCH_ENDPOINT)
            .with_header(
                "Content-Type",
                format!("multipart/mixed; boundary={}", batch_boundary),
            )
            .with_header("Accept", "multipart/mixed")
            .with_body(body);

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| BatchError::Transport(e.to_string()))?;

        match response.status {
            200 | 202 => {}
            401 | 403 => return Err(BatchError::Unauthorized(response.status)),
            status => {
                return Err(BatchError::Rejected {
                    status,
                    message: String::from_utf8_lossy(&response.body).into_owned(),
                });
            }
        }

        let content_type = response
            .header("Content-Type")
            .ok_or_else(|| BatchError::Protocol("response has no Content-Type".to_string()))?
            .to_string();

        parse_batch_response(&content_type, &response.body)
    }

    /// Execute operations in chunks of at most `batch_size`, concatenating
    /// responses in input order.
    pub async fn execute_chunked(
        &self,
        operations: &[BatchOperation],
        batch_size: usize,
    ) -> Result<Vec<BatchOperationResponse>, BatchError> {
        let batch_size = if batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            batch_size
        };

        let mut responses = Vec::with_capacity(operations.len());
        for chunk in operations.chunks(batch_size) {
            responses.extend(self.execute(chunk).await?);
        }
        Ok(responses)
    }
}

/// Build the multipart body for one batch submission.
fn build_batch_body(
    operations: &[BatchOperation],
    batch_boundary: &str,
    changeset_boundary: &str,
) -> Vec<u8> {
    let mut body: Vec<u8> = Vec::new();

    let (queries, changesets): (Vec<_>, Vec<_>) =
        operations.iter().partition(|op| op.is_query);

    for op in &queries {
        body.extend_from_slice(format!("--{}\r\n", batch_boundary).as_bytes());
        write_operation(&mut body, op);
    }

    if !changesets.is_empty() {
        body.extend_from_slice(format!("--{}\r\n", batch_boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Type: multipart/mixed; boundary={}\r\n\r\n",
                changeset_boundary
            )
            .as_bytes(),
        );

        for op in &changesets {
            body.extend_from_slice(format!("--{}\r\n", changeset_boundary).as_bytes());
            write_operation(&mut body, op);
        }

        body.extend_from_slice(format!("--{}--\r\n\r\n", changeset_boundary).as_bytes());
    }

    body.extend_from_slice(format!("--{}--\r\n", batch_boundary).as_bytes());

    body
}

/// Write one `application/http` part: part headers, embedded request line,
/// request headers, then the body when present.
fn write_operation(out: &mut Vec<u8>, op: &BatchOperation) {
    out.extend_from_slice(b"Content-Type: application/http\r\n");
    out.extend_from_slice(b"Content-Transfer-Encoding: binary\r\n");
    if !op.content_id.is_empty() {
        out.extend_from_slice(format!("Content-ID: {}\r\n", op.content_id).as_bytes());
    }
    out.extend_from_slice(b"\r\n");

    out.extend_from_slice(format!("{} {} HTTP/1.1\r\n", op.method.as_str(), op.path).as_bytes());
    for (name, value) in &op.headers {
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }

    if !op.body.is_empty() {
        out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", op.body.len()).as_bytes());
        out.extend_from_slice(&op.body);
    } else {
        out.extend_from_slice(b"\r\n");
    }

    out.extend_from_slice(b"\r\n");
}

/// Parse a multipart batch response body into per-operation responses.
pub(crate) fn parse_batch_response(
    content_type: &str,
    body: &[u8],
) -> Result<Vec<BatchOperationResponse>, BatchError> {
    if !content_type.trim_start().starts_with("multipart/") {
        return Err(BatchError::Protocol(format!(
            "expected multipart response, got {}",
            content_type
        )));
    }

    let boundary = boundary_parameter(content_type).ok_or_else(|| {
        BatchError::Protocol("no boundary in multipart response".to_string())
    })?;

    let text = String::from_utf8_lossy(body);
    let mut responses = Vec::new();

    for part in split_multipart(&text, &boundary) {
        let (headers, payload) = split_headers(&part);
        let part_content_type = header_value(&headers, "Content-Type").unwrap_or_default();

        if part_content_type.starts_with("multipart/mixed") {
            responses.extend(parse_changeset(&payload)?);
        } else if part_content_type.starts_with("application/http") {
            responses.push(parse_http_part(&headers, &payload));
        }
    }

    Ok(responses)
}

/// Parse a changeset payload: its boundary is taken from the first
/// `--<boundary>` line, then each sub-part parses as an HTTP message.
fn parse_changeset(payload: &str) -> Result<Vec<BatchOperationResponse>, BatchError> {
    let boundary = payload
        .lines()
        .find_map(|line| line.strip_prefix("--").map(|b| b.trim_end_matches("--")))
        .ok_or_else(|| BatchError::Protocol("no changeset boundary found".to_string()))?
        .to_string();

    let mut responses = Vec::new();
    for part in split_multipart(payload, &boundary) {
        let (headers, sub_payload) = split_headers(&part);
        let response = parse_http_part(&headers, &sub_payload);
        if let Some(error) = &response.error {
            warn!("Failed to parse changeset part: {}", error);
        }
        responses.push(response);
    }

    Ok(responses)
}

/// Parse one `application/http` part into an operation response. Malformed
/// payloads yield a response with `error` set instead of failing the batch.
fn parse_http_part(
    part_headers: &[(String, String)],
    payload: &str,
) -> BatchOperationResponse {
    let content_id = header_value(part_headers, "Content-ID").unwrap_or_default();

    let mut lines = payload.lines();

    let status_line = match lines.find(|line| !line.trim().is_empty()) {
        Some(line) => line,
        None => return BatchOperationResponse::malformed("empty operation response"),
    };

    let mut pieces = status_line.splitn(3, ' ');
    let (Some(_version), Some(code)) = (pieces.next(), pieces.next()) else {
        return BatchOperationResponse::malformed(format!("invalid status line: {}", status_line));
    };
    let Ok(status_code) = code.parse::<u16>() else {
        return BatchOperationResponse::malformed(format!("invalid status code: {}", code));
    };

    let mut headers = Vec::new();
    let mut body_lines = Vec::new();
    let mut in_body = false;

    for line in lines {
        if in_body {
            body_lines.push(line);
            continue;
        }
        if line.trim().is_empty() {
            in_body = true;
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let body = body_lines.join("\n").trim().as_bytes().to_vec();

    BatchOperationResponse {
        content_id,
        status_code,
        headers,
        body,
        error: None,
    }
}

/// Split a multipart payload on `--<boundary>` delimiter lines, stopping at
/// the closing `--<boundary>--` trailer. Line endings may be CRLF or LF.
fn split_multipart(text: &str, boundary: &str) -> Vec<String> {
    let delimiter = format!("--{}", boundary);
    let closing = format!("--{}--", boundary);

    let mut parts = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed == closing {
            if let Some(part) = current.take() {
                parts.push(part.join("\n"));
            }
            break;
        }
        if trimmed == delimiter {
            if let Some(part) = current.take() {
                parts.push(part.join("\n"));
            }
            current = Some(Vec::new());
            continue;
        }
        if let Some(part) = &mut current {
            part.push(line);
        }
    }

    if let Some(part) = current.take() {
        parts.push(part.join("\n"));
    }

    parts
}

/// Split a part into its header block and payload at the first blank line.
fn split_headers(part: &str) -> (Vec<(String, String)>, String) {
    let mut headers = Vec::new();
    let mut payload_lines = Vec::new();
    let mut in_payload = false;

    for line in part.lines() {
        if in_payload {
            payload_lines.push(line);
            continue;
        }
        if line.trim().is_empty() {
            in_payload = true;
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    (headers, payload_lines.join("\n"))
}

fn header_value(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.clone())
}

fn boundary_parameter(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}
