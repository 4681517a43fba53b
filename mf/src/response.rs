//! Finished responses and the raw output parser

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::transport::{HandleId, RawOutput, TransferError, TransferInfo};

/// Boundary between the header block and the body
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Response header, raw or tokenized
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Header {
    Raw(String),
    Parsed(BTreeMap<String, String>),
}

impl Header {
    /// Look up a field (parsed headers only)
    pub fn get(&self, name: &str) -> Option<&str> {
        match self {
            Header::Parsed(fields) => fields.get(name).map(String::as_str),
            Header::Raw(_) => None,
        }
    }
}

/// One finished request
#[derive(Debug)]
pub struct Response<T, H> {
    pub id: HandleId,
    pub info: TransferInfo,
    pub user_data: Option<T>,
    pub header: Option<Header>,
    pub body: Vec<u8>,
    pub error: TransferError,
    /// The transport handle, returned only when auto-close is disabled
    pub handle: Option<H>,
}

impl<T, H> Response<T, H> {
    /// Body as text, lossily decoded
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_ok()
    }

    pub fn status(&self) -> u16 {
        self.info.status
    }

    /// Response for a handle the transport refused to run
    pub(crate) fn rejected(id: HandleId, user_data: Option<T>, error: TransferError, handle: Option<H>) -> Self {
        Self {
            id,
            info: TransferInfo::default(),
            user_data,
            header: None,
            body: Vec::new(),
            error,
            handle,
        }
    }
}

/// Header and body split out of a handle's raw content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedContent {
    pub header: Option<Header>,
    pub body: Vec<u8>,
}

/// Split raw transport output into header and body
///
/// With `header_size > 0` the content starts with a header block ending at
/// the first blank line. Without a blank line the whole content is header.
pub fn parse_content(raw: &RawOutput, parse_headers: bool) -> ParsedContent {
    debug!(
        header_size = raw.info.header_size,
        len = raw.content.len(),
        parse_headers,
        "parse_content: called"
    );
    if raw.info.header_size == 0 {
        return ParsedContent {
            header: None,
            body: raw.content.clone(),
        };
    }

    let (head, body) = match find_subslice(&raw.content, HEADER_TERMINATOR) {
        Some(pos) => (&raw.content[..pos], &raw.content[pos + HEADER_TERMINATOR.len()..]),
        None => {
            debug!("parse_content: no blank line, treating everything as header");
            (&raw.content[..], &[][..])
        }
    };

    let head = String::from_utf8_lossy(head).into_owned();
    let header = if parse_headers {
        Header::Parsed(parse_header_block(&head))
    } else {
        Header::Raw(head)
    };

    ParsedContent {
        header: Some(header),
        body: body.to_vec(),
    }
}

/// Tokenize a header block into field name -> value
///
/// Lines without a colon (the status line) are skipped, one space after the
/// colon is dropped, and the last duplicate wins.
pub fn parse_header_block(head: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for line in head.split("\r\n") {
        if let Some((name, value)) = line.split_once(':') {
            let value = value.strip_prefix(' ').unwrap_or(value);
            fields.insert(name.to_string(), value.to_string());
        }
    }
    fields
}

/// Build the response for a drained handle
pub(crate) fn build_response<T, H>(
    id: HandleId,
    raw: RawOutput,
    error: TransferError,
    user_data: Option<T>,
    parse_headers: bool,
) -> Response<T, H> {
    let ParsedContent { header, body } = parse_content(&raw, parse_headers);
    Response {
        id,
        info: raw.info,
        user_data,
        header,
        body,
        error,
        handle: None,
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ErrorCode;

    fn raw(content: &str, header_size: usize) -> RawOutput {
        RawOutput {
            info: TransferInfo {
                header_size,
                ..Default::default()
            },
            content: content.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_parsed_headers_and_body() {
        let content = "A: 1\r\nB: 2\r\n\r\nBODY";
        let parsed = parse_content(&raw(content, 14), true);

        let header = parsed.header.unwrap();
        assert_eq!(header.get("A"), Some("1"));
        assert_eq!(header.get("B"), Some("2"));
        assert_eq!(
            header,
            Header::Parsed(BTreeMap::from([
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "2".to_string()),
            ]))
        );
        assert_eq!(parsed.body, b"BODY");
    }

    #[test]
    fn test_raw_headers_keep_original_text() {
        let content = "A: 1\r\nB: 2\r\n\r\nBODY";
        let parsed = parse_content(&raw(content, 14), false);
        assert_eq!(parsed.header, Some(Header::Raw("A: 1\r\nB: 2".to_string())));
        assert_eq!(parsed.body, b"BODY");
    }

    #[test]
    fn test_duplicate_field_last_wins() {
        let parsed = parse_content(&raw("X: 1\r\nX: 2\r\n\r\n", 14), true);
        let header = parsed.header.unwrap();
        assert_eq!(header, Header::Parsed(BTreeMap::from([("X".to_string(), "2".to_string())])));
        assert!(parsed.body.is_empty());
    }

    #[test]
    fn test_status_line_skipped_and_value_colons_kept() {
        let fields = parse_header_block("HTTP/1.1 200 OK\r\nLocation: http://x/y\r\nEmpty:\r\nTight:v");
        assert_eq!(fields.len(), 3);
        assert_eq!(fields["Location"], "http://x/y");
        assert_eq!(fields["Empty"], "");
        assert_eq!(fields["Tight"], "v");
    }

    #[test]
    fn test_only_one_leading_space_dropped() {
        let fields = parse_header_block("K:   spaced");
        assert_eq!(fields["K"], "  spaced");
    }

    #[test]
    fn test_no_header_means_all_body() {
        let parsed = parse_content(&raw("A: 1\r\n\r\nplain", 0), true);
        assert_eq!(parsed.header, None);
        assert_eq!(parsed.body, b"A: 1\r\n\r\nplain");
    }

    #[test]
    fn test_missing_blank_line_is_all_header() {
        let parsed = parse_content(&raw("A: 1\r\nB: 2", 10), false);
        assert_eq!(parsed.header, Some(Header::Raw("A: 1\r\nB: 2".to_string())));
        assert!(parsed.body.is_empty());
    }

    #[test]
    fn test_build_response_carries_error_and_data() {
        let error = TransferError::new(ErrorCode::CouldntConnect, "refused");
        let response: Response<&str, ()> =
            build_response(HandleId::new(3), raw("", 0), error.clone(), Some("ctx"), true);

        assert_eq!(response.id, HandleId::new(3));
        assert_eq!(response.user_data, Some("ctx"));
        assert_eq!(response.error, error);
        assert!(!response.is_ok());
        assert!(response.body.is_empty());
        assert!(response.header.is_none());
        assert!(response.handle.is_none());
    }
}
