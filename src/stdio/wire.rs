//! Request and response shapes of the line-delimited JSON protocol.
//!
//! | Direction         | Shape                                                |
//! |-------------------|------------------------------------------------------|
//! | adapter → backend | `{"seq": n, "translate": ["STROKE", …]}`             |
//! | adapter → backend | `{"seq": n, "untranslate": "text"}`                  |
//! | backend → adapter | `{"seq": n, "translation": "text"}`                  |
//! | backend → adapter | `{"seq": n, "reverse-translation": [["STROKE"], …]}` |
//!
//! Absent response fields mean "no result". Framing (the trailing `\n`) is
//! added by [`StdioCodec`](crate::stdio::codec::StdioCodec).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppError, Result};

/// What a request asks the backend to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Translate an ordered sequence of strokes.
    Translate(Vec<String>),
    /// Find the stroke sequences that would produce a text.
    Untranslate(String),
}

impl RequestKind {
    /// Short label used in log fields.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Translate(_) => "translate",
            Self::Untranslate(_) => "untranslate",
        }
    }
}

/// One outbound request, correlated to its response by `seq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Sequence number, unique among pending requests.
    pub seq: u64,
    /// Requested operation.
    pub kind: RequestKind,
}

/// A decoded response line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    /// Sequence number of the request being answered.
    pub seq: u64,
    /// Translation text; `None` means no match.
    pub translation: Option<String>,
    /// Stroke sequences producing the requested text; `None` means no match.
    pub reverse_translation: Option<Vec<Vec<String>>>,
}

/// A stdout line that could not be decoded as a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    /// Sequence number, when the line carried a usable one.
    pub seq: Option<u64>,
    /// Why decoding failed.
    pub reason: String,
    /// The offending line, verbatim.
    pub raw: String,
}

/// Result of decoding one stdout line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A well-formed response.
    Response(Response),
    /// A line that does not follow the response schema.
    Malformed(MalformedLine),
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireRequest<'a> {
    Translate { seq: u64, translate: &'a [String] },
    Untranslate { seq: u64, untranslate: &'a str },
}

#[derive(Deserialize)]
struct WireResponse {
    seq: u64,
    #[serde(default)]
    translation: Option<String>,
    #[serde(default, rename = "reverse-translation")]
    reverse_translation: Option<Vec<Vec<String>>>,
}

/// Serialise `request` to a single-line JSON string (without the newline).
///
/// # Errors
///
/// Returns [`AppError::Protocol`] if serialisation fails, which cannot
/// happen for requests built by the adapter itself.
pub fn encode_request(request: &Request) -> Result<String> {
    let wire = match &request.kind {
        RequestKind::Translate(strokes) => WireRequest::Translate {
            seq: request.seq,
            translate: strokes,
        },
        RequestKind::Untranslate(text) => WireRequest::Untranslate {
            seq: request.seq,
            untranslate: text,
        },
    };

    serde_json::to_string(&wire)
        .map_err(|e| AppError::Protocol(format!("failed to serialise request: {e}")))
}

/// Decode one stdout line.
///
/// Never fails: anything that is not a JSON object with an integer `seq`,
/// or whose result fields have the wrong type, becomes
/// [`Inbound::Malformed`].
#[must_use]
pub fn decode_line(line: &str) -> Inbound {
    let malformed = |seq: Option<u64>, reason: String| {
        Inbound::Malformed(MalformedLine {
            seq,
            reason,
            raw: line.to_owned(),
        })
    };

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return malformed(None, format!("malformed json: {e}")),
    };

    if !value.is_object() {
        return malformed(None, "expected a json object".to_owned());
    }

    let Some(seq) = value.get("seq").and_then(Value::as_u64) else {
        return malformed(None, "missing or invalid `seq`".to_owned());
    };

    match serde_json::from_value::<WireResponse>(value) {
        Ok(wire) => Inbound::Response(Response {
            seq: wire.seq,
            translation: wire.translation,
            reverse_translation: wire.reverse_translation,
        }),
        Err(e) => malformed(Some(seq), format!("invalid response fields: {e}")),
    }
}
