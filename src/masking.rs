//! Masking engine for logged bodies, headers and query strings.
//!
//! A [`MaskingRule`] knows one body grammar (JSON or form-urlencoded) and a set of field
//! names. Applying it replaces the *value* of every matching field with [`PLACEHOLDER`] and
//! leaves everything else, including quotes, separators and whitespace, byte-for-byte intact.
//!
//! ```rust
//! use inlet::masking::MaskingRule;
//!
//! let rule = MaskingRule::json(["password"]);
//! assert_eq!(
//!     rule.mask(Some(r#"{"password":"secret1","name":"bob"}"#)),
//!     r#"{"password":"<MASKED>","name":"bob"}"#
//! );
//! ```

use axum::http::{HeaderMap, HeaderValue, Uri};
use regex::Regex;
use std::{fmt, ops::Range};

use crate::registry::MaskRegistry;

/// Text written in place of every masked value.
pub const PLACEHOLDER: &str = "<MASKED>";

/// Tag naming the serialization format of a body.
///
/// Identity is the exact string value, so any tag can be configured; only `json` and `form`
/// have a masking grammar.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyType(String);

impl BodyType {
    pub const JSON: &'static str = "json";
    pub const FORM: &'static str = "form";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn json() -> Self {
        Self::new(Self::JSON)
    }

    pub fn form() -> Self {
        Self::new(Self::FORM)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Detect the body type from a `Content-Type` value.
    ///
    /// Parameters such as `charset` are ignored, and structured-syntax suffixes like
    /// `application/problem+json` count as JSON.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence == "application/json" || essence.ends_with("+json") {
            Some(Self::json())
        } else if essence == "application/x-www-form-urlencoded" {
            Some(Self::form())
        } else {
            None
        }
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BodyType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for BodyType {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

/// A masking grammar plus the field names it redacts.
///
/// `pattern` is `None` when there are no fields, in which case the rule matches nothing.
#[derive(Debug, Clone)]
pub enum MaskingRule {
    /// `"<field>":"<value>"` where the value is a JSON string scalar.
    Json {
        fields: Vec<String>,
        pattern: Option<Regex>,
    },
    /// `<field>=<value>` pairs separated by `&`.
    Form {
        fields: Vec<String>,
        pattern: Option<Regex>,
    },
}

impl MaskingRule {
    pub fn json<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = collect_fields(fields);
        // Group 1 is the inner content of the value, quotes excluded.
        let pattern = alternation(&fields)
            .map(|names| compile(&format!(r#"(?s)"(?:{names})"\s*:\s*"((?:[^"\\]|\\.)*)""#)));
        Self::Json {
            fields,
            pattern: pattern.flatten(),
        }
    }

    pub fn form<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = collect_fields(fields);
        let pattern =
            alternation(&fields).map(|names| compile(&format!(r"(?:^|&)(?:{names})=([^&]*)")));
        Self::Form {
            fields,
            pattern: pattern.flatten(),
        }
    }

    /// Rule for a body type, or `None` when the type has no masking grammar.
    pub fn for_body_type<I, S>(body_type: &BodyType, fields: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match body_type.as_str() {
            BodyType::JSON => Some(Self::json(fields)),
            BodyType::FORM => Some(Self::form(fields)),
            _ => None,
        }
    }

    pub fn fields(&self) -> &[String] {
        match self {
            Self::Json { fields, .. } | Self::Form { fields, .. } => fields,
        }
    }

    fn pattern(&self) -> Option<&Regex> {
        match self {
            Self::Json { pattern, .. } | Self::Form { pattern, .. } => pattern.as_ref(),
        }
    }

    /// Byte ranges of every matched value in `message`, in order of appearance.
    pub fn spans(&self, message: &str) -> Vec<Range<usize>> {
        let Some(pattern) = self.pattern() else {
            return Vec::new();
        };
        pattern
            .captures_iter(message)
            .filter_map(|captures| captures.get(1))
            .map(|value| value.range())
            .collect()
    }

    /// Replace every matched value with [`PLACEHOLDER`].
    ///
    /// An absent message masks to the empty string. All spans are located against the
    /// original text before the output is assembled, so replacements never shift each other.
    pub fn mask(&self, message: Option<&str>) -> String {
        let Some(message) = message else {
            return String::new();
        };
        let spans = self.spans(message);
        if spans.is_empty() {
            return message.to_owned();
        }

        let mut masked = String::with_capacity(message.len() + spans.len() * PLACEHOLDER.len());
        let mut cursor = 0;
        for span in spans {
            masked.push_str(&message[cursor..span.start]);
            masked.push_str(PLACEHOLDER);
            cursor = span.end;
        }
        masked.push_str(&message[cursor..]);
        masked
    }
}

fn collect_fields<I, S>(fields: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fields
        .into_iter()
        .map(Into::into)
        .filter(|field| !field.is_empty())
        .collect()
}

fn alternation(fields: &[String]) -> Option<String> {
    if fields.is_empty() {
        return None;
    }
    Some(
        fields
            .iter()
            .map(|field| regex::escape(field))
            .collect::<Vec<_>>()
            .join("|"),
    )
}

// Field names are escaped, so the only way to fail is the size limit of the regex engine.
// Such a rule matches nothing rather than aborting the call it is logging.
fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build masking pattern");
            None
        }
    }
}

/// Mask `text` with the rule the registry holds for `body_type`.
///
/// Unknown body types and types without configured fields come back unchanged.
pub fn mask_body(registry: &MaskRegistry, body_type: Option<&BodyType>, text: &str) -> String {
    match body_type.and_then(|body_type| registry.rule(body_type)) {
        Some(rule) => rule.mask(Some(text)),
        None => text.to_owned(),
    }
}

/// Render `uri` with its query string masked by `rule`, normally a [`MaskingRule::Form`]
/// built from the sensitive parameter names.
pub fn mask_query(uri: &Uri, rule: &MaskingRule) -> String {
    let rendered = uri.to_string();
    if rule.fields().is_empty() {
        return rendered;
    }
    match rendered.split_once('?') {
        Some((base, query)) => format!("{base}?{}", rule.mask(Some(query))),
        None => rendered,
    }
}

/// Copy of `headers` where every header named in `names` (case-insensitively) carries
/// [`PLACEHOLDER`] instead of its value.
pub fn mask_headers(headers: &HeaderMap, names: &[String]) -> HeaderMap {
    let mut masked = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let sensitive = names
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(name.as_str()));
        let value = if sensitive {
            HeaderValue::from_static(PLACEHOLDER)
        } else {
            value.clone()
        };
        masked.append(name.clone(), value);
    }
    masked
}
