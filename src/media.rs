//! Media type parsing and matching
//!
//! This module provides the vocabulary the negotiation engine works with:
//! [`MediaType`] values parsed from `Content-Type` headers and media ranges,
//! [`AcceptHeader`] lists parsed from `Accept` headers, and
//! [`AcceptCharset`] lists parsed from `Accept-Charset` headers.
//!
//! Quality values follow RFC 7231: an explicit `q` parameter between 0 and 1,
//! defaulting to 1.0. The `q` parameter is carried on the value itself and is
//! never stored among the ordinary parameters.

use std::fmt;
use thiserror::Error;

/// Error returned when a media type string cannot be parsed
#[derive(Debug, Error)]
#[error("invalid media type: {input:?}")]
pub struct MediaTypeError {
    /// The offending input
    pub input: String,
}

/// A parsed MIME media type or media range
///
/// The type and subtype are stored lowercased. Parameter names are
/// lowercased and unique; insertion order is preserved for display but is
/// irrelevant for comparison.
///
/// # Examples
///
/// ```
/// use parley::media::MediaType;
///
/// let parsed = MediaType::parse("Application/JSON; charset=utf-8").unwrap();
/// assert_eq!(parsed.essence(), "application/json");
/// assert_eq!(parsed.parameter("Charset"), Some("utf-8"));
/// assert_eq!(parsed.quality, 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct MediaType {
    kind: String,
    subtype: String,
    parameters: Vec<(String, String)>,
    /// Quality value from the `q` parameter, 1.0 when absent
    pub quality: f32,
}

impl MediaType {
    /// Creates a media type without parameters
    pub fn new(kind: &str, subtype: &str) -> Self {
        Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            parameters: Vec::new(),
            quality: 1.0,
        }
    }

    /// Parses a media type or media range string
    ///
    /// Accepts the usual `type/subtype;name=value;...` form. A `q`
    /// parameter becomes the quality value instead of an ordinary
    /// parameter. Parameter values may be quoted.
    pub fn parse(input: &str) -> Result<Self, MediaTypeError> {
        let mut pieces = input.split(';');
        let full_type = pieces.next().unwrap_or("").trim();

        let (kind, subtype) = full_type.split_once('/').ok_or_else(|| MediaTypeError {
            input: input.to_string(),
        })?;
        let kind = kind.trim();
        let subtype = subtype.trim();
        if kind.is_empty() || subtype.is_empty() {
            return Err(MediaTypeError {
                input: input.to_string(),
            });
        }

        let mut media_type = MediaType::new(kind, subtype);
        for piece in pieces {
            let Some((name, value)) = piece.split_once('=') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().trim_matches('"').to_string();
            if name == "q" {
                media_type.quality = value.parse::<f32>().unwrap_or(1.0).clamp(0.0, 1.0);
            } else if media_type.parameter(&name).is_none() {
                media_type.parameters.push((name, value));
            }
        }
        Ok(media_type)
    }

    /// The primary type, lowercased
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The subtype, lowercased
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// `type/subtype` without parameters
    pub fn essence(&self) -> String {
        format!("{}/{}", self.kind, self.subtype)
    }

    /// Parameters in insertion order, excluding `q`
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// Looks up a parameter value by case-insensitive name
    pub fn parameter(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.parameters
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns a copy with `name=value` appended (or replaced)
    ///
    /// Used to attach `charset` to a response content type without touching
    /// the registry's shared entry.
    pub fn with_parameter(&self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        let mut copy = self.clone();
        copy.parameters.retain(|(n, _)| *n != name);
        copy.parameters.push((name, value.to_string()));
        copy
    }

    /// Canonical string form: `type/subtype` with parameters sorted by name
    pub fn canonical(&self) -> String {
        let mut sorted: Vec<_> = self.parameters.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let mut out = self.essence();
        for (name, value) in sorted {
            out.push_str(&format!(";{name}={value}"));
        }
        out
    }

    /// Canonical form used as a registry key
    ///
    /// Strips `charset` in addition to `q`: a registration targets the type
    /// itself, while charset only matters for an individual request body.
    pub fn registration_key(&self) -> String {
        let mut sorted: Vec<_> = self
            .parameters
            .iter()
            .filter(|(name, _)| name != "charset")
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let mut out = self.essence();
        for (name, value) in sorted {
            out.push_str(&format!(";{name}={value}"));
        }
        out
    }

    /// Whether this value, treated as a media range, matches `candidate`
    ///
    /// `*/*` matches anything, `type/*` matches the type, and a full
    /// `type/subtype` requires equality. Any parameters on the range must be
    /// present with equal values on the candidate.
    pub fn matches(&self, candidate: &MediaType) -> bool {
        let kind_ok = self.kind == "*" || self.kind == candidate.kind;
        let subtype_ok = self.subtype == "*" || self.subtype == candidate.subtype;
        kind_ok
            && subtype_ok
            && self
                .parameters
                .iter()
                .all(|(name, value)| candidate.parameter(name) == Some(value.as_str()))
    }

    /// Specificity used for tie-breaking between matching ranges
    ///
    /// Exact type/subtype beats `type/*` beats `*/*`; among equals, more
    /// parameters win.
    pub fn specificity(&self) -> (u8, usize) {
        let level = match (self.kind.as_str(), self.subtype.as_str()) {
            ("*", _) => 0,
            (_, "*") => 1,
            _ => 2,
        };
        (level, self.parameters.len())
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)?;
        for (name, value) in &self.parameters {
            write!(f, "; {name}={value}")?;
        }
        Ok(())
    }
}

impl PartialEq for MediaType {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

/// A parsed `Accept` header: media ranges ordered by descending quality
///
/// # Examples
///
/// ```
/// use parley::media::AcceptHeader;
///
/// let accept = AcceptHeader::parse("text/html, application/json; q=0.8, */*; q=0.1");
/// assert_eq!(accept.ranges().len(), 3);
/// assert_eq!(accept.ranges()[0].subtype(), "html");
/// ```
#[derive(Debug, Clone)]
pub struct AcceptHeader {
    ranges: Vec<MediaType>,
}

impl AcceptHeader {
    /// Parses an `Accept` header value
    ///
    /// List items that fail to parse are skipped. The sort by quality is
    /// stable, so items with equal quality keep their header order.
    pub fn parse(header: &str) -> Self {
        let mut ranges: Vec<MediaType> = header
            .split(',')
            .filter_map(|item| MediaType::parse(item.trim()).ok())
            .collect();
        ranges.sort_by(|a, b| b.quality.total_cmp(&a.quality));
        Self { ranges }
    }

    /// The permissive default used when no `Accept` header was sent
    pub fn any() -> Self {
        Self {
            ranges: vec![MediaType::new("*", "*")],
        }
    }

    /// The parsed ranges, highest quality first
    pub fn ranges(&self) -> &[MediaType] {
        &self.ranges
    }

    /// Scores `candidate` against the accepted ranges
    ///
    /// Returns the quality and specificity of the best matching range, or
    /// `None` when nothing matches or the only matches carry `q=0`.
    pub fn score(&self, candidate: &MediaType) -> Option<(f32, (u8, usize))> {
        let mut best: Option<(f32, (u8, usize))> = None;
        for range in &self.ranges {
            if !range.matches(candidate) {
                continue;
            }
            let entry = (range.quality, range.specificity());
            let better = match best {
                None => true,
                // Most specific range decides the quality for this candidate.
                Some((_, specificity)) => range.specificity() > specificity,
            };
            if better {
                best = Some(entry);
            }
        }
        match best {
            Some((quality, _)) if quality <= 0.0 => None,
            other => other,
        }
    }
}

/// A parsed `Accept-Charset` header: `(label, quality)` pairs
#[derive(Debug, Clone)]
pub struct AcceptCharset {
    labels: Vec<(String, f32)>,
}

impl AcceptCharset {
    /// Parses an `Accept-Charset` header value
    pub fn parse(header: &str) -> Self {
        let mut labels: Vec<(String, f32)> = header
            .split(',')
            .filter_map(|item| {
                let item = item.trim();
                if item.is_empty() {
                    return None;
                }
                match item.split_once(';') {
                    Some((label, params)) => {
                        let quality = params
                            .split(';')
                            .filter_map(|p| p.trim().strip_prefix("q="))
                            .next()
                            .and_then(|q| q.parse::<f32>().ok())
                            .unwrap_or(1.0)
                            .clamp(0.0, 1.0);
                        Some((label.trim().to_ascii_lowercase(), quality))
                    }
                    None => Some((item.to_ascii_lowercase(), 1.0)),
                }
            })
            .collect();
        labels.sort_by(|a, b| b.1.total_cmp(&a.1));
        Self { labels }
    }

    /// The default used when no `Accept-Charset` header was sent
    pub fn any() -> Self {
        Self {
            labels: vec![("*".to_string(), 1.0)],
        }
    }

    /// The highest-quality charset label, if one was requested
    ///
    /// Returns `None` when the header only contains the `*` wildcard (or
    /// nothing usable), meaning the server is free to pick.
    pub fn preferred(&self) -> Option<&str> {
        self.labels
            .iter()
            .find(|(label, quality)| label != "*" && *quality > 0.0)
            .map(|(label, _)| label.as_str())
    }
}
