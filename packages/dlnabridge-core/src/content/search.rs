//! Search and sort criteria.
//!
//! Only class predicates are supported:
//!
//! ```text
//! *
//! upnp:class = "object.item.audioItem.musicTrack"
//! (upnp:class derivedfrom "object.item.videoItem" or upnp:class = "object.container.album.musicAlbum")
//! ```

use crate::soap::SoapFault;

/// A single `upnp:class` predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassTerm {
    Equals(String),
    DerivedFrom(String),
}

impl ClassTerm {
    fn matches(&self, class: &str) -> bool {
        match self {
            Self::Equals(expected) => class == expected,
            Self::DerivedFrom(base) => {
                class == base
                    || class
                        .strip_prefix(base.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            }
        }
    }
}

/// Parsed `SearchCriteria` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    Any,
    Classes(Vec<ClassTerm>),
}

impl SearchCriteria {
    /// Parses criteria, failing with fault 708 on anything outside the
    /// supported subset.
    pub fn parse(raw: &str) -> Result<Self, SoapFault> {
        let trimmed = strip_parens(raw.trim());
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::Any);
        }

        let terms = split_or(trimmed)
            .into_iter()
            .map(|term| parse_term(strip_parens(term.trim())))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| SoapFault::unsupported_search(raw))?;

        Ok(Self::Classes(terms))
    }

    #[must_use]
    pub fn matches_class(&self, class: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Classes(terms) => terms.iter().any(|t| t.matches(class)),
        }
    }
}

fn strip_parens(mut s: &str) -> &str {
    while encloses(s) {
        s = s[1..s.len() - 1].trim();
    }
    s
}

/// True when the first `(` is closed by the final `)`.
fn encloses(s: &str) -> bool {
    if !(s.starts_with('(') && s.ends_with(')')) {
        return false;
    }
    let mut depth = 0usize;
    for (i, b) in s.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == s.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Splits on ` or ` outside quoted strings.
fn split_or(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_quotes = !in_quotes,
            b' ' if !in_quotes
                && bytes.len() >= i + 4
                && bytes[i..i + 4].eq_ignore_ascii_case(b" or ") =>
            {
                parts.push(&s[start..i]);
                i += 4;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&s[start..]);
    parts
}

fn parse_term(term: &str) -> Option<ClassTerm> {
    let rest = term.strip_prefix("upnp:class")?.trim_start();
    let (op_is_equals, value) = if let Some(v) = rest.strip_prefix('=') {
        (true, v)
    } else if let Some(v) = rest.strip_prefix("derivedfrom") {
        (false, v)
    } else {
        return None;
    };
    let value = value.trim();
    let class = value.strip_prefix('"')?.strip_suffix('"')?;
    if class.is_empty() || class.contains('"') {
        return None;
    }
    Some(if op_is_equals {
        ClassTerm::Equals(class.to_string())
    } else {
        ClassTerm::DerivedFrom(class.to_string())
    })
}

/// Accepts empty sort criteria or ascending `dc:title`.
///
/// Results are always ordered by ascending title; descending order and
/// other keys fail with fault 709.
pub fn validate_sort_criteria(raw: &str) -> Result<(), SoapFault> {
    for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        let field = key.strip_prefix('+').unwrap_or(key);
        if field != "dc:title" {
            return Err(SoapFault::unsupported_sort(raw));
        }
    }
    Ok(())
}
