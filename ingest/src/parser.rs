//! Tokenizer for upstream changeset lines.
//!
//! ## Line format
//!
//! One changeset per line, tokens separated by single spaces, each token a
//! one-character kind marker followed by its value:
//!
//! ```text
//! c<id> k<edits> s<created_at> e<closed_at> d<comments> i<uid> u<user> x<min_x> y<min_y> X<max_x> Y<max_y> T<k=v,k=v,...>
//! ```
//!
//! The bounding-box values are empty when the changeset has no box. Spaces,
//! commas and equals signs inside values arrive escaped (`%20%`, `%2c%`, ...),
//! so the tag body can be split on `,` and `=` without an unescaping pass.
//!
//! Parsing never touches any dictionary: a line either becomes a fully
//! validated [`RawChangeset`] or a [`LineError`].

use indexmap::IndexMap;
use thiserror::Error;

use crate::position::BoundingBox;

/// Minimum number of tokens on a line.
pub const MIN_TOKENS: usize = 12;

const EDITS: usize = 1;
const CREATED_AT: usize = 2;
const USER: usize = 6;
const MIN_X: usize = 7;
const MIN_Y: usize = 8;
const MAX_X: usize = 9;
const MAX_Y: usize = 10;
const TAGS: usize = 11;

/// Expected kind marker per consumed token position.
const MARKERS: [(usize, char); 8] = [
    (EDITS, 'k'),
    (CREATED_AT, 's'),
    (USER, 'u'),
    (MIN_X, 'x'),
    (MIN_Y, 'y'),
    (MAX_X, 'X'),
    (MAX_Y, 'Y'),
    (TAGS, 'T'),
];

/// A line that cannot be decoded. Recoverable: the pipeline logs it and moves on.
#[derive(Debug, Error, PartialEq)]
pub enum LineError {
    #[error("expected at least {} tokens, found {found}", MIN_TOKENS)]
    TooFewTokens { found: usize },

    #[error("token {position} should start with '{expected}', found {token:?}")]
    UnexpectedMarker {
        position: usize,
        expected: char,
        token: String,
    },

    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("malformed tag {0:?}, expected key=value")]
    MalformedTag(String),
}

/// A validated but not yet encoded changeset line, borrowing from the line.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChangeset<'a> {
    pub edits: u32,
    /// ISO-8601 creation timestamp, marker removed.
    pub created_at: &'a str,
    pub user: &'a str,
    pub bbox: Option<BoundingBox>,
    /// Tags in line order; a repeated key keeps its first position and last value.
    pub tags: IndexMap<&'a str, &'a str>,
}

impl<'a> RawChangeset<'a> {
    /// `"YYYY-MM"` prefix of the creation timestamp.
    pub fn month_key(&self) -> Option<&'a str> {
        self.created_at.get(..7)
    }

    /// `"YYYY"` prefix of the creation timestamp.
    pub fn year_key(&self) -> Option<&'a str> {
        self.created_at.get(..4)
    }
}

/// Split a line (without its terminator) on single spaces.
pub fn tokenize(line: &str) -> Vec<&str> {
    line.split(' ').collect()
}

/// Decode one line.
pub fn parse_line(line: &str) -> Result<RawChangeset<'_>, LineError> {
    let tokens = tokenize(line);
    if tokens.len() < MIN_TOKENS {
        return Err(LineError::TooFewTokens {
            found: tokens.len(),
        });
    }
    for (position, expected) in MARKERS {
        if !tokens[position].starts_with(expected) {
            return Err(LineError::UnexpectedMarker {
                position,
                expected,
                token: tokens[position].to_string(),
            });
        }
    }

    let value = |position: usize| marker_value(tokens[position]);

    let edits = value(EDITS)
        .parse::<u32>()
        .map_err(|_| LineError::InvalidNumber {
            field: "edit count",
            value: value(EDITS).to_string(),
        })?;

    let bbox = if value(MIN_X).is_empty() {
        None
    } else {
        Some(BoundingBox {
            min_x: parse_coordinate("min_x", value(MIN_X))?,
            min_y: parse_coordinate("min_y", value(MIN_Y))?,
            max_x: parse_coordinate("max_x", value(MAX_X))?,
            max_y: parse_coordinate("max_y", value(MAX_Y))?,
        })
    };

    Ok(RawChangeset {
        edits,
        created_at: value(CREATED_AT),
        user: value(USER),
        bbox,
        tags: parse_tags(tag_body(value(TAGS)))?,
    })
}

/// Token value with its (ASCII, already validated) marker removed.
fn marker_value(token: &str) -> &str {
    &token[1..]
}

fn parse_coordinate(field: &'static str, value: &str) -> Result<f64, LineError> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(LineError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
    }
}

/// Strip an optional `(`…`)` wrapper around the tag list.
fn tag_body(value: &str) -> &str {
    value
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .unwrap_or(value)
}

/// Split `k=v,k=v,...` into an ordered map. An empty body has no tags.
pub fn parse_tags(body: &str) -> Result<IndexMap<&str, &str>, LineError> {
    let mut tags = IndexMap::new();
    if body.is_empty() {
        return Ok(tags);
    }
    for pair in body.split(',') {
        let mut parts = pair.split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) => {
                tags.insert(key, value);
            }
            _ => return Err(LineError::MalformedTag(pair.to_string())),
        }
    }
    Ok(tags)
}
