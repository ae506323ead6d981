//! Correlation key expressions.
//!
//! An expression is literal text mixed with message references:
//!
//! - `%message{%uniqueId}`: the message's unique id
//! - `%message{name}`: the value of metadata key `name`
//!
//! The default `%message{%uniqueId}` correlates on message identity.

use std::fmt;
use std::str::FromStr;

use crate::workflow::message::IngressMessage;

const OPEN: &str = "%message{";
const UNIQUE_ID: &str = "%uniqueId";

/// Default expression: correlate on message id.
pub const DEFAULT_KEY_EXPRESSION: &str = "%message{%uniqueId}";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyExpressionError {
    #[error("unterminated message reference at byte {0}")]
    Unterminated(usize),

    #[error("empty message reference at byte {0}")]
    EmptyReference(usize),

    #[error("unknown message property '{0}'")]
    UnknownProperty(String),

    #[error("expression does not reference the message")]
    NoMessageReference,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("metadata key '{0}' missing from message")]
    MissingMetadata(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    UniqueId,
    Metadata(String),
}

/// A parsed correlation key expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExpression {
    source: String,
    segments: Vec<Segment>,
}

impl KeyExpression {
    /// Resolve the key for `message`.
    pub fn resolve(&self, message: &IngressMessage) -> Result<String, KeyError> {
        let mut key = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => key.push_str(text),
                Segment::UniqueId => key.push_str(message.unique_id()),
                Segment::Metadata(name) => {
                    let value = message
                        .metadata(name)
                        .ok_or_else(|| KeyError::MissingMetadata(name.clone()))?;
                    key.push_str(value);
                }
            }
        }
        Ok(key)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Default for KeyExpression {
    fn default() -> Self {
        Self {
            source: DEFAULT_KEY_EXPRESSION.to_string(),
            segments: vec![Segment::UniqueId],
        }
    }
}

impl FromStr for KeyExpression {
    type Err = KeyExpressionError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let body_start = start + OPEN.len();
            let close = rest[body_start..]
                .find('}')
                .ok_or(KeyExpressionError::Unterminated(offset + start))?;
            let name = rest[body_start..body_start + close].trim();

            segments.push(match name {
                "" => return Err(KeyExpressionError::EmptyReference(offset + start)),
                UNIQUE_ID => Segment::UniqueId,
                other if other.starts_with('%') => {
                    return Err(KeyExpressionError::UnknownProperty(other.to_string()))
                }
                other => Segment::Metadata(other.to_string()),
            });

            let consumed = body_start + close + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        if !segments.iter().any(|s| !matches!(s, Segment::Literal(_))) {
            return Err(KeyExpressionError::NoMessageReference);
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }
}

impl fmt::Display for KeyExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
