//! Field paths
//!
//! Nested fields are addressed as `name`, `group.child`, `repeater[2].child`
//! or `flexible[0].child`. The empty path addresses the root form.

use std::fmt;
use std::str::FromStr;

use crate::error::{FormError, Result};

/// One step of a field path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A named field in a form
    Field(String),
    /// A row of a repeater or an item of a flexible field
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, ".{}", name),
            Self::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// A parsed field path
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// The root form
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(path: &str) -> Result<Self> {
        let invalid = |reason: &str| FormError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        if path.is_empty() {
            return Ok(Self { segments });
        }

        for part in path.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(pos) => part.split_at(pos),
                None => (part, ""),
            };
            if name.is_empty() {
                return Err(invalid("empty field name"));
            }
            if name.contains(']') {
                return Err(invalid("unbalanced ']'"));
            }
            segments.push(PathSegment::Field(name.to_string()));

            while !rest.is_empty() {
                let inner = rest
                    .strip_prefix('[')
                    .ok_or_else(|| invalid("expected '['"))?;
                let end = inner.find(']').ok_or_else(|| invalid("missing ']'"))?;
                let index = inner[..end]
                    .parse::<usize>()
                    .map_err(|_| invalid("row index must be a non-negative integer"))?;
                segments.push(PathSegment::Index(index));
                rest = &inner[end + 1..];
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a field name
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Field(name.into()));
        self
    }

    /// Append a row index
    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(PathSegment::Index(index));
        self
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i == 0 => write!(f, "{}", name)?,
                other => write!(f, "{}", other)?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_nested_path() {
        let path = FieldPath::parse("blocks[1].gallery[0].caption").unwrap();
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Field("blocks".into()),
                PathSegment::Index(1),
                PathSegment::Field("gallery".into()),
                PathSegment::Index(0),
                PathSegment::Field("caption".into()),
            ]
        );
        assert_eq!(path.to_string(), "blocks[1].gallery[0].caption");
    }

    #[test]
    fn test_empty_path_is_root() {
        assert!(FieldPath::parse("").unwrap().is_root());
        assert_eq!(FieldPath::root().to_string(), "");
    }

    #[test]
    fn test_builder_matches_parse() {
        let built = FieldPath::root().field("tags").index(2).field("label");
        assert_eq!(built, "tags[2].label".parse().unwrap());
    }

    #[rstest]
    #[case("profile.")]
    #[case(".profile")]
    #[case("tags[x]")]
    #[case("tags[1")]
    #[case("tags]1[")]
    #[case("tags[-1]")]
    #[case("tags[1]x")]
    fn test_rejects_malformed(#[case] path: &str) {
        assert!(matches!(
            FieldPath::parse(path),
            Err(FormError::InvalidPath { .. })
        ));
    }
}
