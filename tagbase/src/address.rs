//! Address specifications
//!
//! An address names a tag and an optional path into it:
//! `Tag`, `Tag[3]`, `Tag.member`, `Tag.member[3]`, and chains such as
//! `Tag[2].member.sub[1]`.

use crate::types::{Result, TagError};
use std::fmt;
use std::str::FromStr;

/// One step of an address path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Array element (or bit, for BOOL arrays)
    Index(u32),
    /// Member of a compound element
    Member(String),
}

/// A parsed address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub tag: String,
    pub path: Vec<Segment>,
}

impl Address {
    /// Address of a whole tag
    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            tag: name.into(),
            path: Vec::new(),
        }
    }

    /// Builder method: append an index segment
    pub fn index(mut self, index: u32) -> Self {
        self.path.push(Segment::Index(index));
        self
    }

    /// Builder method: append a member segment
    pub fn member(mut self, name: impl Into<String>) -> Self {
        self.path.push(Segment::Member(name.into()));
        self
    }

    /// Parse an address string
    pub fn parse(text: &str) -> Result<Self> {
        let syntax = |reason: &str| TagError::AddressSyntax(format!("{}: '{}'", reason, text));

        let bytes = text.as_bytes();
        let mut pos = identifier_end(bytes, 0);
        if pos == 0 {
            return Err(syntax("expected a tag name"));
        }
        let mut address = Address::tag(&text[..pos]);

        while pos < bytes.len() {
            match bytes[pos] {
                b'[' => {
                    let close = text[pos..]
                        .find(']')
                        .map(|i| pos + i)
                        .ok_or_else(|| syntax("unterminated index"))?;
                    let digits = &text[pos + 1..close];
                    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(syntax("index must be a non-negative integer"));
                    }
                    let index = digits.parse().map_err(|_| syntax("index is too large"))?;
                    address.path.push(Segment::Index(index));
                    pos = close + 1;
                }
                b'.' => {
                    let start = pos + 1;
                    let end = identifier_end(bytes, start);
                    if end == start {
                        return Err(syntax("expected a member name after '.'"));
                    }
                    address.path.push(Segment::Member(text[start..end].to_string()));
                    pos = end;
                }
                _ => return Err(syntax("unexpected character")),
            }
        }

        Ok(address)
    }
}

/// End of an identifier starting at `start` (equal to `start` if none)
fn identifier_end(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() {
        let b = bytes[end];
        let ok = b == b'_' || b.is_ascii_alphabetic() || (end > start && b.is_ascii_digit());
        if !ok {
            break;
        }
        end += 1;
    }
    end
}

impl FromStr for Address {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)?;
        for segment in &self.path {
            match segment {
                Segment::Index(i) => write!(f, "[{}]", i)?,
                Segment::Member(m) => write!(f, ".{}", m)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_tag() {
        let a = Address::parse("PyBYTE").unwrap();
        assert_eq!(a, Address::tag("PyBYTE"));
    }

    #[test]
    fn test_parse_index_and_member() {
        assert_eq!(
            Address::parse("PyBYTE[5]").unwrap(),
            Address::tag("PyBYTE").index(5)
        );
        assert_eq!(
            Address::parse("PyCDTTAG.Mem1[3]").unwrap(),
            Address::tag("PyCDTTAG").member("Mem1").index(3)
        );
        assert_eq!(
            Address::parse("Line[2].Motor.Speed").unwrap(),
            Address::tag("Line").index(2).member("Motor").member("Speed")
        );
    }

    #[test]
    fn test_display_round_trip() {
        let text = "_status.SessionCount";
        assert_eq!(Address::parse(text).unwrap().to_string(), text);
        let text = "Line[2].Motor[0]";
        assert_eq!(text.parse::<Address>().unwrap().to_string(), text);
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "[1]", "Tag[", "Tag[]", "Tag[-1]", "Tag[x]", "Tag.", "Tag..A", "Tag x", "9Tag"] {
            assert!(
                matches!(Address::parse(bad), Err(TagError::AddressSyntax(_))),
                "expected syntax error for {:?}",
                bad
            );
        }
    }
}
