//! Common value types: tags, directions, scripts, languages, features.

use core::fmt;
use core::str::FromStr;

pub use read_fonts::types::Tag;

/// Special cluster bounds meaning "applies to the whole buffer".
pub const FEATURE_GLOBAL_START: u32 = 0;
pub const FEATURE_GLOBAL_END: u32 = u32::MAX;

pub(crate) trait TagExt {
    fn default_script() -> Self;
    fn default_language() -> Self;
    /// Converts the tag into a script tag: lowercase, first letter uppercase.
    fn to_script_tag(self) -> Self;
}

impl TagExt for Tag {
    fn default_script() -> Self {
        Tag::new(b"DFLT")
    }

    fn default_language() -> Self {
        Tag::new(b"dflt")
    }

    fn to_script_tag(self) -> Self {
        let b = self.to_be_bytes();
        Tag::new(&[
            b[0].to_ascii_uppercase(),
            b[1].to_ascii_lowercase(),
            b[2].to_ascii_lowercase(),
            b[3].to_ascii_lowercase(),
        ])
    }
}

/// Direction of a text segment.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Direction {
    /// Unset direction. A shape plan cannot be built from it.
    #[default]
    Invalid,
    LeftToRight,
    RightToLeft,
    TopToBottom,
    BottomToTop,
}

impl Direction {
    #[inline]
    pub(crate) fn is_horizontal(self) -> bool {
        matches!(self, Direction::LeftToRight | Direction::RightToLeft)
    }

    #[inline]
    pub(crate) fn is_vertical(self) -> bool {
        matches!(self, Direction::TopToBottom | Direction::BottomToTop)
    }

    #[inline]
    pub(crate) fn is_forward(self) -> bool {
        matches!(self, Direction::LeftToRight | Direction::TopToBottom)
    }

    #[inline]
    pub(crate) fn is_backward(self) -> bool {
        matches!(self, Direction::RightToLeft | Direction::BottomToTop)
    }

    pub(crate) fn reverse(self) -> Self {
        match self {
            Direction::Invalid => Direction::Invalid,
            Direction::LeftToRight => Direction::RightToLeft,
            Direction::RightToLeft => Direction::LeftToRight,
            Direction::TopToBottom => Direction::BottomToTop,
            Direction::BottomToTop => Direction::TopToBottom,
        }
    }
}

impl FromStr for Direction {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.as_bytes().first().map(u8::to_ascii_lowercase) {
            Some(b'l') => Ok(Direction::LeftToRight),
            Some(b'r') => Ok(Direction::RightToLeft),
            Some(b't') => Ok(Direction::TopToBottom),
            Some(b'b') => Ok(Direction::BottomToTop),
            _ => Err("invalid direction"),
        }
    }
}

/// An ISO 15924 script.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Script(pub(crate) Tag);

impl Script {
    /// Converts an ISO 15924 tag like `Deva` into a script.
    pub fn from_iso15924_tag(tag: Tag) -> Option<Self> {
        let bytes = tag.to_be_bytes();
        if !bytes.iter().all(|b| b.is_ascii_alphabetic() || *b == b' ') {
            return None;
        }

        // Be lenient about case.
        Some(Script(tag.to_script_tag()))
    }

    #[inline]
    pub fn tag(self) -> Tag {
        self.0
    }
}

impl FromStr for Script {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [b' '; 4];
        for (i, b) in s.bytes().take(4).enumerate() {
            bytes[i] = b;
        }
        Script::from_iso15924_tag(Tag::new(&bytes)).ok_or("invalid script")
    }
}

/// A BCP 47 language tag, lowercased.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Language(pub(crate) String);

impl Language {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The primary subtag, used for OpenType language system selection.
    pub(crate) fn primary(&self) -> &str {
        self.0.split(['-', '_']).next().unwrap_or("")
    }
}

impl FromStr for Language {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("invalid language");
        }
        Ok(Language(s.to_ascii_lowercase()))
    }
}

/// A font feature, enabled over a cluster range of the buffer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Feature {
    pub tag: Tag,
    pub value: u32,
    pub start: u32,
    pub end: u32,
}

impl Feature {
    pub fn new(tag: Tag, value: u32, range: impl core::ops::RangeBounds<u32>) -> Self {
        use core::ops::Bound;
        let start = match range.start_bound() {
            Bound::Included(&v) => v,
            Bound::Excluded(&v) => v.saturating_add(1),
            Bound::Unbounded => FEATURE_GLOBAL_START,
        };
        let end = match range.end_bound() {
            Bound::Included(&v) => v,
            Bound::Excluded(&v) => v.saturating_sub(1).saturating_add(1),
            Bound::Unbounded => FEATURE_GLOBAL_END,
        };
        Feature {
            tag,
            value,
            start,
            end,
        }
    }

    #[inline]
    pub(crate) fn is_global(&self) -> bool {
        self.start == FEATURE_GLOBAL_START && self.end == FEATURE_GLOBAL_END
    }
}

impl FromStr for Feature {
    type Err = &'static str;

    /// Parses `kern`, `+kern`, `-kern`, `kern=1`, `kern[3:5]` and
    /// combinations thereof.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("invalid feature");
        }

        let (mut value, s) = match s.as_bytes()[0] {
            b'+' => (1, &s[1..]),
            b'-' => (0, &s[1..]),
            _ => (1, s),
        };

        let (s, range) = match s.find('[') {
            Some(i) => {
                let close = s.rfind(']').ok_or("invalid feature")?;
                (&s[..i], Some(&s[i + 1..close]))
            }
            None => (s, None),
        };

        let (s, explicit_value) = match s.find('=') {
            Some(i) => (&s[..i], Some(&s[i + 1..])),
            None => (s, None),
        };

        if let Some(v) = explicit_value {
            value = v.parse::<u32>().map_err(|_| "invalid feature value")?;
        }

        let (start, end) = match range {
            Some(r) => {
                let mut parts = r.splitn(2, ':');
                let start = parts.next().unwrap_or("");
                let end = parts.next().unwrap_or(start);
                let parse = |p: &str, default| {
                    if p.is_empty() {
                        Ok(default)
                    } else {
                        p.parse::<u32>().map_err(|_| "invalid feature range")
                    }
                };
                (
                    parse(start, FEATURE_GLOBAL_START)?,
                    parse(end, FEATURE_GLOBAL_END)?,
                )
            }
            None => (FEATURE_GLOBAL_START, FEATURE_GLOBAL_END),
        };

        if s.is_empty() || s.len() > 4 || !s.bytes().all(|b| b.is_ascii_graphic()) {
            return Err("invalid feature tag");
        }
        let mut tag = [b' '; 4];
        tag[..s.len()].copy_from_slice(s.as_bytes());

        Ok(Feature {
            tag: Tag::new(&tag),
            value,
            start,
            end,
        })
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.tag, self.value)
    }
}

/// A design-space position on a single variation axis.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Variation {
    pub tag: Tag,
    pub value: f32,
}

impl FromStr for Variation {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, value) = s.split_once('=').ok_or("invalid variation")?;
        let tag = tag.trim();
        if tag.is_empty() || tag.len() > 4 {
            return Err("invalid variation tag");
        }
        let mut bytes = [b' '; 4];
        bytes[..tag.len()].copy_from_slice(tag.as_bytes());
        Ok(Variation {
            tag: Tag::new(&bytes),
            value: value.trim().parse().map_err(|_| "invalid variation value")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_feature() {
        let f = Feature::from_str("kern").unwrap();
        assert_eq!(f.tag, Tag::new(b"kern"));
        assert_eq!(f.value, 1);
        assert!(f.is_global());

        let f = Feature::from_str("-liga").unwrap();
        assert_eq!(f.value, 0);

        let f = Feature::from_str("aalt=3").unwrap();
        assert_eq!(f.value, 3);

        let f = Feature::from_str("kern[3:5]").unwrap();
        assert_eq!((f.start, f.end), (3, 5));
        assert!(!f.is_global());
    }

    #[test]
    fn parse_variation() {
        let v = Variation::from_str("wght=600").unwrap();
        assert_eq!(v.tag, Tag::new(b"wght"));
        assert_eq!(v.value, 600.0);
    }

    #[test]
    fn script_from_tag() {
        let s = Script::from_iso15924_tag(Tag::new(b"DEVA")).unwrap();
        assert_eq!(s.tag(), Tag::new(b"Deva"));
        assert!(Script::from_iso15924_tag(Tag::new(b"12ab")).is_none());
    }
}
