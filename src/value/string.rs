use crate::*;

///
/// String contents.
///
/// Both mutable and immutable strings are rope-backed; a frozen string is
/// immutable and, when it came through the pool, pointer-shared with every
/// other frozen string of the same bytes and encoding.
///
#[derive(Debug, Clone)]
pub struct RString {
    rope: Rope,
    frozen: bool,
}

impl PartialEq for RString {
    fn eq(&self, other: &Self) -> bool {
        self.rope.as_bytes() == other.rope.as_bytes()
    }
}

impl RString {
    pub fn mutable(bytes: Vec<u8>, encoding: EncodingRef) -> Self {
        RString {
            rope: Rope::from_bytes(bytes.into_boxed_slice(), encoding),
            frozen: false,
        }
    }

    pub fn mutable_str(s: &str, encoding: EncodingRef) -> Self {
        RString::mutable(s.as_bytes().to_vec(), encoding)
    }

    pub fn from_rope(rope: Rope) -> Self {
        RString { rope, frozen: false }
    }

    /// A frozen string resolved through the frozen-string pool.
    pub fn frozen_interned(bytes: &[u8], encoding: EncodingRef) -> Self {
        RString {
            rope: intern_rope(bytes, encoding),
            frozen: true,
        }
    }

    /// A frozen duplicate of `self`, interned so equal frozen content is
    /// pointer-identical.
    pub fn frozen_dup(&self) -> RString {
        if self.frozen {
            return self.clone();
        }
        RString::frozen_interned(self.rope.as_bytes(), self.rope.encoding())
    }

    #[inline(always)]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    #[inline(always)]
    pub fn rope(&self) -> &Rope {
        &self.rope
    }

    pub fn encoding(&self) -> EncodingRef {
        self.rope.encoding()
    }

    pub fn code_range(&self) -> CodeRange {
        self.rope.code_range()
    }

    pub fn byte_len(&self) -> usize {
        self.rope.byte_len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.rope.as_bytes()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.rope.as_str()
    }

    pub fn to_s(&self) -> String {
        self.rope.to_string_lossy()
    }

    /// `eql?` for strings: same bytes, and compatible encodings (identical,
    /// or both sides 7-bit under ASCII-compatible encodings).
    pub fn eql(&self, other: &RString) -> bool {
        if self.as_bytes() != other.as_bytes() {
            return false;
        }
        if self.encoding() == other.encoding() {
            return true;
        }
        self.rope.is_7bit()
            && other.rope.is_7bit()
            && self.encoding().is_ascii_compatible()
            && other.encoding().is_ascii_compatible()
    }

    /// In-place append. Replaces the rope with a concat node; the old rope
    /// stays alive for anyone still holding it.
    pub fn append(&mut self, other: &RString) -> Result<(), RubyError> {
        if self.frozen {
            return Err(RubyError::frozen("can't modify frozen String"));
        }
        self.rope = Rope::concat(&self.rope, &other.rope);
        Ok(())
    }

    pub fn replace_rope(&mut self, rope: Rope) -> Result<(), RubyError> {
        if self.frozen {
            return Err(RubyError::frozen("can't modify frozen String"));
        }
        self.rope = rope;
        Ok(())
    }

    /// Byte index of `needle` in `self` at or after `start`.
    pub fn byte_index(&self, needle: &[u8], start: usize) -> Option<usize> {
        let hay = self.as_bytes();
        if start > hay.len() {
            return None;
        }
        if needle.is_empty() {
            return Some(start);
        }
        hay[start..]
            .windows(needle.len())
            .position(|w| w == needle)
            .map(|pos| pos + start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeze_and_intern() {
        let mut s = RString::mutable_str("mutable", EncodingRef::UTF_8);
        assert!(!s.is_frozen());
        let f1 = s.frozen_dup();
        let f2 = s.frozen_dup();
        assert!(f1.is_frozen());
        assert!(f1.rope().ptr_eq(f2.rope()));
        s.freeze();
        assert!(s.append(&f1).is_err());
    }

    #[test]
    fn append_builds_rope() {
        let mut s = RString::mutable_str("foo", EncodingRef::UTF_8);
        let t = RString::mutable_str("bar", EncodingRef::UTF_8);
        s.append(&t).unwrap();
        assert_eq!(b"foobar", s.as_bytes());
        assert_eq!(6, s.byte_len());
    }

    #[test]
    fn eql_requires_compatible_encoding() {
        let utf8 = RString::mutable_str("ascii", EncodingRef::UTF_8);
        let ascii = RString::mutable_str("ascii", EncodingRef::US_ASCII);
        assert!(utf8.eql(&ascii));

        let wide_a = RString::mutable(vec![0xc3, 0xa9], EncodingRef::UTF_8);
        let wide_b = RString::mutable(vec![0xc3, 0xa9], EncodingRef::ISO_8859_1);
        assert!(!wide_a.eql(&wide_b));
        assert!(wide_a.eql(&wide_a.clone()));
    }

    #[test]
    fn byte_index() {
        let s = RString::mutable_str("hello world hello", EncodingRef::UTF_8);
        assert_eq!(Some(0), s.byte_index(b"hello", 0));
        assert_eq!(Some(12), s.byte_index(b"hello", 1));
        assert_eq!(None, s.byte_index(b"absent", 0));
        assert_eq!(Some(3), s.byte_index(b"", 3));
        assert_eq!(None, s.byte_index(b"x", 100));
    }
}
