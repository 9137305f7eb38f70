use crate::encoding::EncodingRef;
use fxhash::FxHashMap;
use once_cell::sync::{Lazy, OnceCell};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

///
/// Classification of a byte sequence under its declared encoding.
///
/// Computed lazily and cached on the rope.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CodeRange {
    Unknown = 0,
    SevenBit = 1,
    Valid = 2,
    Broken = 3,
}

impl CodeRange {
    fn from_u8(n: u8) -> Self {
        match n {
            1 => CodeRange::SevenBit,
            2 => CodeRange::Valid,
            3 => CodeRange::Broken,
            _ => CodeRange::Unknown,
        }
    }
}

///
/// An immutable byte sequence with an associated encoding.
///
/// Concatenation, substring and repeat build logical trees; any byte-level
/// access forces flattening, which is cached for the life of the rope.
///
#[derive(Clone)]
pub struct Rope(Arc<RopeInner>);

struct RopeInner {
    encoding: EncodingRef,
    byte_len: usize,
    code_range: AtomicU8,
    node: RopeNode,
    flat: OnceCell<Box<[u8]>>,
}

enum RopeNode {
    Leaf(Box<[u8]>),
    Concat(Rope, Rope),
    Substring { parent: Rope, offset: usize },
    Repeat { child: Rope, count: usize },
}

impl Rope {
    fn with_node(
        encoding: EncodingRef,
        byte_len: usize,
        code_range: CodeRange,
        node: RopeNode,
    ) -> Self {
        Rope(Arc::new(RopeInner {
            encoding,
            byte_len,
            code_range: AtomicU8::new(code_range as u8),
            node,
            flat: OnceCell::new(),
        }))
    }

    pub fn from_bytes(bytes: impl Into<Box<[u8]>>, encoding: EncodingRef) -> Self {
        let bytes = bytes.into();
        let len = bytes.len();
        Rope::with_node(encoding, len, CodeRange::Unknown, RopeNode::Leaf(bytes))
    }

    pub fn from_str(s: &str, encoding: EncodingRef) -> Self {
        Rope::from_bytes(s.as_bytes().to_vec().into_boxed_slice(), encoding)
    }

    pub fn concat(lhs: &Rope, rhs: &Rope) -> Self {
        let cr = match (lhs.known_code_range(), rhs.known_code_range()) {
            (Some(CodeRange::SevenBit), Some(CodeRange::SevenBit)) => CodeRange::SevenBit,
            _ => CodeRange::Unknown,
        };
        Rope::with_node(
            lhs.encoding(),
            lhs.byte_len() + rhs.byte_len(),
            cr,
            RopeNode::Concat(lhs.clone(), rhs.clone()),
        )
    }

    /// A view of `len` bytes of `parent` starting at byte `offset`.
    ///
    /// ### Panics
    /// Panics if the range exceeds the parent.
    pub fn substring(parent: &Rope, offset: usize, len: usize) -> Self {
        assert!(offset + len <= parent.byte_len());
        // 7-bit is closed under substring; everything else must be re-scanned.
        let cr = match parent.known_code_range() {
            Some(CodeRange::SevenBit) => CodeRange::SevenBit,
            _ => CodeRange::Unknown,
        };
        Rope::with_node(
            parent.encoding(),
            len,
            cr,
            RopeNode::Substring {
                parent: parent.clone(),
                offset,
            },
        )
    }

    pub fn repeat(child: &Rope, count: usize) -> Self {
        let cr = match child.known_code_range() {
            Some(CodeRange::SevenBit) => CodeRange::SevenBit,
            _ => CodeRange::Unknown,
        };
        Rope::with_node(
            child.encoding(),
            child.byte_len() * count,
            cr,
            RopeNode::Repeat {
                child: child.clone(),
                count,
            },
        )
    }

    /// Same bytes reinterpreted under another encoding. Code range is reset.
    pub fn with_encoding(&self, encoding: EncodingRef) -> Rope {
        if encoding == self.encoding() {
            return self.clone();
        }
        Rope::from_bytes(self.as_bytes().to_vec().into_boxed_slice(), encoding)
    }

    #[inline(always)]
    pub fn encoding(&self) -> EncodingRef {
        self.0.encoding
    }

    #[inline(always)]
    pub fn byte_len(&self) -> usize {
        self.0.byte_len
    }

    pub fn is_empty(&self) -> bool {
        self.0.byte_len == 0
    }

    /// The cached classification, without forcing a scan.
    pub fn known_code_range(&self) -> Option<CodeRange> {
        match CodeRange::from_u8(self.0.code_range.load(Ordering::Relaxed)) {
            CodeRange::Unknown => None,
            cr => Some(cr),
        }
    }

    /// Classify the bytes, scanning (and flattening) at most once.
    pub fn code_range(&self) -> CodeRange {
        if let Some(cr) = self.known_code_range() {
            return cr;
        }
        let bytes = self.as_bytes();
        let cr = if bytes.is_ascii() && self.encoding().is_ascii_compatible() {
            CodeRange::SevenBit
        } else if self.encoding().is_valid(bytes) {
            CodeRange::Valid
        } else {
            CodeRange::Broken
        };
        self.0.code_range.store(cr as u8, Ordering::Relaxed);
        cr
    }

    pub fn is_7bit(&self) -> bool {
        self.code_range() == CodeRange::SevenBit
    }

    /// Byte-level access. Leaves answer directly; composite nodes flatten
    /// into a cache shared by all clones of this rope.
    pub fn as_bytes(&self) -> &[u8] {
        if let RopeNode::Leaf(bytes) = &self.0.node {
            return bytes;
        }
        self.0.flat.get_or_init(|| {
            let mut buf = Vec::with_capacity(self.0.byte_len);
            match &self.0.node {
                RopeNode::Leaf(bytes) => buf.extend_from_slice(bytes),
                RopeNode::Concat(l, r) => {
                    buf.extend_from_slice(l.as_bytes());
                    buf.extend_from_slice(r.as_bytes());
                }
                RopeNode::Substring { parent, offset } => {
                    buf.extend_from_slice(&parent.as_bytes()[*offset..*offset + self.0.byte_len]);
                }
                RopeNode::Repeat { child, count } => {
                    let bytes = child.as_bytes();
                    for _ in 0..*count {
                        buf.extend_from_slice(bytes);
                    }
                }
            }
            buf.into_boxed_slice()
        })
    }

    /// The bytes as UTF-8 text, when the encoding permits it.
    pub fn as_str(&self) -> Option<&str> {
        match self.encoding() {
            EncodingRef::UTF_8 | EncodingRef::US_ASCII => std::str::from_utf8(self.as_bytes()).ok(),
            _ if self.is_7bit() => std::str::from_utf8(self.as_bytes()).ok(),
            _ => None,
        }
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }

    /// Pointer identity: interned ropes compare equal without touching bytes.
    pub fn ptr_eq(&self, other: &Rope) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Rope {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.encoding() == other.encoding() && self.as_bytes() == other.as_bytes())
    }
}

impl Eq for Rope {}

impl std::hash::Hash for Rope {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
        self.encoding().index().hash(state);
    }
}

impl std::fmt::Debug for Rope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}[{}]",
            String::from_utf8_lossy(self.as_bytes()),
            self.encoding().name()
        )
    }
}

impl std::fmt::Display for Rope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}

//------------------------------------------------------------

///
/// Frozen-string pool.
///
/// Process-wide cache mapping (bytes, encoding) to a canonical immutable
/// rope. Literal strings and frozen hash keys resolve here so that equal
/// frozen content is pointer-identical. Seeded at startup with every
/// built-in encoding name.
///
static FROZEN_POOL: Lazy<Mutex<FxHashMap<(Box<[u8]>, u8), Rope>>> = Lazy::new(|| {
    let mut pool = FxHashMap::default();
    for info in EncodingRef::list() {
        let rope = Rope::from_str(info.name, EncodingRef::US_ASCII);
        rope.code_range();
        pool.insert(
            (
                info.name.as_bytes().to_vec().into_boxed_slice(),
                EncodingRef::US_ASCII.index(),
            ),
            rope,
        );
    }
    Mutex::new(pool)
});

/// The canonical frozen rope for (bytes, encoding).
pub fn intern_rope(bytes: &[u8], encoding: EncodingRef) -> Rope {
    let mut pool = FROZEN_POOL.lock().unwrap();
    if let Some(rope) = pool.get(&(bytes.to_vec().into_boxed_slice(), encoding.index())) {
        return rope.clone();
    }
    let rope = Rope::from_bytes(bytes.to_vec().into_boxed_slice(), encoding);
    rope.code_range();
    pool.insert(
        (bytes.to_vec().into_boxed_slice(), encoding.index()),
        rope.clone(),
    );
    rope
}

pub fn intern_str(s: &str, encoding: EncodingRef) -> Rope {
    intern_rope(s.as_bytes(), encoding)
}
