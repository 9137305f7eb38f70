use once_cell::sync::Lazy;

///
/// A handle for a built-in encoding.
///
/// The runtime instantiates one handler per known name at startup; handles
/// are dense indexes into that registry and compare by index.
///
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EncodingRef(u8);

#[derive(Debug)]
pub struct EncodingInfo {
    pub name: &'static str,
    pub index: u8,
    pub ascii_compatible: bool,
    /// Some(n): every character occupies exactly `n` bytes.
    pub fixed_width: Option<u8>,
    /// Dummy encodings are declared but carry no codec; byte sequences in
    /// them are never `valid`.
    pub dummy: bool,
}

macro_rules! encoding {
    ($name:expr, $index:expr, $ascii:expr, $width:expr, $dummy:expr) => {
        EncodingInfo {
            name: $name,
            index: $index,
            ascii_compatible: $ascii,
            fixed_width: $width,
            dummy: $dummy,
        }
    };
}

static ENCODINGS: Lazy<Vec<EncodingInfo>> = Lazy::new(|| {
    vec![
        encoding!("UTF-8", 0, true, None, false),
        encoding!("US-ASCII", 1, true, Some(1), false),
        encoding!("ASCII-8BIT", 2, true, Some(1), false),
        encoding!("ISO-8859-1", 3, true, Some(1), false),
        encoding!("UTF-16BE", 4, false, None, false),
        encoding!("UTF-16LE", 5, false, None, false),
        encoding!("UTF-32BE", 6, false, Some(4), false),
        encoding!("UTF-32LE", 7, false, Some(4), false),
        encoding!("UTF-16", 8, false, None, true),
        encoding!("UTF-32", 9, false, None, true),
    ]
});

impl EncodingRef {
    pub const UTF_8: EncodingRef = EncodingRef(0);
    pub const US_ASCII: EncodingRef = EncodingRef(1);
    /// "BINARY" in recent rubies.
    pub const ASCII_8BIT: EncodingRef = EncodingRef(2);
    pub const ISO_8859_1: EncodingRef = EncodingRef(3);
    pub const UTF_16BE: EncodingRef = EncodingRef(4);
    pub const UTF_16LE: EncodingRef = EncodingRef(5);

    pub fn list() -> &'static [EncodingInfo] {
        &ENCODINGS
    }

    pub fn find(name: &str) -> Option<EncodingRef> {
        ENCODINGS
            .iter()
            .find(|info| info.name.eq_ignore_ascii_case(name))
            .map(|info| EncodingRef(info.index))
    }

    #[inline(always)]
    pub fn index(self) -> u8 {
        self.0
    }

    #[inline(always)]
    fn info(self) -> &'static EncodingInfo {
        &ENCODINGS[self.0 as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn is_ascii_compatible(self) -> bool {
        self.info().ascii_compatible
    }

    pub fn is_fixed_width(self) -> bool {
        self.info().fixed_width.is_some()
    }

    pub fn is_dummy(self) -> bool {
        self.info().dummy
    }

    /// Whether a byte sequence is well-formed under `self`.
    pub fn is_valid(self, bytes: &[u8]) -> bool {
        match self {
            EncodingRef::UTF_8 => std::str::from_utf8(bytes).is_ok(),
            EncodingRef::US_ASCII => bytes.is_ascii(),
            // Single-byte encodings accept every byte.
            EncodingRef::ASCII_8BIT | EncodingRef::ISO_8859_1 => true,
            EncodingRef::UTF_16BE | EncodingRef::UTF_16LE => {
                bytes.len() % 2 == 0 && self.utf16_valid(bytes)
            }
            _ => {
                let info = self.info();
                if info.dummy {
                    false
                } else if let Some(w) = info.fixed_width {
                    bytes.len() % w as usize == 0
                } else {
                    false
                }
            }
        }
    }

    fn utf16_valid(self, bytes: &[u8]) -> bool {
        let units = bytes.chunks_exact(2).map(|c| {
            if self == EncodingRef::UTF_16BE {
                u16::from_be_bytes([c[0], c[1]])
            } else {
                u16::from_le_bytes([c[0], c[1]])
            }
        });
        char::decode_utf16(units).all(|r| r.is_ok())
    }
}

impl std::fmt::Debug for EncodingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#<Encoding:{}>", self.name())
    }
}

impl std::fmt::Display for EncodingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
