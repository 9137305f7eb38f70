use crate::encoding::EncodingRef;
use crate::rope::{intern_rope, Rope};
use fxhash::FxHashMap;
use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Mutex;

static ID: Lazy<Mutex<SymbolTable>> = Lazy::new(|| Mutex::new(SymbolTable::new()));

///
/// An interned symbol: a (rope, encoding) pair.
///
/// Two symbols with equal content and equal encoding are the same id;
/// content with a different encoding interns separately. The table is
/// process-wide.
///
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentId(NonZeroU32);

impl fmt::Debug for IdentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::get_name(*self))
    }
}

impl From<IdentId> for usize {
    #[inline(always)]
    fn from(id: IdentId) -> usize {
        id.0.get() as usize
    }
}

impl From<IdentId> for u32 {
    #[inline(always)]
    fn from(id: IdentId) -> u32 {
        id.0.get()
    }
}

impl From<u32> for IdentId {
    #[inline(always)]
    fn from(id: u32) -> Self {
        let id = NonZeroU32::new(id).expect("IdentId can not be 0.");
        IdentId(id)
    }
}

macro_rules! id {
    ($constant:expr) => {
        IdentId(unsafe { std::num::NonZeroU32::new_unchecked($constant) })
    };
}

impl IdentId {
    pub const INITIALIZE: IdentId = id!(1);
    pub const OBJECT: IdentId = id!(2);
    pub const NEW: IdentId = id!(3);
    pub const NAME: IdentId = id!(4);
    pub const _EQ: IdentId = id!(5);
    pub const _NEQ: IdentId = id!(6);
    pub const _TEQ: IdentId = id!(7);
    pub const _INDEX: IdentId = id!(8);
    pub const _INDEX_ASSIGN: IdentId = id!(9);
    pub const TO_S: IdentId = id!(10);
    pub const _METHOD_MISSING: IdentId = id!(11);
    pub const HASH: IdentId = id!(12);
    pub const EQL: IdentId = id!(13);
    pub const EACH: IdentId = id!(14);
    pub const _MATCH: IdentId = id!(15);
    pub const _NAME: IdentId = id!(16);
}

impl IdentId {
    /// Intern `name` as US-ASCII when its bytes are 7-bit, UTF-8 otherwise.
    #[inline(always)]
    pub fn get_id<'a>(name: impl Into<Cow<'a, str>>) -> Self {
        let name = name.into();
        let enc = if name.as_bytes().is_ascii() {
            EncodingRef::US_ASCII
        } else {
            EncodingRef::UTF_8
        };
        ID.lock().unwrap().intern(name.as_bytes(), enc)
    }

    /// Intern raw content under an explicit encoding.
    #[inline(always)]
    pub fn intern(bytes: &[u8], encoding: EncodingRef) -> Self {
        ID.lock().unwrap().intern(bytes, encoding)
    }

    pub fn from_rope(rope: &Rope) -> Self {
        ID.lock().unwrap().intern(rope.as_bytes(), rope.encoding())
    }

    #[inline(always)]
    pub fn get_name(id: IdentId) -> String {
        ID.lock().unwrap().get_rope(id).to_string_lossy()
    }

    /// The interned content as a frozen rope.
    pub fn get_rope(id: IdentId) -> Rope {
        ID.lock().unwrap().get_rope(id)
    }

    pub fn encoding(id: IdentId) -> EncodingRef {
        ID.lock().unwrap().get_rope(id).encoding()
    }

    pub fn get_ident_name(id: impl Into<Option<IdentId>>) -> String {
        match id.into() {
            Some(id) => IdentId::get_name(id),
            None => "".to_string(),
        }
    }

    pub fn add_postfix(id: IdentId, postfix: &str) -> IdentId {
        let new_name = format!("{:?}{}", id, postfix);
        IdentId::get_id(new_name)
    }

    pub fn starts_with(id: IdentId, pat: &str) -> bool {
        IdentId::get_name(id).starts_with(pat)
    }
}

#[derive(Debug)]
struct SymbolTable {
    table: FxHashMap<(Box<[u8]>, u8), u32>,
    rev: Vec<Rope>,
}

impl SymbolTable {
    fn new() -> Self {
        let mut table = SymbolTable {
            table: FxHashMap::default(),
            // Slot 0 is never handed out.
            rev: vec![Rope::from_str("<null>", EncodingRef::US_ASCII)],
        };
        table.seed("initialize", IdentId::INITIALIZE);
        table.seed("Object", IdentId::OBJECT);
        table.seed("new", IdentId::NEW);
        table.seed("name", IdentId::NAME);
        table.seed("==", IdentId::_EQ);
        table.seed("!=", IdentId::_NEQ);
        table.seed("===", IdentId::_TEQ);
        table.seed("[]", IdentId::_INDEX);
        table.seed("[]=", IdentId::_INDEX_ASSIGN);
        table.seed("to_s", IdentId::TO_S);
        table.seed("method_missing", IdentId::_METHOD_MISSING);
        table.seed("hash", IdentId::HASH);
        table.seed("eql?", IdentId::EQL);
        table.seed("each", IdentId::EACH);
        table.seed("=~", IdentId::_MATCH);
        table.seed("/name", IdentId::_NAME);
        table
    }

    fn seed(&mut self, name: &str, id: IdentId) {
        assert_eq!(self.rev.len(), usize::from(id));
        self.table.insert(
            (
                name.as_bytes().to_vec().into_boxed_slice(),
                EncodingRef::US_ASCII.index(),
            ),
            id.into(),
        );
        self.rev
            .push(intern_rope(name.as_bytes(), EncodingRef::US_ASCII));
    }

    fn intern(&mut self, bytes: &[u8], encoding: EncodingRef) -> IdentId {
        let key = (bytes.to_vec().into_boxed_slice(), encoding.index());
        match self.table.get(&key) {
            Some(id) => (*id).into(),
            None => {
                let id = self.rev.len() as u32;
                self.table.insert(key, id);
                self.rev.push(intern_rope(bytes, encoding));
                id.into()
            }
        }
    }

    fn get_rope(&self, id: IdentId) -> Rope {
        self.rev[usize::from(id)].clone()
    }
}
