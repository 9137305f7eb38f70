use crate::*;
use num::BigInt;

pub type ValueTable = FxIndexMap<IdentId, Value>;

/// Heap-allocated objects.
#[derive(Debug)]
pub struct RValue {
    class: Module,
    var_table: Option<Box<ValueTable>>,
    pub kind: ObjKind,
}

impl PartialEq for RValue {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

#[derive(Debug)]
pub enum ObjKind {
    Invalid,
    Ordinary,
    BigNum(BigInt),
    Float(f64),
    Module(ClassInfo),
    String(RString),
    Array(ArrayInfo),
    Hash(Box<RubyHash>),
    Regexp(RegexpInfo),
    MatchData(Box<MatchDataInfo>),
    Proc(Box<ProcInfo>),
    Method(Box<MethodObjInfo>),
    Exception(Box<RubyError>),
    Foreign(Box<dyn ForeignObject>),
}

impl RValue {
    pub(crate) fn new(class: Module, kind: ObjKind) -> Self {
        RValue {
            class,
            var_table: None,
            kind,
        }
    }

    pub(crate) fn new_ordinary(class: Module) -> Self {
        RValue::new(class, ObjKind::Ordinary)
    }

    pub(crate) fn new_bigint(bigint: BigInt) -> Self {
        RValue::new(BuiltinClass::integer(), ObjKind::BigNum(bigint))
    }

    pub(crate) fn new_float(f: f64) -> Self {
        RValue::new(BuiltinClass::float(), ObjKind::Float(f))
    }

    pub(crate) fn new_string(rs: RString) -> Self {
        RValue::new(BuiltinClass::string(), ObjKind::String(rs))
    }

    pub(crate) fn new_array(info: ArrayInfo) -> Self {
        RValue::new(BuiltinClass::array(), ObjKind::Array(info))
    }

    pub(crate) fn new_hash(hash: RubyHash) -> Self {
        RValue::new(BuiltinClass::hash(), ObjKind::Hash(Box::new(hash)))
    }

    pub(crate) fn new_regexp(info: RegexpInfo) -> Self {
        RValue::new(BuiltinClass::regexp(), ObjKind::Regexp(info))
    }

    pub(crate) fn new_matchdata(info: MatchDataInfo) -> Self {
        RValue::new(BuiltinClass::matchdata(), ObjKind::MatchData(Box::new(info)))
    }

    pub(crate) fn new_proc(info: ProcInfo) -> Self {
        RValue::new(BuiltinClass::procobj(), ObjKind::Proc(Box::new(info)))
    }

    pub(crate) fn new_method(info: MethodObjInfo) -> Self {
        RValue::new(BuiltinClass::method(), ObjKind::Method(Box::new(info)))
    }

    pub(crate) fn new_exception(err: RubyError) -> Self {
        RValue::new(BuiltinClass::exception(), ObjKind::Exception(Box::new(err)))
    }

    pub(crate) fn new_foreign(obj: Box<dyn ForeignObject>) -> Self {
        RValue::new(BuiltinClass::object(), ObjKind::Foreign(obj))
    }

    pub(crate) fn new_class(cinfo: ClassInfo) -> Self {
        RValue::new(BuiltinClass::class(), ObjKind::Module(cinfo))
    }

    pub(crate) fn new_module(cinfo: ClassInfo) -> Self {
        RValue::new(BuiltinClass::module(), ObjKind::Module(cinfo))
    }
}

impl RValue {
    #[inline(always)]
    pub(crate) fn id(&self) -> u64 {
        self as *const RValue as u64
    }

    /// Pack `self` into a Value, moving it to the heap.
    pub(crate) fn pack(self) -> Value {
        let ptr = Box::into_raw(Box::new(self));
        Value::from_ptr(ptr)
    }

    /// The direct class, which may be a singleton class.
    #[inline(always)]
    pub(crate) fn class(&self) -> Module {
        self.class
    }

    /// The first non-singleton class in the chain.
    pub(crate) fn real_class(&self) -> Module {
        let mut class = self.class;
        loop {
            if class.is_singleton() {
                class = class.upper().unwrap();
            } else {
                return class;
            }
        }
    }

    pub(crate) fn set_class(&mut self, class: Module) {
        self.class = class;
    }

    pub(crate) fn get_var(&self, id: IdentId) -> Option<Value> {
        match &self.var_table {
            Some(table) => table.get(&id).cloned(),
            None => None,
        }
    }

    pub(crate) fn set_var(&mut self, id: IdentId, val: Value) -> Option<Value> {
        match &mut self.var_table {
            Some(table) => table.insert(id, val),
            None => {
                let mut table = FxIndexMap::default();
                table.insert(id, val);
                self.var_table = Some(Box::new(table));
                None
            }
        }
    }

    pub(crate) fn var_table(&self) -> Option<&ValueTable> {
        self.var_table.as_deref()
    }

    pub(crate) fn shallow_dup(&self) -> Self {
        RValue {
            class: self.class,
            var_table: self.var_table.clone(),
            kind: match &self.kind {
                ObjKind::Invalid => unreachable!("Invalid rvalue. {:?}", &self),
                ObjKind::Ordinary => ObjKind::Ordinary,
                ObjKind::BigNum(n) => ObjKind::BigNum(n.clone()),
                ObjKind::Float(f) => ObjKind::Float(*f),
                ObjKind::Module(c) => ObjKind::Module(c.shallow_dup()),
                ObjKind::String(rs) => ObjKind::String(rs.clone()),
                ObjKind::Array(a) => ObjKind::Array(a.clone()),
                ObjKind::Hash(h) => ObjKind::Hash(h.clone()),
                ObjKind::Regexp(re) => ObjKind::Regexp(re.clone()),
                ObjKind::MatchData(md) => ObjKind::MatchData(md.clone()),
                ObjKind::Proc(p) => ObjKind::Proc(p.clone()),
                ObjKind::Method(m) => ObjKind::Method(m.clone()),
                ObjKind::Exception(e) => ObjKind::Exception(e.clone()),
                ObjKind::Foreign(_) => unreachable!("can not duplicate a foreign object."),
            },
        }
    }

    pub(crate) fn as_class(&self) -> &ClassInfo {
        match &self.kind {
            ObjKind::Module(info) => info,
            _ => unreachable!("as_class(): not a class/module. {:?}", self),
        }
    }

    pub(crate) fn as_mut_class(&mut self) -> &mut ClassInfo {
        match &mut self.kind {
            ObjKind::Module(info) => info,
            _ => unreachable!("as_mut_class(): not a class/module."),
        }
    }

    /// Structural `eql?` for the kinds the kernel owns. Ordinary objects
    /// compare by identity here; a user-defined `eql?` goes through dispatch.
    pub(crate) fn eql(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (ObjKind::Ordinary, ObjKind::Ordinary) => self.id() == other.id(),
            (ObjKind::BigNum(lhs), ObjKind::BigNum(rhs)) => lhs == rhs,
            (ObjKind::Float(lhs), ObjKind::Float(rhs)) => lhs == rhs,
            (ObjKind::String(lhs), ObjKind::String(rhs)) => lhs.eql(rhs),
            (ObjKind::Array(lhs), ObjKind::Array(rhs)) => {
                if lhs.len() != rhs.len() {
                    return false;
                }
                lhs.elements
                    .iter()
                    .zip(rhs.elements.iter())
                    .all(|(a1, a2)| {
                        // Support self-containing arrays.
                        if self.id() == a1.id() && other.id() == a2.id() {
                            true
                        } else if self.id() == a1.id() || other.id() == a2.id() {
                            false
                        } else {
                            a1.id() == a2.id() || {
                                match (a1.as_rvalue(), a2.as_rvalue()) {
                                    (Some(r1), Some(r2)) => r1.eql(r2),
                                    (None, None) => a1.id() == a2.id(),
                                    _ => false,
                                }
                            }
                        }
                    })
            }
            (ObjKind::Invalid, _) => unreachable!("Invalid rvalue. {:?}", self),
            (_, ObjKind::Invalid) => unreachable!("Invalid rvalue. {:?}", other),
            _ => false,
        }
    }
}

impl std::hash::Hash for RValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match &self.kind {
            ObjKind::Invalid => unreachable!("Invalid rvalue. {:?}", self),
            ObjKind::BigNum(n) => n.hash(state),
            ObjKind::Float(f) => f.to_bits().hash(state),
            ObjKind::String(rs) => rs.as_bytes().hash(state),
            ObjKind::Array(a) => {
                for v in &a.elements {
                    v.hash(state);
                }
            }
            _ => self.id().hash(state),
        }
    }
}
