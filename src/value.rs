use crate::*;
use num::bigint::ToBigInt;
use num::{BigInt, ToPrimitive};

mod array;
mod class;
mod hash;
mod rvalue;
mod string;
pub use array::*;
pub use class::*;
pub use hash::*;
pub use rvalue::*;
pub use string::*;

/// Return-sentinel of tentative dispatch. Never visible to user code.
const MISSING_VALUE: u64 = 0x04; // 0000_0100
const FALSE_VALUE: u64 = 0x14; // 0001_0100
const NIL_VALUE: u64 = 0x24; // 0010_0100
const TRUE_VALUE: u64 = 0x1c; // 0001_1100
const TAG_SYMBOL: u64 = 0x0c; // 0000_1100
const FLOAT_MASK1: u64 = !(0b0110u64 << 60);
const FLOAT_MASK2: u64 = 0b0100u64 << 60;

const ZERO: u64 = (0b1000 << 60) | 0b10;

#[derive(Debug, Clone, PartialEq)]
pub enum RV<'a> {
    Missing,
    Nil,
    True,
    False,
    Integer(i64),
    Float(f64),
    Symbol(IdentId),
    Object(&'a RValue),
}

impl<'a> RV<'a> {
    pub fn pack(&'a self) -> Value {
        match self {
            RV::Missing => Value::missing(),
            RV::Nil => Value::nil(),
            RV::True => Value::true_val(),
            RV::False => Value::false_val(),
            RV::Integer(num) => Value::integer(*num),
            RV::Float(num) => Value::float(*num),
            RV::Symbol(id) => Value::symbol(*id),
            RV::Object(info) => Value::from(info.id()),
        }
    }
}

///
/// A tagged 64-bit value.
///
/// Small integers, floats with a compressible exponent, symbols, booleans,
/// nil and the MISSING sentinel are packed in the word; everything else is
/// a pointer to a heap `RValue`.
///
#[derive(Clone, Copy, Eq)]
#[repr(transparent)]
pub struct Value(std::num::NonZeroU64);

impl std::ops::Deref for Value {
    type Target = std::num::NonZeroU64;
    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self.as_rvalue() {
            None => self.0.hash(state),
            Some(lhs) => lhs.hash(state),
        }
    }
}

impl PartialEq for Value {
    /// Equality of value (`==` semantics for the kinds this kernel owns).
    fn eq(&self, other: &Self) -> bool {
        if self.id() == other.id() {
            return true;
        };
        if self.is_packed_value() || other.is_packed_value() {
            if let Some(lhsi) = self.as_fixnum() {
                if let Some(rhsf) = other.as_flonum() {
                    return lhsi as f64 == rhsf;
                }
            } else if let Some(lhsf) = self.as_flonum() {
                if let Some(rhsi) = other.as_fixnum() {
                    return rhsi as f64 == lhsf;
                }
            }
            if let (Some(l), Some(r)) = (self.as_flonum(), other.as_flonum()) {
                return l == r;
            }
            return false;
        }
        let (lhs, rhs) = (self.rvalue(), other.rvalue());
        match (&lhs.kind, &rhs.kind) {
            (ObjKind::BigNum(lhs), ObjKind::BigNum(rhs)) => lhs == rhs,
            (ObjKind::BigNum(lhs), ObjKind::Float(rhs)) => lhs.to_f64() == Some(*rhs),
            (ObjKind::Float(lhs), ObjKind::Float(rhs)) => lhs == rhs,
            (ObjKind::Float(lhs), ObjKind::BigNum(rhs)) => Some(*lhs) == rhs.to_f64(),
            (ObjKind::String(lhs), ObjKind::String(rhs)) => lhs == rhs,
            (ObjKind::Array(lhs), ObjKind::Array(rhs)) => lhs.elements == rhs.elements,
            (ObjKind::Regexp(lhs), ObjKind::Regexp(rhs)) => lhs == rhs,
            (ObjKind::Invalid, _) => {
                unreachable!("Invalid rvalue. {:?}", self.rvalue())
            }
            (_, ObjKind::Invalid) => {
                unreachable!("Invalid rvalue. {:?}", other.rvalue())
            }
            (_, _) => false,
        }
    }
}

impl Default for Value {
    #[inline(always)]
    fn default() -> Self {
        Value::nil()
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.unpack() {
            RV::Missing => write!(f, "[Missing]"),
            RV::Nil => write!(f, "nil"),
            RV::True => write!(f, "true"),
            RV::False => write!(f, "false"),
            RV::Integer(i) => write!(f, "{}", i),
            RV::Float(n) => write!(f, "{}", n),
            RV::Symbol(id) => write!(f, ":{:?}", id),
            RV::Object(rval) => write!(f, "{:?}", rval),
        }
    }
}

impl Value {
    /// Convert `self` to `RV`.
    ///
    /// `RV` is a struct for convenience in handling `Value`.
    /// Both of packed integer and ObjKind::BigNum are numbers;
    /// packed float and ObjKind::Float both convert to RV::Float.
    pub(crate) fn unpack(&self) -> RV {
        if !self.is_packed_value() {
            let info = self.rvalue();
            match &info.kind {
                ObjKind::Invalid => unreachable!(
                    "Invalid rvalue. {:?} {:#?}",
                    &*info as *const RValue, info
                ),
                ObjKind::Float(f) => RV::Float(*f),
                _ => RV::Object(info),
            }
        } else if let Some(i) = self.as_fixnum() {
            RV::Integer(i)
        } else if let Some(f) = self.as_flonum() {
            RV::Float(f)
        } else if self.is_packed_symbol() {
            RV::Symbol(self.as_packed_symbol())
        } else {
            match self.get() {
                NIL_VALUE => RV::Nil,
                TRUE_VALUE => RV::True,
                FALSE_VALUE => RV::False,
                MISSING_VALUE => RV::Missing,
                _ => unreachable!("Illegal packed value. {:x}", self.0),
            }
        }
    }

    #[inline(always)]
    pub fn id(&self) -> u64 {
        self.get()
    }

    #[inline(always)]
    pub(crate) fn from(id: u64) -> Self {
        Value(std::num::NonZeroU64::new(id).unwrap())
    }

    #[inline(always)]
    pub(crate) fn from_ptr(ptr: *mut RValue) -> Self {
        Value::from(ptr as u64)
    }

    #[inline(always)]
    pub(crate) fn into_module(self) -> Module {
        Module::new_unchecked(self)
    }

    pub(crate) fn shallow_dup(&self) -> Self {
        match self.as_rvalue() {
            Some(rv) => rv.shallow_dup().pack(),
            None => *self,
        }
    }

    /// Get reference of RValue from `self`.
    ///
    /// Return None if `self` was a packed value.
    #[inline(always)]
    pub(crate) fn as_rvalue(&self) -> Option<&RValue> {
        if self.is_packed_value() {
            None
        } else {
            Some(self.rvalue())
        }
    }

    /// Get mutable reference of RValue from `self`.
    ///
    /// Return None if `self` was a packed value.
    #[inline(always)]
    pub(crate) fn as_mut_rvalue(&mut self) -> Option<&mut RValue> {
        if self.is_packed_value() {
            None
        } else {
            Some(self.rvalue_mut())
        }
    }

    #[inline(always)]
    pub(crate) fn rvalue(&self) -> &RValue {
        unsafe { &*(self.get() as *const RValue) }
    }

    #[inline(always)]
    pub(crate) fn rvalue_mut(&self) -> &mut RValue {
        unsafe { &mut *(self.get() as *mut RValue) }
    }

    /// Get class of `self` for method exploration.
    /// If a direct class of `self` is a singleton class, returns the
    /// singleton class.
    pub(crate) fn get_class_for_method(&self) -> Module {
        if !self.is_packed_value() {
            self.rvalue().class()
        } else if self.as_fixnum().is_some() {
            BuiltinClass::integer()
        } else if self.is_packed_num() {
            BuiltinClass::float()
        } else if self.is_packed_symbol() {
            BuiltinClass::symbol()
        } else {
            match self.get() {
                NIL_VALUE => BuiltinClass::nilclass(),
                TRUE_VALUE => BuiltinClass::trueclass(),
                FALSE_VALUE => BuiltinClass::falseclass(),
                _ => unreachable!("Illegal packed value. {:x}", self.0),
            }
        }
    }

    /// Get class of `self`, skipping singleton classes.
    pub fn get_class(&self) -> Module {
        match self.unpack() {
            RV::Integer(_) => BuiltinClass::integer(),
            RV::Float(_) => BuiltinClass::float(),
            RV::Symbol(_) => BuiltinClass::symbol(),
            RV::Nil => BuiltinClass::nilclass(),
            RV::True => BuiltinClass::trueclass(),
            RV::False => BuiltinClass::falseclass(),
            RV::Object(info) => info.real_class(),
            RV::Missing => unreachable!("[Missing]"),
        }
    }

    pub fn get_class_name(&self) -> String {
        match self.unpack() {
            RV::Missing => "[Missing]".to_string(),
            RV::Nil => "NilClass".to_string(),
            RV::True => "TrueClass".to_string(),
            RV::False => "FalseClass".to_string(),
            RV::Integer(_) => "Integer".to_string(),
            RV::Float(_) => "Float".to_string(),
            RV::Symbol(_) => "Symbol".to_string(),
            RV::Object(oref) => match &oref.kind {
                ObjKind::Invalid => unreachable!("Invalid rvalue. {:?}", *oref),
                _ => oref.real_class().name(),
            },
        }
    }

    pub fn kind_of(&self, class: Module) -> bool {
        let mut val = self.get_class();
        loop {
            if val.id() == class.id() || val.real_module().id() == class.id() {
                return true;
            }
            val = match val.upper() {
                Some(val) => val,
                None => break,
            };
        }
        false
    }

    #[inline(always)]
    pub(crate) fn set_var(self, id: IdentId, val: Value) -> Option<Value> {
        self.rvalue_mut().set_var(id, val)
    }

    #[inline(always)]
    pub(crate) fn get_var(&self, id: IdentId) -> Option<Value> {
        self.rvalue().get_var(id)
    }

    pub fn to_boolean(&self) -> bool {
        !self.is_nil() && self.get() != FALSE_VALUE
    }
}

impl Value {
    #[inline(always)]
    pub fn is_missing(&self) -> bool {
        self.get() == MISSING_VALUE
    }

    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        self.get() == NIL_VALUE
    }

    #[inline(always)]
    pub(crate) fn is_packed_value(&self) -> bool {
        self.get() & 0b0111 != 0
    }

    #[inline(always)]
    pub(crate) fn as_fnum(&self) -> i64 {
        (self.get() as i64) >> 1
    }

    #[inline(always)]
    pub(crate) fn is_fnum(&self) -> bool {
        self.get() & 0b1 == 1
    }

    #[inline(always)]
    pub fn as_fixnum(&self) -> Option<i64> {
        if self.is_fnum() {
            Some(self.as_fnum())
        } else {
            None
        }
    }

    #[inline(always)]
    pub(crate) fn as_flonum(&self) -> Option<f64> {
        let u = self.get();
        if u & 0b11 == 2 {
            if u == ZERO {
                return Some(0.0);
            }
            let bit = 0b10 - ((u >> 63) & 0b1);
            let num = ((u & !(0b0011u64)) | bit).rotate_right(3);
            Some(f64::from_bits(num))
        } else {
            None
        }
    }

    #[inline(always)]
    pub(crate) fn is_packed_num(&self) -> bool {
        self.get() & 0b11 != 0
    }

    #[inline(always)]
    pub(crate) fn is_packed_symbol(&self) -> bool {
        self.get() & 0xff == TAG_SYMBOL
    }

    #[inline(always)]
    pub(crate) fn as_packed_symbol(&self) -> IdentId {
        IdentId::from((self.get() >> 32) as u32)
    }

    pub fn as_symbol(&self) -> Option<IdentId> {
        if self.is_packed_symbol() {
            Some(self.as_packed_symbol())
        } else {
            None
        }
    }

    pub fn as_bignum(&self) -> Option<&BigInt> {
        match self.as_rvalue() {
            Some(info) => match &info.kind {
                ObjKind::BigNum(n) => Some(n),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        if let Some(f) = self.as_flonum() {
            Some(f)
        } else {
            match self.as_rvalue() {
                Some(info) => match &info.kind {
                    ObjKind::Float(f) => Some(*f),
                    _ => None,
                },
                _ => None,
            }
        }
    }

    pub fn as_rstring(&self) -> Option<&RString> {
        match self.as_rvalue() {
            Some(info) => match &info.kind {
                ObjKind::String(rs) => Some(rs),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_mut_rstring(&mut self) -> Option<&mut RString> {
        match self.as_mut_rvalue() {
            Some(info) => match &mut info.kind {
                ObjKind::String(rs) => Some(rs),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayInfo> {
        match self.as_rvalue() {
            Some(info) => match &info.kind {
                ObjKind::Array(a) => Some(a),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_mut_array(&mut self) -> Option<&mut ArrayInfo> {
        match self.as_mut_rvalue() {
            Some(info) => match &mut info.kind {
                ObjKind::Array(a) => Some(a),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_rhash(&self) -> Option<&RubyHash> {
        match self.as_rvalue() {
            Some(info) => match &info.kind {
                ObjKind::Hash(h) => Some(h),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_mut_rhash(&mut self) -> Option<&mut RubyHash> {
        match self.as_mut_rvalue() {
            Some(info) => match &mut info.kind {
                ObjKind::Hash(h) => Some(h),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_regexp(&self) -> Option<RegexpInfo> {
        match self.as_rvalue() {
            Some(info) => match &info.kind {
                ObjKind::Regexp(re) => Some(re.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_matchdata(&self) -> Option<&MatchDataInfo> {
        match self.as_rvalue() {
            Some(info) => match &info.kind {
                ObjKind::MatchData(md) => Some(md),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn as_mut_matchdata(&mut self) -> Option<&mut MatchDataInfo> {
        match self.as_mut_rvalue() {
            Some(info) => match &mut info.kind {
                ObjKind::MatchData(md) => Some(md),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn if_mod_class(self) -> Option<Module> {
        if let Some(info) = self.as_rvalue() {
            match &info.kind {
                ObjKind::Module(_) => Some(self.into_module()),
                _ => None,
            }
        } else {
            None
        }
    }

    pub(crate) fn as_class(&self) -> &ClassInfo {
        self.rvalue().as_class()
    }

    pub(crate) fn as_mut_class(&mut self) -> &mut ClassInfo {
        self.rvalue_mut().as_mut_class()
    }

    pub(crate) fn is_foreign(&self) -> bool {
        match self.as_rvalue() {
            Some(rvalue) => matches!(&rvalue.kind, ObjKind::Foreign(_)),
            None => false,
        }
    }

    pub(crate) fn expect_string(&self, msg: &str) -> Result<&RString, RubyError> {
        self.as_rstring()
            .ok_or_else(|| RubyError::wrong_type(msg, "String", *self))
    }

    pub(crate) fn expect_symbol(&self, msg: &str) -> Result<IdentId, RubyError> {
        self.as_symbol()
            .ok_or_else(|| RubyError::wrong_type(msg, "Symbol", *self))
    }
}

impl Value {
    #[inline(always)]
    pub const fn missing() -> Self {
        Value(unsafe { std::num::NonZeroU64::new_unchecked(MISSING_VALUE) })
    }

    #[inline(always)]
    pub const fn nil() -> Self {
        Value(unsafe { std::num::NonZeroU64::new_unchecked(NIL_VALUE) })
    }

    #[inline(always)]
    pub const fn true_val() -> Self {
        Value(unsafe { std::num::NonZeroU64::new_unchecked(TRUE_VALUE) })
    }

    #[inline(always)]
    pub const fn false_val() -> Self {
        Value(unsafe { std::num::NonZeroU64::new_unchecked(FALSE_VALUE) })
    }

    #[inline(always)]
    pub fn bool(b: bool) -> Self {
        if b {
            Value::true_val()
        } else {
            Value::false_val()
        }
    }

    #[inline(always)]
    pub(crate) fn fixnum(num: i64) -> Self {
        Value::from((num << 1) as u64 | 0b1)
    }

    #[inline(always)]
    pub(crate) fn is_i63(num: i64) -> bool {
        let top = (num as u64) >> 62 ^ (num as u64) >> 63;
        top & 0b1 == 0
    }

    pub fn integer(num: i64) -> Self {
        if Value::is_i63(num) {
            Value::fixnum(num)
        } else {
            RValue::new_bigint(num.to_bigint().unwrap()).pack()
        }
    }

    pub fn bignum(num: BigInt) -> Self {
        if let Some(i) = num.to_i64() {
            Value::integer(i)
        } else {
            RValue::new_bigint(num).pack()
        }
    }

    pub fn float(num: f64) -> Self {
        if num == 0.0 {
            return Value::from(ZERO);
        }
        let unum = f64::to_bits(num);
        let exp = ((unum >> 60) & 0b111) + 1;
        if (exp & 0b0110) == 0b0100 {
            Value::from((unum & FLOAT_MASK1 | FLOAT_MASK2).rotate_left(3))
        } else {
            RValue::new_float(num).pack()
        }
    }

    pub fn symbol(id: IdentId) -> Self {
        let id: u32 = id.into();
        Value::from((id as u64) << 32 | TAG_SYMBOL)
    }

    pub fn symbol_from_str(sym: &str) -> Self {
        Value::symbol(IdentId::get_id(sym))
    }

    /// A mutable string in UTF-8.
    pub fn string(string: impl Into<String>) -> Self {
        RValue::new_string(RString::mutable_str(&string.into(), EncodingRef::UTF_8)).pack()
    }

    /// A mutable string holding raw bytes under an explicit encoding.
    pub fn bytes(bytes: Vec<u8>, encoding: EncodingRef) -> Self {
        RValue::new_string(RString::mutable(bytes, encoding)).pack()
    }

    /// A frozen string interned through the frozen-string pool.
    pub fn frozen_string(s: &str, encoding: EncodingRef) -> Self {
        RValue::new_string(RString::frozen_interned(s.as_bytes(), encoding)).pack()
    }

    pub fn string_from_rstring(rs: RString) -> Self {
        RValue::new_string(rs).pack()
    }

    pub fn ordinary_object(class: Module) -> Self {
        RValue::new_ordinary(class).pack()
    }

    pub fn array_from(ary: Vec<Value>) -> Value {
        RValue::new_array(ArrayInfo::new(ary)).pack()
    }

    pub fn hash_from(hash: RubyHash) -> Value {
        RValue::new_hash(hash).pack()
    }

    pub fn hash_empty() -> Value {
        Value::hash_from(RubyHash::new())
    }

    pub fn regexp(info: RegexpInfo) -> Value {
        RValue::new_regexp(info).pack()
    }

    pub fn matchdata(info: MatchDataInfo) -> Value {
        RValue::new_matchdata(info).pack()
    }

    pub fn procobj(info: ProcInfo) -> Value {
        RValue::new_proc(info).pack()
    }

    pub fn method_obj(info: MethodObjInfo) -> Value {
        RValue::new_method(info).pack()
    }

    pub fn foreign(obj: Box<dyn ForeignObject>) -> Value {
        RValue::new_foreign(obj).pack()
    }

    pub fn exception(err: RubyError) -> Value {
        RValue::new_exception(err).pack()
    }
}
