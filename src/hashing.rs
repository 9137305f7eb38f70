use crate::*;
use std::hash::{Hash, Hasher};

/// Hash codes are 32-bit signed; user `hash` results are folded down to
/// this width.
pub type HashCode = i32;

fn fold(hasher: fxhash::FxHasher) -> HashCode {
    let h = hasher.finish();
    (h as u32 ^ (h >> 32) as u32) as i32
}

fn hash_of<T: Hash>(salt: u64, v: T) -> HashCode {
    let mut hasher = fxhash::FxHasher::default();
    salt.hash(&mut hasher);
    v.hash(&mut hasher);
    fold(hasher)
}

const SALT_NIL: u64 = 0x01;
const SALT_BOOL: u64 = 0x02;
const SALT_INT: u64 = 0x03;
const SALT_FLOAT: u64 = 0x04;
const SALT_SYM: u64 = 0x05;
const SALT_STR: u64 = 0x06;
const SALT_IDENT: u64 = 0x07;

///
/// Value-kinded hashing.
///
/// Specialized for the primitive kinds; ordinary objects fall back to the
/// user-visible `hash` method, whose result is cast to 32 bits. In
/// identity mode the code derives from the identity word alone.
///
pub fn hash_value(vm: &mut VM, key: Value, by_identity: bool) -> Result<HashCode, RubyError> {
    if by_identity {
        return Ok(hash_of(SALT_IDENT, key.id()));
    }
    let code = match key.unpack() {
        RV::Nil => hash_of(SALT_NIL, 0u8),
        RV::True => hash_of(SALT_BOOL, true),
        RV::False => hash_of(SALT_BOOL, false),
        RV::Integer(i) => hash_of(SALT_INT, i),
        RV::Float(f) => hash_float(f),
        RV::Symbol(id) => hash_of(SALT_SYM, u32::from(id)),
        RV::Missing => unreachable!("[Missing] can not be hashed."),
        RV::Object(rvalue) => match &rvalue.kind {
            ObjKind::BigNum(n) => hash_of(SALT_INT, n),
            ObjKind::Float(f) => hash_float(*f),
            ObjKind::String(rs) => hash_of(SALT_STR, rs.as_bytes()),
            ObjKind::Array(a) => {
                let elements = a.elements.clone();
                let mut code = hash_of(SALT_STR, elements.len());
                for v in elements {
                    code = code
                        .wrapping_mul(31)
                        .wrapping_add(hash_value(vm, v, false)?);
                }
                code
            }
            ObjKind::Hash(h) => {
                // Order-insensitive, so equal hashes with different
                // insertion histories agree.
                let pairs: Vec<_> = h.iter_pairs();
                let mut code = hash_of(SALT_STR, pairs.len());
                for (k, v) in pairs {
                    code ^= hash_value(vm, k, false)?
                        .wrapping_mul(31)
                        .wrapping_add(hash_value(vm, v, false)?);
                }
                code
            }
            _ => {
                let res = vm.send(IdentId::HASH, key, &Args::new0())?;
                cast_hash_result(res)?
            }
        },
    };
    Ok(code)
}

fn hash_float(f: f64) -> HashCode {
    // -0.0 and 0.0 are `==`, so they must agree.
    let f = if f == 0.0 { 0.0 } else { f };
    hash_of(SALT_FLOAT, f.to_bits())
}

/// Cast a user `hash` result to a 32-bit signed code.
fn cast_hash_result(res: Value) -> Result<HashCode, RubyError> {
    if let Some(i) = res.as_fixnum() {
        Ok(i as i32)
    } else if let Some(n) = res.as_bignum() {
        use num::ToPrimitive;
        Ok((n % num::BigInt::from(1u64 << 32))
            .to_i64()
            .unwrap_or(0) as i32)
    } else {
        Err(RubyError::typeerr(format!(
            "hash must return an Integer. (given:{})",
            res.get_class_name()
        )))
    }
}

///
/// Key equality under `eql?` semantics.
///
/// Identity mode compares the identity word. Otherwise built-in kinds
/// compare structurally (same-type equality) and ordinary objects
/// dispatch `eql?`.
///
pub fn eql_values(
    vm: &mut VM,
    lhs: Value,
    rhs: Value,
    by_identity: bool,
) -> Result<bool, RubyError> {
    if lhs.id() == rhs.id() {
        return Ok(true);
    }
    if by_identity {
        return Ok(false);
    }
    let res = match (lhs.unpack(), rhs.unpack()) {
        (RV::Integer(l), RV::Integer(r)) => l == r,
        (RV::Float(l), RV::Float(r)) => l == r,
        (RV::Object(l), RV::Object(r)) => match (&l.kind, &r.kind) {
            (ObjKind::Ordinary, _) | (_, ObjKind::Ordinary) => {
                let res = vm.send(IdentId::EQL, lhs, &Args::new1(rhs))?;
                res.to_boolean()
            }
            _ => l.eql(r),
        },
        _ => false,
    };
    Ok(res)
}
