use crate::*;

///
/// Foreign-call parameter type codes, as exposed to the bundled FFI
/// library.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum NativeType {
    Char = 0,
    UChar = 1,
    Bool = 2,
    Short = 3,
    UShort = 4,
    Int = 5,
    UInt = 6,
    Long = 7,
    ULong = 8,
    LongLong = 9,
    ULongLong = 10,
    Float = 11,
    Double = 12,
    Ptr = 13,
    Void = 14,
    String = 15,
    StrPtr = 16,
    CharArr = 17,
    Enum = 18,
    Varargs = 19,
}

impl NativeType {
    fn from_code(code: i64) -> Option<NativeType> {
        use NativeType::*;
        Some(match code {
            0 => Char,
            1 => UChar,
            2 => Bool,
            3 => Short,
            4 => UShort,
            5 => Int,
            6 => UInt,
            7 => Long,
            8 => ULong,
            9 => LongLong,
            10 => ULongLong,
            11 => Float,
            12 => Double,
            13 => Ptr,
            14 => Void,
            15 => String,
            16 => StrPtr,
            17 => CharArr,
            18 => Enum,
            19 => Varargs,
            _ => return None,
        })
    }
}

/// Size in bytes of a foreign parameter type. Types without a memory
/// footprint raise.
pub fn nativefunction_type_size(type_code: i64) -> Result<i64, RubyError> {
    use NativeType::*;
    let ty = NativeType::from_code(type_code)
        .ok_or_else(|| RubyError::argument(format!("unknown type code: {}", type_code)))?;
    match ty {
        Char | UChar => Ok(1),
        Short | UShort => Ok(2),
        Int | UInt => Ok(4),
        Long | ULong | LongLong | ULongLong => Ok(8),
        Float => Ok(4),
        Double => Ok(8),
        Ptr | StrPtr | String | CharArr => Ok(8),
        Bool | Void | Enum | Varargs => Err(RubyError::argument(format!(
            "no type size for: {:?}",
            ty
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(1, nativefunction_type_size(NativeType::Char as i64).unwrap());
        assert_eq!(1, nativefunction_type_size(NativeType::UChar as i64).unwrap());
        assert_eq!(2, nativefunction_type_size(NativeType::Short as i64).unwrap());
        assert_eq!(4, nativefunction_type_size(NativeType::Int as i64).unwrap());
        assert_eq!(8, nativefunction_type_size(NativeType::Long as i64).unwrap());
        assert_eq!(8, nativefunction_type_size(NativeType::ULongLong as i64).unwrap());
        assert_eq!(4, nativefunction_type_size(NativeType::Float as i64).unwrap());
        assert_eq!(8, nativefunction_type_size(NativeType::Double as i64).unwrap());
        assert_eq!(8, nativefunction_type_size(NativeType::Ptr as i64).unwrap());
        assert_eq!(8, nativefunction_type_size(NativeType::String as i64).unwrap());
    }

    #[test]
    fn footprint_free_types_raise() {
        for ty in [
            NativeType::Bool,
            NativeType::Void,
            NativeType::Enum,
            NativeType::Varargs,
        ] {
            assert!(nativefunction_type_size(ty as i64).is_err());
        }
        assert!(nativefunction_type_size(99).is_err());
    }
}
