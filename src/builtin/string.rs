use crate::hashing::hash_value;
use crate::*;

pub(crate) fn init(vm: &mut VM) {
    let string = BuiltinClass::string();
    vm.add_builtin_method(string, "hash", hash, ParamsDesc::fixed(0));
    vm.add_builtin_method(string, "eql?", eql, ParamsDesc::fixed(1));
    vm.add_builtin_method(string, "dup", dup, ParamsDesc::fixed(0));
    vm.add_builtin_method(string, "bytesize", bytesize, ParamsDesc::fixed(0));
    vm.add_builtin_method(string, "length", length, ParamsDesc::fixed(0));
    vm.add_builtin_method(string, "size", length, ParamsDesc::fixed(0));
    vm.add_builtin_method(string, "encoding", encoding, ParamsDesc::fixed(0));
    vm.add_builtin_method(string, "valid_encoding?", valid_encoding_p, ParamsDesc::fixed(0));
    vm.add_builtin_method(string, "ascii_only?", ascii_only_p, ParamsDesc::fixed(0));
    vm.add_builtin_method(string, "=~", match_op, ParamsDesc::fixed(1));
    vm.add_builtin_method(string, "index", index, ParamsDesc::variadic());
    vm.add_builtin_method(string, "sub", sub, ParamsDesc::fixed(2));
    vm.add_builtin_method(string, "gsub", gsub, ParamsDesc::variadic());
    vm.add_builtin_method(string, "scan", scan, ParamsDesc::fixed(1));
}

fn hash(vm: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let code = hash_value(vm, self_val, false)?;
    Ok(Value::integer(code as i64))
}

fn eql(_: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let lhs = self_val.expect_string("Receiver")?;
    let res = match args[0].as_rstring() {
        Some(rhs) => lhs.eql(rhs),
        None => false,
    };
    Ok(Value::bool(res))
}

fn dup(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let rs = self_val.expect_string("Receiver")?;
    Ok(Value::string_from_rstring(RString::from_rope(
        rs.rope().clone(),
    )))
}

fn bytesize(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let rs = self_val.expect_string("Receiver")?;
    Ok(Value::integer(rs.byte_len() as i64))
}

fn length(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let rs = self_val.expect_string("Receiver")?;
    let len = match rs.as_str() {
        Some(s) => s.chars().count(),
        // Byte-oriented encodings count bytes.
        None => rs.byte_len(),
    };
    Ok(Value::integer(len as i64))
}

fn encoding(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let rs = self_val.expect_string("Receiver")?;
    Ok(Value::frozen_string(
        rs.encoding().name(),
        EncodingRef::US_ASCII,
    ))
}

fn valid_encoding_p(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let rs = self_val.expect_string("Receiver")?;
    Ok(Value::bool(rs.code_range() != CodeRange::Broken))
}

fn ascii_only_p(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let rs = self_val.expect_string("Receiver")?;
    Ok(Value::bool(rs.code_range() == CodeRange::SevenBit))
}

/// String#=~ : the byte position of the first match, or nil.
fn match_op(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let re = args[0]
        .as_regexp()
        .ok_or_else(|| RubyError::wrong_type("1st arg", "Regexp", args[0]))?;
    let len = self_val.expect_string("Receiver")?.byte_len() as i64;
    let md = re.match_in_region(vm, self_val, 0, len, false, 0)?;
    match md.as_matchdata() {
        Some(md) => Ok(Value::integer(md.starts[0] as i64)),
        None => Ok(Value::nil()),
    }
}

fn index(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    args.check_args_range(1, 2)?;
    let start = if args.len() == 2 {
        args[1]
            .as_fixnum()
            .ok_or_else(|| RubyError::wrong_type("2nd arg", "Integer", args[1]))? as usize
    } else {
        0
    };
    if let Some(needle) = args[0].as_rstring() {
        let needle = needle.as_bytes().to_vec();
        return match string_byte_index(self_val, &needle, start) {
            Some(pos) => Ok(Value::integer(pos as i64)),
            None => Ok(Value::nil()),
        };
    }
    if let Some(re) = args[0].as_regexp() {
        let len = self_val.expect_string("Receiver")?.byte_len() as i64;
        let md = re.match_in_region(vm, self_val, start as i64, len, false, 0)?;
        return match md.as_matchdata() {
            Some(md) => Ok(Value::integer(md.starts[0] as i64)),
            None => Ok(Value::nil()),
        };
    }
    Err(RubyError::wrong_type("1st arg", "String or Regexp", args[0]))
}

fn expect_utf8(rs: &RString) -> Result<&str, RubyError> {
    rs.as_str()
        .ok_or_else(|| RubyError::encoding_invalid_byte_sequence(rs.encoding()))
}

fn pattern_from(vm: &mut VM, val: Value) -> Result<RegexpInfo, RubyError> {
    if let Some(re) = val.as_regexp() {
        return Ok(re);
    }
    if let Some(rs) = val.as_rstring() {
        return RegexpInfo::from_escaped(vm, &rs.to_s());
    }
    Err(RubyError::wrong_type("1st arg", "Regexp or String", val))
}

fn sub(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let re = pattern_from(vm, args[0])?;
    let given = self_val.expect_string("Receiver")?.clone();
    let given = expect_utf8(&given)?;
    let replace = args[1].expect_string("2nd arg")?.to_s();
    let (res, _) = re.replace_once(given, &replace)?;
    Ok(Value::string(res))
}

fn gsub(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    args.check_args_range(1, 2)?;
    let re = pattern_from(vm, args[0])?;
    let given = self_val.expect_string("Receiver")?.clone();
    let given = expect_utf8(&given)?.to_string();
    if args.len() == 2 {
        let replace = args[1].expect_string("2nd arg")?.to_s();
        let (res, _) = re.replace_repeat(vm, &given, &replace)?;
        return Ok(Value::string(res));
    }
    let block = args.expect_block()?.clone();
    let (res, _) = re.replace_repeat_with(vm, &given, |vm, matched| {
        let replaced = vm.eval_block1(&block, Value::string(matched))?;
        Ok(replaced.expect_string("Block result")?.to_s())
    })?;
    Ok(Value::string(res))
}

fn scan(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let re = pattern_from(vm, args[0])?;
    let given = self_val.expect_string("Receiver")?.clone();
    let given = expect_utf8(&given)?;
    let ary = re.find_all(vm, given)?;
    Ok(Value::array_from(ary))
}

/// Byte index of `needle` in the string `src` at or after `start`.
pub fn string_byte_index(src: Value, needle: &[u8], start: usize) -> Option<usize> {
    src.as_rstring()?.byte_index(needle, start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_and_eql() {
        let mut vm = VM::new();
        let a = Value::string("same");
        let b = Value::string("same");
        let ha = vm.send0(IdentId::HASH, a).unwrap();
        let hb = vm.send0(IdentId::HASH, b).unwrap();
        assert_eq!(ha, hb);
        assert_eq!(
            Value::true_val(),
            vm.send1(IdentId::EQL, a, b).unwrap()
        );
    }

    #[test]
    fn match_operator() {
        let mut vm = VM::new();
        let re = Value::regexp(RegexpInfo::from_string(&mut vm, "l+").unwrap());
        let pos = vm
            .send1(IdentId::_MATCH, Value::string("hello"), re)
            .unwrap();
        assert_eq!(Value::integer(2), pos);
        let re = Value::regexp(RegexpInfo::from_string(&mut vm, "zz").unwrap());
        let pos = vm
            .send1(IdentId::_MATCH, Value::string("hello"), re)
            .unwrap();
        assert_eq!(Value::nil(), pos);
    }

    #[test]
    fn gsub_replaces_all() {
        let mut vm = VM::new();
        let re = Value::regexp(RegexpInfo::from_string(&mut vm, "def").unwrap());
        let res = vm
            .send2(
                IdentId::get_id("gsub"),
                Value::string("abcdefg"),
                re,
                Value::string("!!"),
            )
            .unwrap();
        assert_eq!("abc!!g", res.as_rstring().unwrap().to_s());
    }

    #[test]
    fn index_with_string_and_start() {
        let mut vm = VM::new();
        let s = Value::string("hello world hello");
        let pos = vm
            .send2(
                IdentId::get_id("index"),
                s,
                Value::string("hello"),
                Value::integer(1),
            )
            .unwrap();
        assert_eq!(Value::integer(12), pos);
    }
}
