use crate::builtin::object::expect_name;
use crate::*;

pub(crate) fn init(vm: &mut VM) {
    let regexp = BuiltinClass::regexp();
    vm.add_builtin_class_method(regexp, "new", regexp_new, ParamsDesc::variadic());
    vm.add_builtin_class_method(regexp, "compile", regexp_new, ParamsDesc::variadic());
    vm.add_builtin_class_method(regexp, "escape", regexp_escape, ParamsDesc::fixed(1));
    vm.add_builtin_class_method(regexp, "quote", regexp_escape, ParamsDesc::fixed(1));
    vm.add_builtin_class_method(regexp, "union", regexp_union, ParamsDesc::variadic());
    vm.add_builtin_method(regexp, "=~", regexp_match_op, ParamsDesc::fixed(1));
    vm.add_builtin_method(regexp, "match", regexp_match, ParamsDesc::variadic());
    vm.add_builtin_method(regexp, "match?", regexp_match_p, ParamsDesc::fixed(1));
    vm.add_builtin_method(regexp, "source", regexp_source, ParamsDesc::fixed(0));
    vm.add_builtin_method(regexp, "options", regexp_options, ParamsDesc::fixed(0));
    vm.add_builtin_method(regexp, "fixed_encoding?", regexp_fixed_p, ParamsDesc::fixed(0));
    vm.add_builtin_method(regexp, "encoding", regexp_encoding, ParamsDesc::fixed(0));

    let matchdata = BuiltinClass::matchdata();
    vm.add_builtin_method(matchdata, "[]", matchdata_index, ParamsDesc::fixed(1));
    vm.add_builtin_method(matchdata, "begin", matchdata_begin, ParamsDesc::fixed(1));
    vm.add_builtin_method(matchdata, "end", matchdata_end, ParamsDesc::fixed(1));
    vm.add_builtin_method(matchdata, "size", matchdata_size, ParamsDesc::fixed(0));
    vm.add_builtin_method(matchdata, "length", matchdata_size, ParamsDesc::fixed(0));
    vm.add_builtin_method(matchdata, "to_s", matchdata_to_s, ParamsDesc::fixed(0));
    vm.add_builtin_method(matchdata, "string", matchdata_string, ParamsDesc::fixed(0));
    vm.add_builtin_method(matchdata, "regexp", matchdata_regexp, ParamsDesc::fixed(0));
}

// Class methods.

fn regexp_new(vm: &mut VM, _: Value, args: &Args) -> VMResult {
    args.check_args_range(1, 2)?;
    let rs = args[0].expect_string("1st arg")?;
    let options = if args.len() == 2 {
        match args[1].as_fixnum() {
            Some(bits) => RegexpOptions::from_bits(bits as u8),
            None => RegexpOptions {
                ignore_case: args[1].to_boolean(),
                ..RegexpOptions::default()
            },
        }
    } else {
        RegexpOptions::default()
    };
    let re = RegexpInfo::compile(vm, rs.rope().clone(), options)?;
    Ok(Value::regexp(re))
}

fn regexp_escape(_: &mut VM, _: Value, args: &Args) -> VMResult {
    let rs = args[0].expect_string("1st arg")?;
    Ok(Value::string(crate::regexp::quote(&rs.to_s())))
}

fn regexp_union(vm: &mut VM, _: Value, args: &Args) -> VMResult {
    args.check_args_min(1)?;
    // A single array argument is the list itself.
    let parts: Vec<Value> = match args[0].as_array() {
        Some(a) if args.len() == 1 => a.elements.clone(),
        _ => args.to_vec(),
    };
    crate::regexp::union(vm, &parts)
}

// Instance methods.

fn self_regexp(self_val: Value) -> Result<RegexpInfo, RubyError> {
    self_val
        .as_regexp()
        .ok_or_else(|| RubyError::wrong_type("Receiver", "Regexp", self_val))
}

fn regexp_match_op(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let re = self_regexp(self_val)?;
    if args[0].is_nil() {
        return Ok(Value::nil());
    }
    let len = args[0].expect_string("1st arg")?.byte_len() as i64;
    let md = re.match_in_region(vm, args[0], 0, len, false, 0)?;
    match md.as_matchdata() {
        Some(md) => Ok(Value::integer(md.starts[0] as i64)),
        None => Ok(Value::nil()),
    }
}

fn regexp_match(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    args.check_args_range(1, 2)?;
    let re = self_regexp(self_val)?;
    let from = if args.len() == 2 {
        args[1]
            .as_fixnum()
            .ok_or_else(|| RubyError::wrong_type("2nd arg", "Integer", args[1]))?
    } else {
        0
    };
    let len = args[0].expect_string("1st arg")?.byte_len() as i64;
    re.match_in_region(vm, args[0], from, len, false, 0)
}

fn regexp_match_p(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let md = regexp_match(vm, self_val, args)?;
    Ok(Value::bool(!md.is_nil()))
}

fn regexp_source(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let re = self_regexp(self_val)?;
    let source = re.source().clone();
    Ok(Value::bytes(source.as_bytes().to_vec(), source.encoding()))
}

fn regexp_options(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let re = self_regexp(self_val)?;
    Ok(Value::integer(re.options().bits() as i64))
}

fn regexp_fixed_p(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let re = self_regexp(self_val)?;
    Ok(Value::bool(re.options().fixed_encoding))
}

fn regexp_encoding(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let re = self_regexp(self_val)?;
    Ok(Value::frozen_string(
        re.effective_encoding().name(),
        EncodingRef::US_ASCII,
    ))
}

// MatchData methods.

fn self_matchdata(self_val: Value) -> Result<&'static MatchDataInfo, RubyError> {
    match &self_val.rvalue().kind {
        ObjKind::MatchData(md) => Ok(unsafe { &*(md.as_ref() as *const MatchDataInfo) }),
        _ => Err(RubyError::wrong_type("Receiver", "MatchData", self_val)),
    }
}

fn matchdata_index(_: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let md = self_matchdata(self_val)?;
    if let Some(i) = args[0].as_fixnum() {
        if i < 0 {
            return Err(RubyError::index(format!("index {} out of matches", i)));
        }
        return Ok(md.group_value(i as usize));
    }
    let name = expect_name(args[0])?;
    Ok(md.named_group_value(&IdentId::get_name(name)))
}

fn group_arg(md: &MatchDataInfo, arg: Value) -> Result<usize, RubyError> {
    let i = arg
        .as_fixnum()
        .ok_or_else(|| RubyError::wrong_type("1st arg", "Integer", arg))?;
    if i < 0 || i as usize >= md.group_count() {
        return Err(RubyError::index(format!("index {} out of matches", i)));
    }
    Ok(i as usize)
}

fn matchdata_begin(_: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let md = self_matchdata(self_val)?;
    let i = group_arg(md, args[0])?;
    match md.group(i) {
        Some((start, _)) => Ok(Value::integer(start as i64)),
        None => Ok(Value::nil()),
    }
}

fn matchdata_end(_: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let md = self_matchdata(self_val)?;
    let i = group_arg(md, args[0])?;
    match md.group(i) {
        Some((_, end)) => Ok(Value::integer(end as i64)),
        None => Ok(Value::nil()),
    }
}

fn matchdata_size(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let md = self_matchdata(self_val)?;
    Ok(Value::integer(md.group_count() as i64))
}

fn matchdata_to_s(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let md = self_matchdata(self_val)?;
    Ok(md.group_value(0))
}

fn matchdata_string(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let md = self_matchdata(self_val)?;
    Ok(Value::string_from_rstring(md.subject.clone()))
}

fn matchdata_regexp(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let md = self_matchdata(self_val)?;
    Ok(Value::regexp(md.regexp.clone()))
}

// Primitives of the bundled library.

/// Match using the backtracking engine over the given region.
pub fn regexp_match_in_region(
    vm: &mut VM,
    re: Value,
    subject: Value,
    from: i64,
    to: i64,
    at_start: bool,
    start_pos: i64,
) -> VMResult {
    let re = self_regexp(re)?;
    re.match_in_region_slow(vm, subject, from, to, at_start, start_pos)
}

/// Match using the linear-time engine where its contract allows,
/// falling back to the backtracking engine otherwise.
pub fn regexp_match_in_region_tregex(
    vm: &mut VM,
    re: Value,
    subject: Value,
    from: i64,
    to: i64,
    at_start: bool,
    start_pos: i64,
) -> VMResult {
    let re = self_regexp(re)?;
    re.match_in_region(vm, subject, from, to, at_start, start_pos)
}

/// Shift a MatchData's group offsets by `start_pos`.
pub fn matchdata_fixup_positions(md_val: Value, start_pos: i32) -> VMResult {
    let mut md_val = md_val;
    match md_val.as_mut_matchdata() {
        Some(md) => {
            md.fixup_positions(start_pos);
            Ok(md_val)
        }
        None => Err(RubyError::wrong_type("1st arg", "MatchData", md_val)),
    }
}

/// Assemble a MatchData from group boundary arrays.
pub fn matchdata_create(
    re: Value,
    subject: Value,
    starts: Vec<i32>,
    ends: Vec<i32>,
) -> VMResult {
    let re = self_regexp(re)?;
    let rs = subject.expect_string("2nd arg")?;
    if starts.len() != ends.len() {
        return Err(RubyError::argument(
            "Group start and end arrays differ in length.",
        ));
    }
    Ok(Value::matchdata(MatchDataInfo::new(re, rs, starts, ends)))
}
