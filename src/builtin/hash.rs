use crate::*;

pub(crate) fn init(vm: &mut VM) {
    let hash = BuiltinClass::hash();
    vm.add_builtin_method(hash, "[]", index, ParamsDesc::fixed(1));
    vm.add_builtin_method(hash, "[]=", index_assign, ParamsDesc::fixed(2));
    vm.add_builtin_method(hash, "store", index_assign, ParamsDesc::fixed(2));
    vm.add_builtin_method(hash, "fetch", fetch, ParamsDesc::variadic());
    vm.add_builtin_method(hash, "delete", delete, ParamsDesc::fixed(1));
    vm.add_builtin_method(hash, "each", each, ParamsDesc::fixed(0));
    vm.add_builtin_method(hash, "each_pair", each, ParamsDesc::fixed(0));
    vm.add_builtin_method(hash, "size", size, ParamsDesc::fixed(0));
    vm.add_builtin_method(hash, "length", size, ParamsDesc::fixed(0));
    vm.add_builtin_method(hash, "empty?", empty_p, ParamsDesc::fixed(0));
    vm.add_builtin_method(hash, "keys", keys, ParamsDesc::fixed(0));
    vm.add_builtin_method(hash, "values", values, ParamsDesc::fixed(0));
    vm.add_builtin_method(hash, "shift", shift, ParamsDesc::fixed(0));
    vm.add_builtin_method(hash, "include?", include_p, ParamsDesc::fixed(1));
    vm.add_builtin_method(hash, "key?", include_p, ParamsDesc::fixed(1));
    vm.add_builtin_method(hash, "has_key?", include_p, ParamsDesc::fixed(1));
    vm.add_builtin_method(hash, "member?", include_p, ParamsDesc::fixed(1));
    vm.add_builtin_method(hash, "compare_by_identity", compare_by_identity, ParamsDesc::fixed(0));
    vm.add_builtin_method(
        hash,
        "compare_by_identity?",
        compare_by_identity_p,
        ParamsDesc::fixed(0),
    );
    vm.add_builtin_method(hash, "rehash", rehash, ParamsDesc::fixed(0));
    vm.add_builtin_method(hash, "replace", replace, ParamsDesc::fixed(1));
    vm.add_builtin_method(hash, "clear", clear, ParamsDesc::fixed(0));
    vm.add_builtin_method(hash, "default", default, ParamsDesc::fixed(0));
    vm.add_builtin_method(hash, "default=", default_assign, ParamsDesc::fixed(1));
    vm.add_builtin_method(hash, "to_a", to_a, ParamsDesc::fixed(0));
}

fn expect_hash(mut val: Value, msg: &str) -> Result<&'static mut RubyHash, RubyError> {
    // Hash storage lives in the RValue; the reference is as stable as
    // the value itself.
    match val.as_mut_rvalue().map(|r| &mut r.kind) {
        Some(ObjKind::Hash(h)) => Ok(unsafe { &mut *(h.as_mut() as *mut RubyHash) }),
        _ => Err(RubyError::wrong_type(msg, "Hash", val)),
    }
}

/// Hash#[] consults the default value and the default proc on a miss.
fn index(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    let default_value = h.default_value;
    let default_proc = h.default_proc;
    h.lookup_or_default(vm, args[0], |vm, key| {
        if let Some(proc_val) = default_proc {
            return vm.eval_proc(proc_val, &Args::new2(self_val, key));
        }
        Ok(default_value.unwrap_or_default())
    })
}

fn fetch(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    args.check_args_range(1, 2)?;
    let h = expect_hash(self_val, "Receiver")?;
    match h.get(vm, args[0])? {
        Some(v) => Ok(v),
        None if args.len() == 2 => Ok(args[1]),
        None => Err(RubyError::index(format!("key not found: {:?}", args[0]))),
    }
}

fn index_assign(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    h.set(vm, args[0], args[1])?;
    Ok(args[1])
}

fn delete(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    Ok(h.delete(vm, args[0])?.unwrap_or_default())
}

fn each(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let block = args.expect_block()?.clone();
    RubyHash::each_entry_value(vm, self_val, |vm, _idx, k, v| {
        vm.eval_block(&block, &Args::new2(k, v))?;
        Ok(())
    })?;
    Ok(self_val)
}

fn size(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    Ok(Value::integer(h.len() as i64))
}

fn empty_p(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    Ok(Value::bool(h.is_empty()))
}

fn keys(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    Ok(Value::array_from(h.keys()))
}

fn values(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    Ok(Value::array_from(h.values()))
}

fn shift(vm: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    match h.shift() {
        Some((k, v)) => Ok(Value::array_from(vec![k, v])),
        None => {
            let default_value = h.default_value;
            let default_proc = h.default_proc;
            if let Some(proc_val) = default_proc {
                return vm.eval_proc(proc_val, &Args::new2(self_val, Value::nil()));
            }
            Ok(default_value.unwrap_or_default())
        }
    }
}

fn include_p(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    Ok(Value::bool(h.contains_key(vm, args[0])?))
}

fn compare_by_identity(vm: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    h.set_compare_by_identity(vm)?;
    Ok(self_val)
}

fn compare_by_identity_p(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    Ok(Value::bool(h.compare_by_identity_p()))
}

fn rehash(vm: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    h.rehash(vm)?;
    Ok(self_val)
}

fn replace(_: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let src = expect_hash(args[0], "1st arg")?;
    let dest = expect_hash(self_val, "Receiver")?;
    src.replace_into(dest);
    Ok(self_val)
}

fn clear(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    h.clear();
    Ok(self_val)
}

fn default(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    Ok(h.default_value.unwrap_or_default())
}

fn default_assign(_: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    h.default_value = Some(args[0]);
    Ok(args[0])
}

fn to_a(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let h = expect_hash(self_val, "Receiver")?;
    let pairs = h
        .iter_pairs()
        .into_iter()
        .map(|(k, v)| Value::array_from(vec![k, v]))
        .collect();
    Ok(Value::array_from(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Value {
        Value::symbol_from_str(name)
    }

    #[test]
    fn index_and_default() {
        let mut vm = VM::new();
        let h = Value::hash_empty();
        vm.send2(IdentId::_INDEX_ASSIGN, h, sym("k"), Value::integer(1))
            .unwrap();
        assert_eq!(
            Value::integer(1),
            vm.send1(IdentId::_INDEX, h, sym("k")).unwrap()
        );
        assert_eq!(Value::nil(), vm.send1(IdentId::_INDEX, h, sym("nope")).unwrap());
        vm.send1(IdentId::get_id("default="), h, Value::integer(-1))
            .unwrap();
        assert_eq!(
            Value::integer(-1),
            vm.send1(IdentId::_INDEX, h, sym("nope")).unwrap()
        );
    }

    #[test]
    fn each_yields_in_insertion_order() {
        let mut vm = VM::new();
        let h = Value::hash_empty();
        for (k, v) in [("a", 1), ("b", 2), ("c", 3)] {
            vm.send2(IdentId::_INDEX_ASSIGN, h, sym(k), Value::integer(v))
                .unwrap();
        }
        // Collect keys through Hash#keys, which walks the same sequence
        // the block form does.
        let keys = vm.send0(IdentId::get_id("keys"), h).unwrap();
        assert_eq!(
            vec![sym("a"), sym("b"), sym("c")],
            keys.as_array().unwrap().elements
        );
    }

    #[test]
    fn fetch_raises_on_missing_key() {
        let mut vm = VM::new();
        let h = Value::hash_empty();
        let err = vm
            .send1(IdentId::get_id("fetch"), h, sym("absent"))
            .unwrap_err();
        assert!(err.is_kind(RuntimeErrKind::Index));
        assert_eq!(
            Value::integer(0),
            vm.send2(IdentId::get_id("fetch"), h, sym("absent"), Value::integer(0))
                .unwrap()
        );
    }

    #[test]
    fn shift_returns_pairs_in_order() {
        let mut vm = VM::new();
        let h = Value::hash_empty();
        vm.send2(IdentId::_INDEX_ASSIGN, h, sym("x"), Value::integer(1))
            .unwrap();
        vm.send2(IdentId::_INDEX_ASSIGN, h, sym("y"), Value::integer(2))
            .unwrap();
        let pair = vm.send0(IdentId::get_id("shift"), h).unwrap();
        assert_eq!(
            vec![sym("x"), Value::integer(1)],
            pair.as_array().unwrap().elements
        );
        assert_eq!(
            Value::integer(1),
            vm.send0(IdentId::get_id("size"), h).unwrap()
        );
    }

    #[test]
    fn default_proc_is_consulted_on_miss() {
        let mut vm = VM::new();
        let h = Value::hash_empty();
        // The producer receives (hash, key) and answers with the key.
        fn producer(_: &mut VM, _: Value, args: &Args) -> VMResult {
            Ok(args[1])
        }
        let mut hv = h;
        hv.as_mut_rhash().unwrap().default_proc =
            Some(Value::procobj(ProcInfo::native(producer)));
        assert_eq!(
            sym("missing_key"),
            vm.send1(IdentId::_INDEX, h, sym("missing_key")).unwrap()
        );
    }

    #[test]
    fn compare_by_identity_toggles_mode() {
        let mut vm = VM::new();
        let h = Value::hash_empty();
        let key = Value::string("k");
        vm.send2(IdentId::_INDEX_ASSIGN, h, key, Value::integer(1))
            .unwrap();
        vm.send0(IdentId::get_id("compare_by_identity"), h).unwrap();
        assert_eq!(
            Value::true_val(),
            vm.send0(IdentId::get_id("compare_by_identity?"), h).unwrap()
        );
        // Content-equal keys stop matching.
        assert_eq!(
            Value::nil(),
            vm.send1(IdentId::_INDEX, h, Value::string("k")).unwrap()
        );
    }
}
