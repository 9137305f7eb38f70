use crate::*;

pub(crate) fn init(vm: &mut VM) {
    let symbol = BuiltinClass::symbol();
    vm.add_builtin_method(symbol, "to_proc", to_proc, ParamsDesc::fixed(0));
    vm.add_builtin_method(symbol, "to_s", to_s, ParamsDesc::fixed(0));
    vm.add_builtin_method(symbol, "id2name", to_s, ParamsDesc::fixed(0));
    vm.add_builtin_method(symbol, "to_sym", to_sym, ParamsDesc::fixed(0));
    vm.add_builtin_method(symbol, "length", length, ParamsDesc::fixed(0));
    vm.add_builtin_method(symbol, "encoding", encoding, ParamsDesc::fixed(0));
}

/// The proc takes its first argument as receiver and dispatches the
/// symbol with the rest, holding a PUBLIC-mode dispatch cache.
fn to_proc(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let sym = self_val.expect_symbol("Receiver")?;
    Ok(Value::procobj(ProcInfo::sym(sym)))
}

fn to_s(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let sym = self_val.expect_symbol("Receiver")?;
    let rope = IdentId::get_rope(sym);
    Ok(Value::bytes(rope.as_bytes().to_vec(), rope.encoding()))
}

fn to_sym(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    Ok(self_val)
}

fn length(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let sym = self_val.expect_symbol("Receiver")?;
    let rope = IdentId::get_rope(sym);
    let len = match rope.as_str() {
        Some(s) => s.chars().count(),
        None => rope.byte_len(),
    };
    Ok(Value::integer(len as i64))
}

fn encoding(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let sym = self_val.expect_symbol("Receiver")?;
    Ok(Value::frozen_string(
        IdentId::encoding(sym).name(),
        EncodingRef::US_ASCII,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_to_proc_dispatches_on_first_arg() {
        let mut vm = VM::new();
        let sym = Value::symbol(IdentId::get_id("succ"));
        let proc_val = vm.send0(IdentId::get_id("to_proc"), sym).unwrap();
        let res = vm
            .eval_proc(proc_val, &Args::new1(Value::integer(41)))
            .unwrap();
        assert_eq!(Value::integer(42), res);
        // The embedded cache serves repeat calls.
        let res = vm
            .eval_proc(proc_val, &Args::new1(Value::integer(1)))
            .unwrap();
        assert_eq!(Value::integer(2), res);
    }

    #[test]
    fn to_proc_without_receiver_is_an_error() {
        let mut vm = VM::new();
        let sym = Value::symbol(IdentId::get_id("succ"));
        let proc_val = vm.send0(IdentId::get_id("to_proc"), sym).unwrap();
        let err = vm.eval_proc(proc_val, &Args::new0()).unwrap_err();
        assert!(err.is_kind(RuntimeErrKind::Argument));
    }

    #[test]
    fn round_trips() {
        let mut vm = VM::new();
        let sym = Value::symbol_from_str("payload");
        let s = vm.send0(IdentId::TO_S, sym).unwrap();
        assert_eq!("payload", s.as_rstring().unwrap().to_s());
        assert_eq!(
            Value::integer(7),
            vm.send0(IdentId::get_id("length"), sym).unwrap()
        );
    }
}
