use crate::*;
use num::BigInt;

pub(crate) fn init(vm: &mut VM) {
    let integer = BuiltinClass::integer();
    vm.add_builtin_method(integer, "+", add, ParamsDesc::fixed(1));
    vm.add_builtin_method(integer, "succ", succ, ParamsDesc::fixed(0));
    vm.add_builtin_method(integer, "zero?", zero_p, ParamsDesc::fixed(0));
    vm.add_builtin_method(integer, "even?", even_p, ParamsDesc::fixed(0));
    vm.add_builtin_method(integer, "times", times, ParamsDesc::fixed(0));
}

fn as_integer(val: Value, msg: &str) -> Result<i64, RubyError> {
    val.as_fixnum()
        .ok_or_else(|| RubyError::wrong_type(msg, "Integer", val))
}

fn add(_: &mut VM, self_val: Value, args: &Args) -> VMResult {
    match (self_val.as_fixnum(), args[0].as_fixnum()) {
        (Some(lhs), Some(rhs)) => match lhs.checked_add(rhs) {
            Some(res) => Ok(Value::integer(res)),
            None => Ok(Value::bignum(BigInt::from(lhs) + BigInt::from(rhs))),
        },
        _ => match (self_val.as_bignum(), args[0].as_fixnum()) {
            (Some(lhs), Some(rhs)) => Ok(Value::bignum(lhs + BigInt::from(rhs))),
            _ => Err(RubyError::wrong_type("Operand", "Integer", args[0])),
        },
    }
}

fn succ(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    match self_val.as_fixnum() {
        Some(i) => Ok(Value::integer(i.wrapping_add(1))),
        None => match self_val.as_bignum() {
            Some(n) => Ok(Value::bignum(n + BigInt::from(1))),
            None => Err(RubyError::wrong_type("Receiver", "Integer", self_val)),
        },
    }
}

fn zero_p(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    Ok(Value::bool(self_val.as_fixnum() == Some(0)))
}

fn even_p(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let i = as_integer(self_val, "Receiver")?;
    Ok(Value::bool(i % 2 == 0))
}

fn times(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let n = as_integer(self_val, "Receiver")?;
    let block = args.expect_block()?.clone();
    for i in 0..n {
        vm.check_interrupt()?;
        vm.eval_block1(&block, Value::integer(i))?;
    }
    Ok(self_val)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let mut vm = VM::new();
        assert_eq!(
            Value::integer(3),
            vm.send1(IdentId::get_id("+"), Value::integer(1), Value::integer(2))
                .unwrap()
        );
        assert_eq!(
            Value::integer(8),
            vm.send0(IdentId::get_id("succ"), Value::integer(7)).unwrap()
        );
    }

    #[test]
    fn times_yields_through_a_symbol_block() {
        let mut vm = VM::new();
        // 3.times(&:zero?) — the block result is discarded, but the
        // dispatch must succeed for every index.
        let args = Args::new0().with_block(Block::Sym(IdentId::get_id("zero?")));
        let res = vm
            .send(IdentId::get_id("times"), Value::integer(3), &args)
            .unwrap();
        assert_eq!(Value::integer(3), res);
    }
}
