use crate::*;
use std::hash::{Hash, Hasher};

pub(crate) fn init(vm: &mut VM) {
    let object = BuiltinClass::object();
    vm.add_builtin_method(object, "==", eq, ParamsDesc::fixed(1));
    vm.add_builtin_method(object, "!=", neq, ParamsDesc::fixed(1));
    vm.add_builtin_method(object, "equal?", equal, ParamsDesc::fixed(1));
    vm.add_builtin_method(object, "eql?", eql, ParamsDesc::fixed(1));
    vm.add_builtin_method(object, "hash", hash, ParamsDesc::fixed(0));
    vm.add_builtin_method(object, "class", class, ParamsDesc::fixed(0));
    vm.add_builtin_method(object, "frozen?", frozen_p, ParamsDesc::fixed(0));
    vm.add_builtin_method(object, "freeze", freeze, ParamsDesc::fixed(0));
    vm.add_builtin_method(object, "respond_to?", respond_to, ParamsDesc::fixed(1));
    vm.add_builtin_method(object, "send", send, ParamsDesc::variadic());
    vm.add_builtin_method(object, "__send__", send, ParamsDesc::variadic());
    vm.add_builtin_method(object, "public_send", public_send, ParamsDesc::variadic());
    vm.add_builtin_method(object, "method", method, ParamsDesc::fixed(1));
    vm.add_builtin_method(object, "dup", dup, ParamsDesc::fixed(0));
    vm.add_builtin_method(object, "inspect", inspect, ParamsDesc::fixed(0));
    vm.add_builtin_method(object, "to_s", inspect, ParamsDesc::fixed(0));
}

fn eq(_: &mut VM, self_val: Value, args: &Args) -> VMResult {
    Ok(Value::bool(self_val == args[0]))
}

fn neq(_: &mut VM, self_val: Value, args: &Args) -> VMResult {
    Ok(Value::bool(self_val != args[0]))
}

fn equal(_: &mut VM, self_val: Value, args: &Args) -> VMResult {
    Ok(Value::bool(self_val.id() == args[0].id()))
}

/// Object#eql? defaults to identity; subclasses with value semantics
/// override it.
fn eql(_: &mut VM, self_val: Value, args: &Args) -> VMResult {
    Ok(Value::bool(self_val.id() == args[0].id()))
}

/// Object#hash defaults to an identity-derived code.
fn hash(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let mut hasher = fxhash::FxHasher::default();
    self_val.id().hash(&mut hasher);
    let h = hasher.finish();
    Ok(Value::integer((h as u32 ^ (h >> 32) as u32) as i32 as i64))
}

fn class(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    Ok(self_val.get_class().into())
}

fn frozen_p(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let frozen = match self_val.as_rstring() {
        Some(rs) => rs.is_frozen(),
        // Packed values are frozen by nature.
        None => self_val.is_packed_value(),
    };
    Ok(Value::bool(frozen))
}

fn freeze(_: &mut VM, mut self_val: Value, _: &Args) -> VMResult {
    if let Some(rs) = self_val.as_mut_rstring() {
        rs.freeze();
    }
    Ok(self_val)
}

fn respond_to(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let name = expect_name(args[0])?;
    Ok(Value::bool(vm.respond_to(self_val, name)))
}

/// Reflective call reaching every visibility, like an implicit-self
/// site.
fn send(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    args.check_args_min(1)?;
    let name = expect_name(args[0])?;
    vm.send_with_mode(
        name,
        self_val,
        &args.shift(),
        DispatchMode::PRIVATE,
        Some(self_val),
    )
}

fn public_send(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    args.check_args_min(1)?;
    let name = expect_name(args[0])?;
    vm.send(name, self_val, &args.shift())
}

fn method(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let name = expect_name(args[0])?;
    let rec_class = self_val.get_class_for_method();
    match vm.globals.methods.find_method(rec_class, name) {
        Some((fid, owner)) => Ok(Value::method_obj(MethodObjInfo::new(
            name, self_val, fid, owner,
        ))),
        None => Err(RubyError::name(format!(
            "undefined method `{:?}' for class `{:?}'",
            name, rec_class
        ))),
    }
}

fn dup(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    if self_val.is_foreign() {
        return Err(RubyError::typeerr("can't dup a foreign object."));
    }
    Ok(self_val.shallow_dup())
}

fn inspect(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    Ok(Value::string(format!("{:?}", self_val)))
}

pub(crate) fn expect_name(val: Value) -> Result<IdentId, RubyError> {
    if let Some(id) = val.as_symbol() {
        return Ok(id);
    }
    if let Some(rs) = val.as_rstring() {
        return Ok(IdentId::intern(rs.as_bytes(), rs.encoding()));
    }
    Err(RubyError::typeerr(format!(
        "{:?} is not a symbol nor a string.",
        val
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_identity_and_hash() {
        let mut vm = VM::new();
        let o = Value::ordinary_object(BuiltinClass::object());
        let eq = vm
            .send1(IdentId::get_id("equal?"), o, o)
            .unwrap();
        assert_eq!(Value::true_val(), eq);
        let h1 = vm.send0(IdentId::HASH, o).unwrap();
        let h2 = vm.send0(IdentId::HASH, o).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn send_reaches_private_public_send_does_not() {
        let mut vm = VM::new();
        let class = Module::class_under_object();
        fn secret(_: &mut VM, _: Value, _: &Args) -> VMResult {
            Ok(Value::integer(99))
        }
        let name = IdentId::get_id("secret");
        vm.globals.define_method(
            class,
            name,
            MethodInfo::native(name, secret, ParamsDesc::fixed(0))
                .with_visibility(Visibility::Private),
        );
        let obj = Value::ordinary_object(class);

        let via_send = vm
            .send1(
                IdentId::get_id("send"),
                obj,
                Value::symbol(name),
            )
            .unwrap();
        assert_eq!(Value::integer(99), via_send);

        let err = vm
            .send1(IdentId::get_id("public_send"), obj, Value::symbol(name))
            .unwrap_err();
        assert!(err.is_kind(RuntimeErrKind::NoMethod));
    }

    #[test]
    fn method_object_carries_binding() {
        let mut vm = VM::new();
        let obj = Value::ordinary_object(BuiltinClass::object());
        let m = vm
            .send1(
                IdentId::get_id("method"),
                obj,
                Value::symbol(IdentId::HASH),
            )
            .unwrap();
        let info = match &m.rvalue().kind {
            ObjKind::Method(info) => info.clone(),
            _ => panic!("not a method object"),
        };
        assert_eq!(IdentId::HASH, info.name);
        assert_eq!(Some(obj.id()), info.receiver.map(|r| r.id()));
    }
}
