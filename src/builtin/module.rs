use crate::builtin::object::expect_name;
use crate::*;

pub(crate) fn init(vm: &mut VM) {
    let module = BuiltinClass::module();
    vm.add_builtin_method(module, "include", include, ParamsDesc::variadic());
    vm.add_builtin_method(module, "method_defined?", method_defined, ParamsDesc::fixed(1));
    vm.add_builtin_method(module, "alias_method", alias_method, ParamsDesc::fixed(2));
    vm.add_builtin_method(module, "undef_method", undef_method, ParamsDesc::variadic());
    vm.add_builtin_method(module, "remove_method", remove_method, ParamsDesc::variadic());
    vm.add_builtin_method(module, "private", private, ParamsDesc::variadic());
    vm.add_builtin_method(module, "public", public, ParamsDesc::variadic());
    vm.add_builtin_method(module, "protected", protected, ParamsDesc::variadic());
    vm.add_builtin_method(module, "module_function", module_function, ParamsDesc::variadic());
    vm.add_builtin_method(module, "attr_reader", attr_reader, ParamsDesc::variadic());
    vm.add_builtin_method(module, "attr_writer", attr_writer, ParamsDesc::variadic());
    vm.add_builtin_method(module, "attr_accessor", attr_accessor, ParamsDesc::variadic());
    vm.add_builtin_method(module, "ancestors", ancestors, ParamsDesc::fixed(0));
    vm.add_builtin_method(module, "instance_methods", instance_methods, ParamsDesc::fixed(0));
    vm.add_builtin_method(module, "name", name, ParamsDesc::fixed(0));
}

fn expect_module(val: Value) -> Result<Module, RubyError> {
    val.if_mod_class()
        .ok_or_else(|| RubyError::wrong_type("Argument", "Module", val))
}

fn include(_: &mut VM, self_val: Value, args: &Args) -> VMResult {
    args.check_args_min(1)?;
    let mut myself = expect_module(self_val)?;
    // Later arguments end up lower in the chain, as in `include A, B`.
    for arg in args.iter().rev() {
        let target = expect_module(*arg)?;
        if target.id() == myself.id() {
            return Err(RubyError::argument("cyclic include detected"));
        }
        myself.append_include(target);
    }
    Ok(self_val)
}

fn method_defined(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let myself = expect_module(self_val)?;
    let name = expect_name(args[0])?;
    Ok(Value::bool(
        vm.globals.methods.find_method(myself, name).is_some(),
    ))
}

fn alias_method(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let myself = expect_module(self_val)?;
    let new_name = expect_name(args[0])?;
    let orig_name = expect_name(args[1])?;
    vm.globals.alias_method(myself, new_name, orig_name)?;
    Ok(self_val)
}

fn undef_method(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let myself = expect_module(self_val)?;
    for arg in args.iter() {
        let name = expect_name(*arg)?;
        // A tombstone entry makes lookup stop with "missing".
        vm.globals.undef_method(myself, name);
    }
    Ok(self_val)
}

fn remove_method(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let myself = expect_module(self_val)?;
    for arg in args.iter() {
        let name = expect_name(*arg)?;
        if !vm.globals.remove_method(myself, name) {
            return Err(RubyError::name(format!(
                "method `{:?}' not defined in {:?}",
                name, myself
            )));
        }
    }
    Ok(self_val)
}

fn set_visibility_all(
    vm: &mut VM,
    self_val: Value,
    args: &Args,
    visibility: Visibility,
) -> VMResult {
    let myself = expect_module(self_val)?;
    for arg in args.iter() {
        let name = expect_name(*arg)?;
        vm.globals.set_visibility(myself, name, visibility)?;
    }
    Ok(self_val)
}

fn private(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    set_visibility_all(vm, self_val, args, Visibility::Private)
}

fn public(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    set_visibility_all(vm, self_val, args, Visibility::Public)
}

fn protected(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    set_visibility_all(vm, self_val, args, Visibility::Protected)
}

fn module_function(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    set_visibility_all(vm, self_val, args, Visibility::ModuleFunction)
}

fn attr_reader(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let myself = expect_module(self_val)?;
    for arg in args.iter() {
        let name = expect_name(*arg)?;
        vm.globals.define_attr_reader(myself, name);
    }
    Ok(Value::nil())
}

fn attr_writer(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    let myself = expect_module(self_val)?;
    for arg in args.iter() {
        let name = expect_name(*arg)?;
        vm.globals.define_attr_writer(myself, name);
    }
    Ok(Value::nil())
}

fn attr_accessor(vm: &mut VM, self_val: Value, args: &Args) -> VMResult {
    attr_reader(vm, self_val, args)?;
    attr_writer(vm, self_val, args)
}

fn ancestors(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let myself = expect_module(self_val)?;
    let mut ary = vec![];
    let mut cur = Some(myself);
    while let Some(m) = cur {
        ary.push(m.real_module().get());
        cur = m.upper();
    }
    Ok(Value::array_from(ary))
}

/// Names declared directly in this module's own table.
fn instance_methods(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let myself = expect_module(self_val)?;
    let ary = myself
        .method_names()
        .into_iter()
        .map(Value::symbol)
        .collect();
    Ok(Value::array_from(ary))
}

fn name(_: &mut VM, self_val: Value, _: &Args) -> VMResult {
    let myself = expect_module(self_val)?;
    Ok(Value::string(myself.name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_object_with_class() -> (VM, Module, Value) {
        let vm = VM::new();
        let class = Module::class_under_object();
        let obj = Value::ordinary_object(class);
        (vm, class, obj)
    }

    #[test]
    fn include_makes_module_methods_reachable() {
        let (mut vm, class, obj) = new_object_with_class();
        let mixin = Module::module_new();
        fn from_mixin(_: &mut VM, _: Value, _: &Args) -> VMResult {
            Ok(Value::integer(5))
        }
        let name = IdentId::get_id("from_mixin");
        vm.globals.define_method(
            mixin,
            name,
            MethodInfo::native(name, from_mixin, ParamsDesc::fixed(0)),
        );
        vm.send1(IdentId::get_id("include"), class.get(), mixin.get())
            .unwrap();
        assert_eq!(Value::integer(5), vm.send0(name, obj).unwrap());
        assert!(class.include_module_p(mixin));
    }

    #[test]
    fn undef_method_blocks_inherited_lookup() {
        let (mut vm, class, obj) = new_object_with_class();
        // Object#hash is reachable...
        assert!(vm.send0(IdentId::HASH, obj).is_ok());
        vm.send1(
            IdentId::get_id("undef_method"),
            class.get(),
            Value::symbol(IdentId::HASH),
        )
        .unwrap();
        // ...until the tombstone hides it.
        let err = vm.send0(IdentId::HASH, obj).unwrap_err();
        assert!(err.is_kind(RuntimeErrKind::NoMethod));
    }

    #[test]
    fn alias_points_at_the_same_method() {
        let (mut vm, class, obj) = new_object_with_class();
        fn value(_: &mut VM, _: Value, _: &Args) -> VMResult {
            Ok(Value::integer(1))
        }
        let orig = IdentId::get_id("original_name");
        vm.globals.define_method(
            class,
            orig,
            MethodInfo::native(orig, value, ParamsDesc::fixed(0)),
        );
        vm.send2(
            IdentId::get_id("alias_method"),
            class.get(),
            Value::symbol_from_str("an_alias"),
            Value::symbol(orig),
        )
        .unwrap();
        assert_eq!(
            Value::integer(1),
            vm.send0(IdentId::get_id("an_alias"), obj).unwrap()
        );
    }

    #[test]
    fn private_on_inherited_method_is_scoped_to_the_subclass() {
        let (mut vm, class, obj) = new_object_with_class();
        vm.send1(
            IdentId::get_id("private"),
            class.get(),
            Value::symbol(IdentId::HASH),
        )
        .unwrap();
        // Instances of the subclass lost public access...
        let err = vm.send0(IdentId::HASH, obj).unwrap_err();
        assert!(err.is_kind(RuntimeErrKind::NoMethod));
        // ...but the defining class and its other descendants keep it.
        let other = Value::ordinary_object(BuiltinClass::object());
        assert!(vm.send0(IdentId::HASH, other).is_ok());
        let sibling = Value::ordinary_object(Module::class_under_object());
        assert!(vm.send0(IdentId::HASH, sibling).is_ok());
    }

    #[test]
    fn alias_visibility_is_independent_of_the_original() {
        let (mut vm, class, obj) = new_object_with_class();
        fn value(_: &mut VM, _: Value, _: &Args) -> VMResult {
            Ok(Value::integer(7))
        }
        let orig = IdentId::get_id("visible_one");
        vm.globals.define_method(
            class,
            orig,
            MethodInfo::native(orig, value, ParamsDesc::fixed(0)),
        );
        vm.send2(
            IdentId::get_id("alias_method"),
            class.get(),
            Value::symbol_from_str("veiled_one"),
            Value::symbol(orig),
        )
        .unwrap();
        vm.send1(
            IdentId::get_id("private"),
            class.get(),
            Value::symbol_from_str("veiled_one"),
        )
        .unwrap();
        // The alias is private now, the original stays reachable.
        let err = vm
            .send0(IdentId::get_id("veiled_one"), obj)
            .unwrap_err();
        assert!(err.is_kind(RuntimeErrKind::NoMethod));
        assert_eq!(Value::integer(7), vm.send0(orig, obj).unwrap());
    }

    #[test]
    fn attr_accessor_defines_reader_and_writer() {
        let (mut vm, class, obj) = new_object_with_class();
        vm.send1(
            IdentId::get_id("attr_accessor"),
            class.get(),
            Value::symbol_from_str("payload"),
        )
        .unwrap();
        vm.send1(
            IdentId::get_id("payload="),
            obj,
            Value::integer(42),
        )
        .unwrap();
        assert_eq!(
            Value::integer(42),
            vm.send0(IdentId::get_id("payload"), obj).unwrap()
        );
    }

    #[test]
    fn ancestors_lists_the_chain() {
        let (mut vm, class, _) = new_object_with_class();
        let ary = vm
            .send0(IdentId::get_id("ancestors"), class.get())
            .unwrap();
        let elements = &ary.as_array().unwrap().elements;
        assert!(elements.len() >= 2);
        assert_eq!(class.get().id(), elements[0].id());
    }
}
