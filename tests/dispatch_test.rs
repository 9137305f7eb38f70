extern crate corundum;
use corundum::*;

fn ret_1(_: &mut VM, _: Value, _: &Args) -> VMResult {
    Ok(Value::integer(1))
}

fn ret_2(_: &mut VM, _: Value, _: &Args) -> VMResult {
    Ok(Value::integer(2))
}

fn define(vm: &mut VM, class: Module, name: &str, func: BuiltinFunc) -> IdentId {
    let id = IdentId::get_id(name);
    vm.globals
        .define_method(class, id, MethodInfo::native(id, func, ParamsDesc::variadic()));
    id
}

#[test]
fn inline_cache_resolves_once_then_invalidate() {
    let mut vm = VM::new();
    let class = Module::class_under_object();
    let m = define(&mut vm, class, "m", ret_1);
    let obj = Value::ordinary_object(class);

    let mut site = CallSite::public(m);
    for _ in 0..100 {
        let res = vm.dispatch(&mut site, obj, &Args::new0(), None).unwrap();
        assert_eq!(Value::integer(1), res);
    }
    // One resolution served all one hundred calls.
    assert_eq!(1, site.full_lookup_count());

    // Redefinition bumps the epoch; the stale entry misses.
    vm.globals
        .define_method(class, m, MethodInfo::native(m, ret_2, ParamsDesc::variadic()));
    let res = vm.dispatch(&mut site, obj, &Args::new0(), None).unwrap();
    assert_eq!(Value::integer(2), res);
    assert_eq!(2, site.full_lookup_count());
}

#[test]
fn lookup_is_stable_without_mutation() {
    let mut vm = VM::new();
    let class = Module::class_under_object();
    let m = define(&mut vm, class, "stable", ret_1);
    let first = vm.globals.methods.find_method(class, m).unwrap();
    for _ in 0..10 {
        assert_eq!(Some(first), vm.globals.methods.find_method(class, m));
    }
}

#[test]
fn polymorphic_then_megamorphic() {
    let mut vm = VM::new();
    let m = IdentId::get_id("poly");
    let limit = vm.globals.options.dispatch_cache_limit;
    let mut objects = vec![];
    for _ in 0..limit + 2 {
        let class = Module::class_under_object();
        vm.globals
            .define_method(class, m, MethodInfo::native(m, ret_1, ParamsDesc::variadic()));
        objects.push(Value::ordinary_object(class));
    }
    let mut site = CallSite::public(m);
    for obj in &objects {
        vm.dispatch(&mut site, *obj, &Args::new0(), None).unwrap();
    }
    assert!(site.is_megamorphic());
    assert_eq!(limit, site.cached_entries());
    // Megamorphic sites still dispatch correctly.
    let res = vm
        .dispatch(&mut site, objects[0], &Args::new0(), None)
        .unwrap();
    assert_eq!(Value::integer(1), res);
}

#[test]
fn method_missing_scenario() {
    let mut vm = VM::new();
    let class = Module::class_under_object();
    let obj = Value::ordinary_object(class);
    let foo = IdentId::get_id("foo");
    let args = Args::new2(Value::integer(1), Value::integer(2));

    // Without method_missing: NoMethodError carrying name and args.
    let err = vm.send(foo, obj, &args).unwrap_err();
    assert!(err.is_kind(RuntimeErrKind::NoMethod));
    assert!(err.message().contains("foo"));
    assert_eq!(Some(foo), err.method_name);
    assert_eq!(
        Some(vec![Value::integer(1), Value::integer(2)]),
        err.call_args
    );

    // def obj.method_missing(name, *a) = [name, a]
    fn mm(_: &mut VM, _: Value, args: &Args) -> VMResult {
        let name = args[0];
        let rest = args.to_vec()[1..].to_vec();
        Ok(Value::array_from(vec![name, Value::array_from(rest)]))
    }
    vm.globals
        .define_singleton_method(
            obj,
            IdentId::_METHOD_MISSING,
            MethodInfo::native(IdentId::_METHOD_MISSING, mm, ParamsDesc::variadic()),
        )
        .unwrap();

    let res = vm.send(foo, obj, &args).unwrap();
    let expected = Value::array_from(vec![
        Value::symbol(foo),
        Value::array_from(vec![Value::integer(1), Value::integer(2)]),
    ]);
    assert_eq!(expected, res);
}

#[test]
fn return_missing_mode_yields_sentinel() {
    let mut vm = VM::new();
    let obj = Value::ordinary_object(BuiltinClass::object());
    let res = vm
        .send_if_responds(IdentId::get_id("absent"), obj, &Args::new0())
        .unwrap();
    assert!(res.is_missing());
}

#[test]
fn private_methods_require_implicit_self() {
    let mut vm = VM::new();
    let class = Module::class_under_object();
    let name = IdentId::get_id("hidden");
    vm.globals.define_method(
        class,
        name,
        MethodInfo::native(name, ret_1, ParamsDesc::variadic())
            .with_visibility(Visibility::Private),
    );
    let obj = Value::ordinary_object(class);

    let err = vm.send(name, obj, &Args::new0()).unwrap_err();
    assert!(err.is_kind(RuntimeErrKind::NoMethod));
    let res = vm.send_private(name, obj, &Args::new0()).unwrap();
    assert_eq!(Value::integer(1), res);
}

#[test]
fn protected_requires_kindred_caller() {
    let mut vm = VM::new();
    let class = Module::class_under_object();
    let name = IdentId::get_id("guarded");
    vm.globals.define_method(
        class,
        name,
        MethodInfo::native(name, ret_1, ParamsDesc::variadic())
            .with_visibility(Visibility::Protected),
    );
    let obj = Value::ordinary_object(class);
    let peer = Value::ordinary_object(class);
    let outsider = Value::ordinary_object(BuiltinClass::object());

    let mut site = CallSite::public(name);
    // A peer instance may call it.
    let res = vm.dispatch(&mut site, obj, &Args::new0(), Some(peer)).unwrap();
    assert_eq!(Value::integer(1), res);
    // An unrelated caller is told it is missing.
    let err = vm
        .dispatch(&mut site, obj, &Args::new0(), Some(outsider))
        .unwrap_err();
    assert!(err.is_kind(RuntimeErrKind::NoMethod));
}

#[test]
fn epoch_propagates_through_include() {
    let mut vm = VM::new();
    let mixin = Module::module_new();
    let name = IdentId::get_id("mixed_in");
    vm.globals
        .define_method(mixin, name, MethodInfo::native(name, ret_1, ParamsDesc::variadic()));
    let mut class = Module::class_under_object();
    class.append_include(mixin);
    let obj = Value::ordinary_object(class);

    let mut site = CallSite::public(name);
    assert_eq!(
        Value::integer(1),
        vm.dispatch(&mut site, obj, &Args::new0(), None).unwrap()
    );
    // Mutating the module's table must invalidate the entry cached
    // against the including class.
    vm.globals
        .define_method(mixin, name, MethodInfo::native(name, ret_2, ParamsDesc::variadic()));
    assert_eq!(
        Value::integer(2),
        vm.dispatch(&mut site, obj, &Args::new0(), None).unwrap()
    );
    assert_eq!(2, site.full_lookup_count());
}

#[test]
fn refinement_scope_is_ignored_by_method_missing() {
    let mut vm = VM::new();
    let refinement = Module::module_new();
    let name = IdentId::get_id("refined");
    vm.globals.define_method(
        refinement,
        name,
        MethodInfo::native(name, ret_2, ParamsDesc::variadic()),
    );
    let obj = Value::ordinary_object(BuiltinClass::object());

    // At a site with the refinement active, the refined method wins.
    let mut site = CallSite::public(name).with_refinements(vec![refinement]);
    assert_eq!(
        Value::integer(2),
        vm.dispatch(&mut site, obj, &Args::new0(), None).unwrap()
    );

    // A refinement defining method_missing is not consulted for the
    // missing path.
    let mm_refinement = Module::module_new();
    vm.globals.define_method(
        mm_refinement,
        IdentId::_METHOD_MISSING,
        MethodInfo::native(IdentId::_METHOD_MISSING, ret_2, ParamsDesc::variadic()),
    );
    let mut site =
        CallSite::public(IdentId::get_id("nonexistent")).with_refinements(vec![mm_refinement]);
    let err = vm.dispatch(&mut site, obj, &Args::new0(), None).unwrap_err();
    assert!(err.is_kind(RuntimeErrKind::NoMethod));
}

#[test]
fn singleton_method_shadows_class_method() {
    let mut vm = VM::new();
    let class = Module::class_under_object();
    let name = define(&mut vm, class, "shadowed", ret_1);
    let obj = Value::ordinary_object(class);
    let other = Value::ordinary_object(class);

    vm.globals
        .define_singleton_method(
            obj,
            name,
            MethodInfo::native(name, ret_2, ParamsDesc::variadic()),
        )
        .unwrap();
    assert_eq!(Value::integer(2), vm.send0(name, obj).unwrap());
    assert_eq!(Value::integer(1), vm.send0(name, other).unwrap());
}

#[test]
fn inline_hints_for_method_missing() {
    let mut vm = VM::new();
    let class = Module::class_under_object();
    let fid = vm.globals.define_method(
        class,
        IdentId::_METHOD_MISSING,
        MethodInfo::native(IdentId::_METHOD_MISSING, ret_1, ParamsDesc::variadic()),
    );
    let decision = vm.splitting_strategy(fid, false);
    assert!(decision.clone_target);
    assert!(decision.force_inline);

    let plain = vm.globals.define_method(
        class,
        IdentId::get_id("plain"),
        MethodInfo::native(IdentId::get_id("plain"), ret_1, ParamsDesc::variadic()),
    );
    let decision = vm.splitting_strategy(plain, false);
    assert!(!decision.clone_target);
    assert!(!decision.force_inline);
    // A caller that exposes its frame forces inlining regardless.
    assert!(vm.splitting_strategy(plain, true).force_inline);

    let marked = vm.globals.define_method(
        class,
        IdentId::get_id("marked"),
        MethodInfo::native(IdentId::get_id("marked"), ret_1, ParamsDesc::variadic())
            .with_always_clone(),
    );
    assert!(vm.splitting_strategy(marked, false).clone_target);
}

#[derive(Debug)]
struct Point {
    x: i64,
    y: i64,
}

impl ForeignObject for Point {
    fn read_member(&self, name: &str) -> Option<Value> {
        match name {
            "x" => Some(Value::integer(self.x)),
            "y" => Some(Value::integer(self.y)),
            _ => None,
        }
    }

    fn write_member(&mut self, name: &str, value: Value) -> Result<(), RubyError> {
        let i = value
            .as_fixnum()
            .ok_or_else(|| RubyError::wrong_type("Value", "Integer", value))?;
        match name {
            "x" => self.x = i,
            "y" => self.y = i,
            _ => return Err(RubyError::name(format!("unknown member {}", name))),
        }
        Ok(())
    }

    fn invoke_member(&mut self, name: &str, args: &[Value]) -> Option<VMResult> {
        match name {
            "sum" => {
                let extra: i64 = args.iter().filter_map(|v| v.as_fixnum()).sum();
                Some(Ok(Value::integer(self.x + self.y + extra)))
            }
            _ => None,
        }
    }
}

#[test]
fn foreign_receivers_route_to_the_adapter() {
    let mut vm = VM::new();
    let point = Value::foreign(Box::new(Point { x: 3, y: 4 }));

    // Member invocation.
    let res = vm
        .send1(IdentId::get_id("sum"), point, Value::integer(10))
        .unwrap();
    assert_eq!(Value::integer(17), res);
    // Member read via a zero-argument call.
    assert_eq!(Value::integer(3), vm.send0(IdentId::get_id("x"), point).unwrap());
    // Member write through the `=`-suffixed form.
    vm.send1(IdentId::get_id("y="), point, Value::integer(40)).unwrap();
    assert_eq!(Value::integer(40), vm.send0(IdentId::get_id("y"), point).unwrap());
    // Unknown members surface as NoMethodError.
    let err = vm.send0(IdentId::get_id("z"), point).unwrap_err();
    assert!(err.is_kind(RuntimeErrKind::NoMethod));
}

#[test]
fn interop_write_cache_respects_bound() {
    let mut vm = VM::new();
    let point = Value::foreign(Box::new(Point { x: 0, y: 0 }));
    let mut site = InteropWriteSite::new();
    let limit = vm.globals.options.interop_write_cache;
    for n in 0..limit + 4 {
        let name = if n % 2 == 0 { "x" } else { "y" };
        site.write(&mut vm, point, IdentId::get_id(name), Value::integer(n as i64))
            .unwrap();
    }
    assert!(site.cached_len() <= limit);
}

#[test]
fn symbol_proc_forwards_to_dispatch() {
    let mut vm = VM::new();
    let block = Block::Sym(IdentId::get_id("succ"));
    let res = vm.eval_block1(&block, Value::integer(10)).unwrap();
    assert_eq!(Value::integer(11), res);
}

#[test]
fn arity_violations_surface_as_argument_errors() {
    let mut vm = VM::new();
    let class = Module::class_under_object();
    let name = IdentId::get_id("two_args");
    vm.globals.define_method(
        class,
        name,
        MethodInfo::native(name, ret_1, ParamsDesc::fixed(2)),
    );
    let obj = Value::ordinary_object(class);
    let err = vm.send(name, obj, &Args::new1(Value::nil())).unwrap_err();
    assert!(err.is_kind(RuntimeErrKind::Argument));
    assert!(err.message().contains("given 1, expected 2"));
}
