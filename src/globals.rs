use crate::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

mod method;
pub use method::*;

///
/// Process-wide runtime state: the method repository, the regexp compile
/// cache and counters, the boot-time options and the cancellation flag.
///
#[derive(Debug)]
pub struct Globals {
    pub options: RuntimeOptions,
    pub methods: MethodRepo,
    pub regexp_cache: FxHashMap<RegexpCacheKey, Rc<SlowMatcher>>,
    pub regexp_stats: RegexpStats,
    /// Honored at safepoints and inside matcher loops.
    pub interrupt: Arc<AtomicBool>,
    pub main_object: Value,
}

pub type GlobalsRef = Ref<Globals>;

impl GlobalsRef {
    pub fn new_globals(options: RuntimeOptions) -> Self {
        Ref::new(Globals::new(options))
    }
}

impl Globals {
    fn new(options: RuntimeOptions) -> Self {
        assert!(options.validate().is_ok(), "Invalid runtime options.");
        BuiltinClass::ensure_init();
        let object = BuiltinClass::object();
        let main_object = Value::ordinary_object(object);
        main_object.set_var(IdentId::_NAME, Value::string("main"));
        Globals {
            options,
            methods: MethodRepo::new(),
            regexp_cache: FxHashMap::default(),
            regexp_stats: RegexpStats::default(),
            interrupt: Arc::new(AtomicBool::new(false)),
            main_object,
        }
    }
}

//------------------------------------------------------------

///
/// The Object/Module/Class triangle, built before anything else can
/// exist.
///
#[derive(Debug, Clone, Copy)]
pub struct EssentialClass {
    pub class: Module,
    pub module: Module,
    pub object: Module,
}

impl EssentialClass {
    fn new() -> Self {
        let basic_class = ClassInfo::class_from(None::<Module>);
        let basic = Module::bootstrap_class(basic_class);
        let object = Module::bootstrap_class(ClassInfo::class_from(basic));
        let module = Module::bootstrap_class(ClassInfo::class_from(object));
        let class = Module::bootstrap_class(ClassInfo::class_from(module));

        basic.set_class(class);
        object.set_class(class);
        module.set_class(class);
        class.set_class(class);

        object.real_module().register_dependent(module);
        module.real_module().register_dependent(class);
        basic.real_module().register_dependent(object);

        let mut basic = basic;
        basic.set_name(IdentId::get_id("BasicObject"));
        let mut object = object;
        object.set_name(IdentId::OBJECT);
        let mut module = module;
        module.set_name(IdentId::get_id("Module"));
        let mut class = class;
        class.set_name(IdentId::get_id("Class"));

        EssentialClass {
            class,
            module,
            object,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuiltinClass {
    pub integer: Value,
    pub float: Value,
    pub symbol: Value,
    pub string: Value,
    pub array: Value,
    pub hash: Value,
    pub regexp: Value,
    pub matchdata: Value,
    pub procobj: Value,
    pub method: Value,
    pub exception: Value,
    pub nilclass: Value,
    pub trueclass: Value,
    pub falseclass: Value,
}

thread_local!(
    static ESSENTIALS: EssentialClass = EssentialClass::new();
    static BUILTINS: RefCell<Option<BuiltinClass>> = RefCell::new(None);
);

impl BuiltinClass {
    /// Build the core classes for this thread if they do not exist yet.
    pub(crate) fn ensure_init() {
        let ready = BUILTINS.with(|b| b.borrow().is_some());
        if ready {
            return;
        }
        let object = BuiltinClass::object();
        macro_rules! class_under_object {
            ($name:expr) => {{
                let mut class = Module::class_under(object);
                class.set_name(IdentId::get_id($name));
                class.get()
            }};
        }
        let builtins = BuiltinClass {
            integer: class_under_object!("Integer"),
            float: class_under_object!("Float"),
            symbol: class_under_object!("Symbol"),
            string: class_under_object!("String"),
            array: class_under_object!("Array"),
            hash: class_under_object!("Hash"),
            regexp: class_under_object!("Regexp"),
            matchdata: class_under_object!("MatchData"),
            procobj: class_under_object!("Proc"),
            method: class_under_object!("Method"),
            exception: class_under_object!("Exception"),
            nilclass: class_under_object!("NilClass"),
            trueclass: class_under_object!("TrueClass"),
            falseclass: class_under_object!("FalseClass"),
        };
        BUILTINS.with(|b| *b.borrow_mut() = Some(builtins));
    }

    fn with(f: impl FnOnce(&BuiltinClass) -> Value) -> Module {
        BuiltinClass::ensure_init();
        BUILTINS
            .with(|b| f(b.borrow().as_ref().expect("BuiltinClass is not initialized.")))
            .into_module()
    }

    pub fn object() -> Module {
        ESSENTIALS.with(|m| m.object)
    }

    pub fn class() -> Module {
        ESSENTIALS.with(|m| m.class)
    }

    pub fn module() -> Module {
        ESSENTIALS.with(|m| m.module)
    }

    pub fn integer() -> Module {
        Self::with(|b| b.integer)
    }

    pub fn float() -> Module {
        Self::with(|b| b.float)
    }

    pub fn symbol() -> Module {
        Self::with(|b| b.symbol)
    }

    pub fn string() -> Module {
        Self::with(|b| b.string)
    }

    pub fn array() -> Module {
        Self::with(|b| b.array)
    }

    pub fn hash() -> Module {
        Self::with(|b| b.hash)
    }

    pub fn regexp() -> Module {
        Self::with(|b| b.regexp)
    }

    pub fn matchdata() -> Module {
        Self::with(|b| b.matchdata)
    }

    pub fn procobj() -> Module {
        Self::with(|b| b.procobj)
    }

    pub fn method() -> Module {
        Self::with(|b| b.method)
    }

    pub fn exception() -> Module {
        Self::with(|b| b.exception)
    }

    pub fn nilclass() -> Module {
        Self::with(|b| b.nilclass)
    }

    pub fn trueclass() -> Module {
        Self::with(|b| b.trueclass)
    }

    pub fn falseclass() -> Module {
        Self::with(|b| b.falseclass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn essential_triangle() {
        let object = BuiltinClass::object();
        let class = BuiltinClass::class();
        let module = BuiltinClass::module();
        assert_eq!("Object", object.name());
        assert_eq!("Class", class.name());
        assert_eq!("Module", module.name());
        // Class is an instance of itself.
        assert_eq!(class.id(), class.class().id());
        assert_eq!(Some(module), class.superclass());
        assert_eq!(Some(object), module.superclass());
    }

    #[test]
    fn builtin_classes_resolve() {
        let integer = BuiltinClass::integer();
        assert_eq!("Integer", integer.name());
        assert_eq!(Some(BuiltinClass::object()), integer.superclass());
        assert_eq!("Integer", Value::integer(1).get_class_name());
        assert_eq!("Symbol", Value::symbol_from_str("s").get_class_name());
        assert_eq!("NilClass", Value::nil().get_class_name());
    }
}
