use crate::*;

pub type MethodTable = FxIndexMap<IdentId, FnId>;
pub type ClassRef = Ref<ClassExt>;

///
/// Wrapper struct for Module/Class object.
///
/// This type automatically dereferences ClassInfo.
/// Use into(self) to get inner Value.
///
#[derive(Clone, Copy)]
pub struct Module(Value);

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::cmp::PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl std::cmp::Eq for Module {}

impl std::ops::Deref for Module {
    type Target = ClassInfo;
    fn deref(&self) -> &Self::Target {
        self.0.as_class()
    }
}

impl std::ops::DerefMut for Module {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut_class()
    }
}

impl std::hash::Hash for Module {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl From<Module> for Value {
    fn from(m: Module) -> Value {
        m.0
    }
}

impl Module {
    /// Construct new Module from `val`.
    ///
    /// ### Panics
    /// panics if `val` is neither Class nor Module.
    pub fn new(mut val: Value) -> Self {
        val.as_mut_class();
        Module(val)
    }

    /// Construct new Module from `val` without checking whether it is
    /// Class/Module.
    pub(crate) fn new_unchecked(val: Value) -> Self {
        Module(val)
    }

    /// Construct new dummy Module.
    pub(crate) fn default() -> Self {
        Module(Value::nil())
    }

    /// Get inner `Value`.
    pub(crate) fn get(self) -> Value {
        self.0
    }

    #[inline(always)]
    pub fn id(self) -> u64 {
        self.0.id()
    }

    /// Get a class of `self`.
    pub(crate) fn class(&self) -> Module {
        self.get().rvalue().class()
    }

    pub(crate) fn set_class(self, class: Module) {
        self.get().rvalue_mut().set_class(class)
    }

    /// Get a real module of `self`.
    /// If `self` is an included-module proxy, return its origin.
    pub fn real_module(&self) -> Module {
        if self.is_included() {
            self.origin().unwrap()
        } else {
            *self
        }
    }

    pub fn name(&self) -> String {
        match self.ext.name {
            Some(id) => IdentId::get_name(id),
            None => {
                if self.is_singleton() {
                    match self.singleton_for() {
                        Some(target) => format!("#<Class:{}>", target.get_class_name()),
                        None => format!("#<Class:0x{:016x}>", self.id()),
                    }
                } else if self.is_module() {
                    format!("#<Module:0x{:016x}>", self.id())
                } else {
                    format!("#<Class:0x{:016x}>", self.id())
                }
            }
        }
    }

    /// Check whether `target_module` exists in the ancestors of `self`.
    pub fn include_module_p(&self, target_module: Module) -> bool {
        let mut module = *self;
        loop {
            if module.real_module().id() == target_module.real_module().id() {
                return true;
            };
            match module.upper() {
                Some(upper) => module = upper,
                None => break,
            }
        }
        false
    }

    /// Prepend an included-module proxy for `module` above `self`.
    ///
    /// The proxy shares the module's method table and epoch, so mutations
    /// on the module are seen through every class that includes it.
    pub fn append_include(&mut self, module: Module) {
        let superclass = self.upper();
        let proxy = module.generate_included();
        proxy.get().as_mut_class().upper = superclass;
        self.0.as_mut_class().upper = Some(proxy);
        // Table mutations on the module must reach this class's caches.
        module.real_module().register_dependent(*self);
        self.bump_epoch();
    }

    fn generate_included(&self) -> Module {
        let origin = self.real_module();
        let mut info = self.get().as_class().clone_for_include();
        info.flags.set_included();
        let mut ext = info.ext();
        ext.origin = Some(origin);
        Module::new_unchecked(RValue::new_class(info).pack())
    }

    /// Get method for a `name` for a receiver whose class is `self`,
    /// without consulting any cache. Returns the method and its owner.
    pub fn search_method(self, name: IdentId) -> Option<(FnId, Module)> {
        let mut class = self;
        let mut singleton_flag = self.is_singleton();
        loop {
            match class.get_instance_method(name) {
                Some(fid) => {
                    return Some((fid, class.real_module()));
                }
                None => match class.upper() {
                    Some(superclass) => class = superclass,
                    None => {
                        if singleton_flag {
                            singleton_flag = false;
                            class = self.class();
                        } else {
                            return None;
                        }
                    }
                },
            };
        }
    }

    /// Find method `name` in the method table of `self` only.
    pub fn get_instance_method(&self, name: IdentId) -> Option<FnId> {
        self.ext.method_table.get(&name).cloned()
    }

    /// Record `fid` under `name`, bumping the assumption epoch of this
    /// module and of everything that depends on it.
    pub(crate) fn insert_method(&mut self, name: IdentId, fid: FnId) -> Option<FnId> {
        let mut ext = self.ext();
        let old = ext.method_table.insert(name, fid);
        self.bump_epoch();
        old
    }

    pub(crate) fn remove_method(&mut self, name: IdentId) -> Option<FnId> {
        let mut ext = self.ext();
        let removed = ext.method_table.shift_remove(&name);
        self.bump_epoch();
        removed
    }

    /// The current assumption epoch.
    #[inline(always)]
    pub fn epoch(&self) -> u32 {
        self.ext.epoch
    }

    /// Invalidate every cache entry that embeds this module's epoch, and
    /// transitively the epoch of dependent modules.
    pub(crate) fn bump_epoch(&self) {
        let mut ext = self.ext;
        ext.epoch = ext.epoch.wrapping_add(1);
        let dependents = ext.dependents.clone();
        for dep in dependents {
            dep.bump_epoch();
        }
    }

    pub(crate) fn register_dependent(&self, dependent: Module) {
        let mut ext = self.ext;
        if ext
            .dependents
            .iter()
            .any(|m| m.id() == dependent.id())
        {
            return;
        }
        ext.dependents.push(dependent);
    }

    /// Get the singleton class of `self`, creating it on first use.
    pub fn get_singleton_class(self) -> Module {
        self.get().get_singleton_class().unwrap()
    }

    pub(crate) fn set_name(&mut self, name: IdentId) {
        let mut ext = self.ext();
        ext.name = Some(name);
    }
}

impl Module {
    fn new_class(cinfo: ClassInfo) -> Module {
        assert!(!cinfo.is_module());
        let obj = RValue::new_class(cinfo).pack();
        let class = Module::new_unchecked(obj);
        if let Some(upper) = class.upper() {
            upper.real_module().register_dependent(class);
        }
        class
    }

    /// An ordinary class under `superclass`.
    pub fn class_under(superclass: impl Into<Option<Module>>) -> Module {
        Module::new_class(ClassInfo::class_from(superclass))
    }

    pub fn class_under_object() -> Module {
        Module::class_under(BuiltinClass::object())
    }

    /// A plain module (no superclass).
    pub fn module_new() -> Module {
        let cinfo = ClassInfo::module_from(None::<Module>);
        let obj = RValue::new_module(cinfo).pack();
        Module::new_unchecked(obj)
    }

    /// Used while boot-strapping the Object/Module/Class triangle, before
    /// the metaclasses exist.
    pub(crate) fn bootstrap_class(cinfo: ClassInfo) -> Module {
        let obj = RValue::new(Module::default(), ObjKind::Module(cinfo)).pack();
        Module::new_unchecked(obj)
    }
}

impl Value {
    /// Get the singleton class of `self`, creating it on first use and
    /// splicing it into the class chain.
    ///
    /// Return None when `self` can not have a singleton class (packed
    /// values).
    pub(crate) fn get_singleton_class(self) -> Option<Module> {
        match self.as_rvalue() {
            Some(rvalue) => {
                let class = rvalue.class();
                if class.is_singleton() {
                    return Some(class);
                }
                let singleton = match &rvalue.kind {
                    ObjKind::Module(cinfo) => {
                        let superclass = match cinfo.upper {
                            None => None,
                            Some(upper) => Some(upper.get_singleton_class()),
                        };
                        ClassInfo::singleton_from(superclass.or(Some(class)), self)
                    }
                    ObjKind::Invalid => {
                        unreachable!("Invalid rvalue. {:?}", rvalue)
                    }
                    _ => ClassInfo::singleton_from(class, self),
                };
                let singleton = Module::new_class(singleton);
                singleton.set_class(class.class());
                self.rvalue_mut().set_class(singleton);
                // Caches keyed on the old class must re-resolve through the
                // singleton from now on.
                singleton.register_dependent_chain();
                class.bump_epoch();
                Some(singleton)
            }
            None => None,
        }
    }
}

impl Module {
    fn register_dependent_chain(self) {
        if let Some(upper) = self.upper() {
            upper.real_module().register_dependent(self);
        }
    }
}

//------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassFlags(u8);

const IS_MODULE: u8 = 1 << 0;
const IS_SINGLETON: u8 = 1 << 1;
const IS_INCLUDED: u8 = 1 << 2;

impl ClassFlags {
    fn new(is_module: bool) -> Self {
        ClassFlags(if is_module { IS_MODULE } else { 0 })
    }

    fn is_module(&self) -> bool {
        self.0 & IS_MODULE != 0
    }

    fn is_singleton(&self) -> bool {
        self.0 & IS_SINGLETON != 0
    }

    fn is_included(&self) -> bool {
        self.0 & IS_INCLUDED != 0
    }

    fn set_singleton(&mut self) {
        self.0 |= IS_SINGLETON;
    }

    pub(crate) fn set_included(&mut self) {
        self.0 |= IS_INCLUDED;
    }
}

///
/// Class or module metadata.
///
#[derive(Debug, Clone)]
pub struct ClassInfo {
    upper: Option<Module>,
    flags: ClassFlags,
    ext: ClassRef,
}

#[derive(Debug)]
pub struct ClassExt {
    pub(crate) name: Option<IdentId>,
    pub(crate) method_table: MethodTable,
    /// Assumption epoch. Monotonic; bumped on every table mutation, here
    /// and transitively in `dependents`.
    pub(crate) epoch: u32,
    /// Modules whose lookup results can embed this table: subclasses,
    /// includers and singletons downstream of it.
    pub(crate) dependents: Vec<Module>,
    pub(crate) origin: Option<Module>,
    pub(crate) singleton_for: Option<Value>,
}

impl ClassExt {
    fn new() -> Self {
        ClassExt {
            name: None,
            method_table: FxIndexMap::default(),
            epoch: 0,
            dependents: vec![],
            origin: None,
            singleton_for: None,
        }
    }

    fn new_singleton(target: Value) -> Self {
        let mut ext = ClassExt::new();
        ext.singleton_for = Some(target);
        ext
    }
}

impl ClassInfo {
    fn new(is_module: bool, superclass: impl Into<Option<Module>>, ext: ClassExt) -> Self {
        ClassInfo {
            upper: superclass.into(),
            flags: ClassFlags::new(is_module),
            ext: ClassRef::new(ext),
        }
    }

    pub(crate) fn class_from(superclass: impl Into<Option<Module>>) -> Self {
        Self::new(false, superclass, ClassExt::new())
    }

    pub(crate) fn module_from(superclass: impl Into<Option<Module>>) -> Self {
        Self::new(true, superclass, ClassExt::new())
    }

    pub(crate) fn singleton_from(
        superclass: impl Into<Option<Module>>,
        target: impl Into<Value>,
    ) -> Self {
        let mut info = Self::new(false, superclass, ClassExt::new_singleton(target.into()));
        info.flags.set_singleton();
        info
    }

    /// A proxy clone sharing the method table and epoch of `self`.
    pub(crate) fn clone_for_include(&self) -> ClassInfo {
        ClassInfo {
            upper: self.upper,
            flags: self.flags,
            ext: self.ext,
        }
    }

    /// Clone with a private table copy. Used by `dup`-like paths.
    pub(crate) fn shallow_dup(&self) -> ClassInfo {
        ClassInfo {
            upper: self.upper,
            flags: self.flags,
            ext: ClassRef::new(ClassExt {
                name: self.ext.name,
                method_table: self.ext.method_table.clone(),
                epoch: 0,
                dependents: vec![],
                origin: self.ext.origin,
                singleton_for: self.ext.singleton_for,
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.ext.id()
    }

    /// Get an upper module/class of `self`.
    ///
    /// If `self` has no upper module/class, return None.
    pub fn upper(&self) -> Option<Module> {
        self.upper
    }

    /// Get superclass of `self`, skipping included-module proxies.
    pub fn superclass(&self) -> Option<Module> {
        let mut m = self.upper?;
        loop {
            if !m.is_included() {
                return Some(m);
            };
            m = m.upper()?;
        }
    }

    pub fn is_singleton(&self) -> bool {
        self.flags.is_singleton()
    }

    pub fn is_module(&self) -> bool {
        self.flags.is_module()
    }

    pub fn is_included(&self) -> bool {
        self.flags.is_included()
    }

    pub(crate) fn origin(&self) -> Option<Module> {
        self.ext.origin
    }

    pub(crate) fn singleton_for(&self) -> Option<Value> {
        self.ext.singleton_for
    }

    pub(crate) fn method_names(&self) -> Vec<IdentId> {
        self.ext.method_table.keys().cloned().collect()
    }

    pub(crate) fn ext(&self) -> ClassRef {
        self.ext
    }
}
