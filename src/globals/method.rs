use crate::*;
use std::num::NonZeroU32;

///
/// An id of an internal method, indexing MethodRepo.
///
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FnId(NonZeroU32);

impl std::fmt::Debug for FnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FnId({})", self.0.get())
    }
}

impl FnId {
    fn new(id: u32) -> Self {
        FnId(NonZeroU32::new(id).expect("FnId can not be 0."))
    }

    #[inline(always)]
    pub fn as_usize(self) -> usize {
        self.0.get() as usize
    }
}

pub type BuiltinFunc = fn(vm: &mut VM, self_val: Value, args: &Args) -> VMResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
    Protected,
    ModuleFunction,
}

///
/// Formal-parameter descriptor of an internal method.
///
#[derive(Debug, Clone, Default)]
pub struct ParamsDesc {
    pub req: usize,
    pub opt: usize,
    pub rest: bool,
    pub keyword: Vec<IdentId>,
    pub kwrest: bool,
    pub block: bool,
}

impl ParamsDesc {
    pub fn fixed(req: usize) -> Self {
        ParamsDesc {
            req,
            ..ParamsDesc::default()
        }
    }

    pub fn variadic() -> Self {
        ParamsDesc {
            rest: true,
            ..ParamsDesc::default()
        }
    }

    pub fn check_arity(&self, given: usize) -> Result<(), RubyError> {
        if self.rest {
            if given < self.req {
                return Err(RubyError::argument(format!(
                    "Wrong number of arguments. (given {}, expected {}+)",
                    given, self.req
                )));
            }
            return Ok(());
        }
        if given < self.req || given > self.req + self.opt {
            if self.opt == 0 {
                return Err(RubyError::argument_wrong(given, self.req));
            }
            return Err(RubyError::argument_wrong_range(
                given,
                self.req,
                self.req + self.opt,
            ));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub enum MethodBody {
    /// A method defined in Rust.
    Native(BuiltinFunc),
    AttrReader(IdentId),
    AttrWriter(IdentId),
    Void,
}

impl std::fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodBody::Native(_) => write!(f, "Native"),
            MethodBody::AttrReader(id) => write!(f, "AttrReader {:?}", id),
            MethodBody::AttrWriter(id) => write!(f, "AttrWriter {:?}", id),
            MethodBody::Void => write!(f, "Void"),
        }
    }
}

///
/// An internal method record.
///
#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// The module whose table declares this method. Set on registration.
    pub owner: Module,
    pub name: IdentId,
    pub params: ParamsDesc,
    pub visibility: Visibility,
    pub body: MethodBody,
    /// Marks `undef_method` tombstones; lookup reports "missing".
    pub undefined: bool,
    /// Inline-time hint: the call target should be cloned per call site.
    pub always_clone: bool,
}

impl Default for MethodInfo {
    fn default() -> Self {
        MethodInfo {
            owner: Module::default(),
            name: IdentId::_NAME,
            params: ParamsDesc::default(),
            visibility: Visibility::Public,
            body: MethodBody::Void,
            undefined: false,
            always_clone: false,
        }
    }
}

impl MethodInfo {
    pub fn native(name: IdentId, func: BuiltinFunc, params: ParamsDesc) -> Self {
        MethodInfo {
            owner: Module::default(),
            name,
            params,
            visibility: Visibility::Public,
            body: MethodBody::Native(func),
            undefined: false,
            always_clone: false,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_always_clone(mut self) -> Self {
        self.always_clone = true;
        self
    }

    fn undefined_marker(name: IdentId) -> Self {
        MethodInfo {
            name,
            undefined: true,
            ..MethodInfo::default()
        }
    }
}

///
/// Global method store.
///
/// Holds every internal method, plus a process-wide lookup cache keyed
/// by (receiver class, name) and validated by the class's assumption
/// epoch.
///
#[derive(Debug)]
pub struct MethodRepo {
    table: Vec<MethodInfo>,
    m_cache: MethodCache,
}

impl std::ops::Index<FnId> for MethodRepo {
    type Output = MethodInfo;
    #[inline(always)]
    fn index(&self, id: FnId) -> &MethodInfo {
        &self.table[id.as_usize()]
    }
}

impl std::ops::IndexMut<FnId> for MethodRepo {
    #[inline(always)]
    fn index_mut(&mut self, id: FnId) -> &mut MethodInfo {
        &mut self.table[id.as_usize()]
    }
}

impl MethodRepo {
    pub(crate) fn new() -> Self {
        Self {
            // Slot 0 is a dummy so FnId stays non-zero.
            table: vec![MethodInfo::default()],
            m_cache: MethodCache::new(),
        }
    }

    pub(crate) fn add(&mut self, info: MethodInfo) -> FnId {
        self.table.push(info);
        FnId::new((self.table.len() - 1) as u32)
    }

    /// Cached full lookup for (class, name).
    ///
    /// A cache entry is valid only while the class's assumption epoch is
    /// unchanged; a stale entry misses and re-resolves by scanning the
    /// class chain.
    pub fn find_method(&mut self, rec_class: Module, name: IdentId) -> Option<(FnId, Module)> {
        let cur_epoch = rec_class.epoch();
        if let Some(entry) = self.m_cache.get_entry(rec_class, cur_epoch, name) {
            return self.filter_undefined(entry);
        }
        match rec_class.search_method(name) {
            Some((fid, owner)) => {
                self.m_cache.add_entry(rec_class, name, cur_epoch, fid, owner);
                self.filter_undefined((fid, owner))
            }
            None => None,
        }
    }

    fn filter_undefined(&self, entry: (FnId, Module)) -> Option<(FnId, Module)> {
        if self[entry.0].undefined {
            None
        } else {
            Some(entry)
        }
    }

    pub fn find_method_from_receiver(
        &mut self,
        receiver: Value,
        name: IdentId,
    ) -> Option<(FnId, Module)> {
        let rec_class = receiver.get_class_for_method();
        self.find_method(rec_class, name)
    }
}

///
/// Global method cache.
///
/// Entries carry the epoch snapshot they were resolved under.
///
#[derive(Debug)]
struct MethodCache {
    cache: FxHashMap<(u64, IdentId), MethodCacheEntry>,
}

#[derive(Debug, Clone)]
struct MethodCacheEntry {
    fid: FnId,
    owner: Module,
    epoch: u32,
}

impl MethodCache {
    fn new() -> Self {
        MethodCache {
            cache: FxHashMap::default(),
        }
    }

    fn add_entry(&mut self, class: Module, name: IdentId, epoch: u32, fid: FnId, owner: Module) {
        self.cache
            .insert((class.id(), name), MethodCacheEntry { fid, owner, epoch });
    }

    fn get_entry(&self, class: Module, cur_epoch: u32, name: IdentId) -> Option<(FnId, Module)> {
        let MethodCacheEntry { fid, owner, epoch } = self.cache.get(&(class.id(), name))?;
        if cur_epoch == *epoch {
            Some((*fid, *owner))
        } else {
            None
        }
    }
}

//----------------------------------------------------------------------------------

///
/// A bound or unbound method-procedure value.
///
#[derive(Debug, Clone)]
pub struct MethodObjInfo {
    pub name: IdentId,
    pub receiver: Option<Value>,
    pub method: FnId,
    pub owner: Module,
}

impl PartialEq for MethodObjInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.method == other.method
            && match (self.receiver, other.receiver) {
                (Some(r1), Some(r2)) => r1.id() == r2.id(),
                (None, None) => true,
                _ => false,
            }
    }
}

impl MethodObjInfo {
    pub(crate) fn new(name: IdentId, receiver: Value, method: FnId, owner: Module) -> Self {
        MethodObjInfo {
            name,
            receiver: Some(receiver),
            method,
            owner,
        }
    }
}

//----------------------------------------------------------------------------------

// Method registration.
impl Globals {
    /// Record `info` as `name` on `module`, bumping the module's epoch.
    pub fn define_method(&mut self, module: Module, name: IdentId, mut info: MethodInfo) -> FnId {
        let mut target = module.real_module();
        info.owner = target;
        info.name = name;
        let fid = self.methods.add(info);
        target.insert_method(name, fid);
        fid
    }

    /// Record a method on the singleton class of `obj`.
    pub fn define_singleton_method(
        &mut self,
        obj: Value,
        name: IdentId,
        info: MethodInfo,
    ) -> Option<FnId> {
        let singleton = obj.get_singleton_class()?;
        Some(self.define_method(singleton, name, info))
    }

    /// Mark `name` undefined on `module`: lookup stops there and reports
    /// "missing" instead of searching upward.
    pub fn undef_method(&mut self, module: Module, name: IdentId) {
        let mut info = MethodInfo::undefined_marker(name);
        info.owner = module.real_module();
        let fid = self.methods.add(info);
        module.real_module().insert_method(name, fid);
    }

    /// Remove `name` from `module`'s own table; lookup resumes searching
    /// the chain.
    pub fn remove_method(&mut self, module: Module, name: IdentId) -> bool {
        module.real_module().remove_method(name).is_some()
    }

    /// `alias_method`: a second name for the method `orig_name` resolves
    /// to. The record is copied into `module`'s own table, so a later
    /// visibility change on one name can not leak to the other.
    pub fn alias_method(
        &mut self,
        module: Module,
        new_name: IdentId,
        orig_name: IdentId,
    ) -> Result<(), RubyError> {
        let fid = self.resolve_defined(module, orig_name)?;
        let mut target = module.real_module();
        let mut info = self.methods[fid].clone();
        info.owner = target;
        info.name = new_name;
        let alias_fid = self.methods.add(info);
        target.insert_method(new_name, alias_fid);
        Ok(())
    }

    /// Change the visibility `name` dispatches with from `module`.
    ///
    /// A method declared by `module` itself is updated in place. An
    /// inherited method is first copied into `module`'s own table, so the
    /// change reaches neither the defining module nor sibling subclasses
    /// sharing its record.
    pub fn set_visibility(
        &mut self,
        module: Module,
        name: IdentId,
        visibility: Visibility,
    ) -> Result<(), RubyError> {
        let fid = self.resolve_defined(module, name)?;
        let mut target = module.real_module();
        if self.methods[fid].owner.id() == target.id() {
            self.methods[fid].visibility = visibility;
            // Visibility participates in lookup results.
            target.bump_epoch();
        } else {
            let mut info = self.methods[fid].clone();
            info.owner = target;
            info.visibility = visibility;
            let new_fid = self.methods.add(info);
            target.insert_method(name, new_fid);
        }
        Ok(())
    }

    fn resolve_defined(&self, module: Module, name: IdentId) -> Result<FnId, RubyError> {
        match module.search_method(name) {
            Some((fid, _)) if !self.methods[fid].undefined => Ok(fid),
            _ => Err(RubyError::undefined_method_for_class(name, module)),
        }
    }

    pub fn define_attr_reader(&mut self, module: Module, name: IdentId) -> FnId {
        let info = MethodInfo {
            body: MethodBody::AttrReader(name),
            params: ParamsDesc::fixed(0),
            ..MethodInfo::default()
        };
        self.define_method(module, name, info)
    }

    pub fn define_attr_writer(&mut self, module: Module, name: IdentId) -> FnId {
        let setter = IdentId::add_postfix(name, "=");
        let info = MethodInfo {
            body: MethodBody::AttrWriter(name),
            params: ParamsDesc::fixed(1),
            ..MethodInfo::default()
        };
        self.define_method(module, setter, info)
    }
}
