use crate::*;
use std::sync::atomic::Ordering;

mod args;
mod dispatch;
mod interop;
pub use args::*;
pub use dispatch::*;
pub use interop::*;

pub type VMResult = Result<Value, RubyError>;
pub type VMRef = Ref<VM>;

///
/// The runtime's execution surface.
///
/// Owns the globals and provides the dispatch entry points the embedder
/// and the built-in method bodies go through.
///
#[derive(Debug)]
pub struct VM {
    pub globals: GlobalsRef,
}

impl VM {
    pub fn new() -> Self {
        VM::with_options(RuntimeOptions::default())
    }

    pub fn with_options(options: RuntimeOptions) -> Self {
        let globals = GlobalsRef::new_globals(options);
        let mut vm = VM { globals };
        builtin::init(&mut vm);
        vm
    }

    /// Cooperative safepoint: observe a pending cancellation request.
    pub fn check_interrupt(&self) -> Result<(), RubyError> {
        if self.globals.interrupt.load(Ordering::Relaxed) {
            return Err(RubyError::interrupt());
        }
        Ok(())
    }

    pub fn request_interrupt(&self) {
        self.globals.interrupt.store(true, Ordering::Relaxed);
    }

    pub fn clear_interrupt(&self) {
        self.globals.interrupt.store(false, Ordering::Relaxed);
    }
}

impl Default for VM {
    fn default() -> Self {
        VM::new()
    }
}

// Embedding API.
impl VM {
    /// Public dispatch; missing resolves through `method_missing` and
    /// finally raises NoMethodError.
    pub fn send(&mut self, name: IdentId, receiver: Value, args: &Args) -> VMResult {
        self.send_with_mode(name, receiver, args, DispatchMode::PUBLIC, None)
    }

    pub fn send0(&mut self, name: IdentId, receiver: Value) -> VMResult {
        self.send(name, receiver, &Args::new0())
    }

    pub fn send1(&mut self, name: IdentId, receiver: Value, arg0: Value) -> VMResult {
        self.send(name, receiver, &Args::new1(arg0))
    }

    pub fn send2(&mut self, name: IdentId, receiver: Value, arg0: Value, arg1: Value) -> VMResult {
        self.send(name, receiver, &Args::new2(arg0, arg1))
    }

    /// Tentative dispatch: returns the MISSING sentinel instead of
    /// raising.
    pub fn send_if_responds(&mut self, name: IdentId, receiver: Value, args: &Args) -> VMResult {
        self.send_with_mode(name, receiver, args, DispatchMode::PUBLIC_RETURN_MISSING, None)
    }

    /// Implicit-self dispatch; private methods are reachable.
    pub fn send_private(&mut self, name: IdentId, receiver: Value, args: &Args) -> VMResult {
        self.send_with_mode(name, receiver, args, DispatchMode::PRIVATE, Some(receiver))
    }

    pub fn respond_to(&mut self, receiver: Value, name: IdentId) -> bool {
        let rec_class = receiver.get_class_for_method();
        match self.globals.methods.find_method(rec_class, name) {
            Some((fid, _)) => {
                self.globals.methods[fid].visibility == Visibility::Public
                    || self.globals.methods[fid].visibility == Visibility::ModuleFunction
            }
            None => false,
        }
    }

    /// Uncached dispatch used by `send`-style reflective calls. Resolves
    /// through the global method cache.
    pub fn send_with_mode(
        &mut self,
        name: IdentId,
        receiver: Value,
        args: &Args,
        mode: DispatchMode,
        caller_self: Option<Value>,
    ) -> VMResult {
        self.check_interrupt()?;
        let rec_class = receiver.get_class_for_method();
        let resolved = self.globals.methods.find_method(rec_class, name);
        self.finish_dispatch(name, mode, resolved, receiver, args, caller_self)
    }

    /// Cached dispatch through a call site's inline cache.
    pub fn dispatch(
        &mut self,
        site: &mut CallSite,
        receiver: Value,
        args: &Args,
        caller_self: Option<Value>,
    ) -> VMResult {
        self.check_interrupt()?;
        let rec_class = receiver.get_class_for_method();
        let mut globals = self.globals;
        let resolved = site.resolve(&mut globals, rec_class);
        let (name, mode) = (site.name, site.mode);
        self.finish_dispatch(name, mode, resolved, receiver, args, caller_self)
    }

    fn finish_dispatch(
        &mut self,
        name: IdentId,
        mode: DispatchMode,
        resolved: Option<(FnId, Module)>,
        receiver: Value,
        args: &Args,
        caller_self: Option<Value>,
    ) -> VMResult {
        match resolved {
            Some((fid, _owner)) => {
                if !self.visibility_allows(fid, mode, caller_self) {
                    self.dispatch_missing(name, mode, receiver, args)
                } else {
                    self.invoke_method(fid, receiver, args)
                }
            }
            None => self.dispatch_missing(name, mode, receiver, args),
        }
    }

    fn visibility_allows(
        &self,
        fid: FnId,
        mode: DispatchMode,
        caller_self: Option<Value>,
    ) -> bool {
        let info = &self.globals.methods[fid];
        match info.visibility {
            Visibility::Public | Visibility::ModuleFunction => true,
            Visibility::Private => mode.visibility == VisProfile::Private,
            Visibility::Protected => match mode.visibility {
                VisProfile::Private => true,
                VisProfile::Public => {
                    caller_self.map_or(false, |s| s.kind_of(info.owner))
                }
            },
        }
    }

    fn dispatch_missing(
        &mut self,
        name: IdentId,
        mode: DispatchMode,
        receiver: Value,
        args: &Args,
    ) -> VMResult {
        match mode.missing {
            MissingBehavior::ReturnMissing => Ok(Value::missing()),
            MissingBehavior::CallMethodMissing => {
                if receiver.is_foreign() {
                    return self.call_foreign(receiver, name, args);
                }
                self.invoke_method_missing(name, receiver, args)
            }
        }
    }

    /// Re-dispatch `method_missing` with the name symbol prepended, block
    /// propagated. A MISSING result raises NoMethodError carrying the
    /// receiver, name and original arguments.
    fn invoke_method_missing(
        &mut self,
        name: IdentId,
        receiver: Value,
        args: &Args,
    ) -> VMResult {
        let new_args = args.prepend(Value::symbol(name));
        let res = self.send_with_mode(
            IdentId::_METHOD_MISSING,
            receiver,
            &new_args,
            DispatchMode::PRIVATE_RETURN_MISSING_IGNORE_REFINEMENTS,
            Some(receiver),
        )?;
        if res.is_missing() {
            Err(RubyError::undefined_method_with_args(
                name,
                receiver,
                args.to_vec(),
            ))
        } else {
            Ok(res)
        }
    }

    /// Route a call on a foreign receiver to the member of that name.
    fn call_foreign(&mut self, mut receiver: Value, name: IdentId, args: &Args) -> VMResult {
        let member = IdentId::get_name(name);
        let slice = args.to_vec();
        let res = match &mut receiver.as_mut_rvalue().unwrap().kind {
            ObjKind::Foreign(obj) => {
                if let Some(member_name) = member.strip_suffix('=') {
                    if slice.len() == 1 {
                        obj.write_member(member_name, slice[0])?;
                        return Ok(slice[0]);
                    }
                }
                match obj.invoke_member(&member, &slice) {
                    Some(res) => Some(res?),
                    None if slice.is_empty() => obj.read_member(&member),
                    None => None,
                }
            }
            _ => unreachable!("call_foreign: not a foreign receiver."),
        };
        match res {
            Some(val) => Ok(val),
            None => Err(RubyError::undefined_method_with_args(
                name,
                receiver,
                slice,
            )),
        }
    }

    fn invoke_method(&mut self, fid: FnId, receiver: Value, args: &Args) -> VMResult {
        let (body, params) = {
            let info = &self.globals.methods[fid];
            (info.body.clone(), info.params.clone())
        };
        params.check_arity(args.len())?;
        match body {
            MethodBody::Native(func) => func(self, receiver, args),
            MethodBody::AttrReader(id) => match receiver.as_rvalue() {
                Some(oref) => Ok(oref.get_var(id).unwrap_or_default()),
                None => Ok(Value::nil()),
            },
            MethodBody::AttrWriter(id) => {
                receiver.set_var(id, args[0]);
                Ok(args[0])
            }
            MethodBody::Void => unreachable!("invoke_method: Void body."),
        }
    }
}

// Blocks and symbol-procs.
impl VM {
    pub fn eval_block(&mut self, block: &Block, args: &Args) -> VMResult {
        match block {
            Block::Proc(proc_val) => self.eval_proc(*proc_val, args),
            Block::Sym(sym) => self.eval_sym_uncached(*sym, args),
        }
    }

    pub fn eval_block1(&mut self, block: &Block, arg0: Value) -> VMResult {
        self.eval_block(block, &Args::new1(arg0))
    }

    pub fn eval_proc(&mut self, proc_val: Value, args: &Args) -> VMResult {
        let pinfo = match &mut proc_val.rvalue_mut().kind {
            ObjKind::Proc(pinfo) => pinfo,
            _ => return Err(RubyError::wrong_type("Receiver", "Proc", proc_val)),
        };
        match &mut **pinfo {
            ProcInfo::Native { func } => {
                let func = *func;
                func(self, Value::nil(), args)
            }
            ProcInfo::Sym { site, .. } => {
                if args.is_empty() {
                    return Err(RubyError::argument("No receiver given."));
                }
                let receiver = args[0];
                let rest = args.shift();
                self.dispatch(site, receiver, &rest, None)
            }
        }
    }

    fn eval_sym_uncached(&mut self, sym: IdentId, args: &Args) -> VMResult {
        if args.is_empty() {
            return Err(RubyError::argument("No receiver given."));
        }
        let receiver = args[0];
        let rest = args.shift();
        self.send(sym, receiver, &rest)
    }
}

///
/// Hints the dispatch engine hands the host compiler about a call
/// target.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineDecision {
    pub clone_target: bool,
    pub force_inline: bool,
}

impl VM {
    /// `method_missing` is usually an indirection over another method, so
    /// its call target is cloned and inlined aggressively.
    pub fn splitting_strategy(&self, fid: FnId, needs_caller_frame: bool) -> InlineDecision {
        let info = &self.globals.methods[fid];
        let is_method_missing = info.name == IdentId::_METHOD_MISSING;
        let options = &self.globals.options;
        InlineDecision {
            clone_target: info.always_clone
                || (is_method_missing && options.method_missing_always_clone),
            force_inline: needs_caller_frame
                || (is_method_missing && options.method_missing_always_inline),
        }
    }
}

// Registration helpers for built-in classes.
impl VM {
    pub fn add_builtin_method(
        &mut self,
        module: Module,
        name: &str,
        func: BuiltinFunc,
        params: ParamsDesc,
    ) -> FnId {
        let name = IdentId::get_id(name);
        self.globals
            .define_method(module, name, MethodInfo::native(name, func, params))
    }

    pub fn add_builtin_class_method(
        &mut self,
        module: Module,
        name: &str,
        func: BuiltinFunc,
        params: ParamsDesc,
    ) -> FnId {
        let singleton = module.get_singleton_class();
        self.add_builtin_method(singleton, name, func, params)
    }
}
