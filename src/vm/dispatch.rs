use crate::*;

///
/// What a dispatch does when lookup reports "missing".
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingBehavior {
    /// Return the MISSING sentinel to the caller.
    ReturnMissing,
    /// Re-dispatch `method_missing`, raising NoMethodError when that is
    /// missing too.
    CallMethodMissing,
}

/// Which visibilities a call site may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisProfile {
    /// Ordinary receiver.method(...) call.
    Public,
    /// Implicit-self call; every visibility is legal.
    Private,
}

///
/// The dispatch profile of a call site.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchMode {
    pub visibility: VisProfile,
    pub missing: MissingBehavior,
    /// `method_missing` dispatch ignores refinement scopes.
    pub ignore_refinements: bool,
}

impl DispatchMode {
    pub const PUBLIC: DispatchMode = DispatchMode {
        visibility: VisProfile::Public,
        missing: MissingBehavior::CallMethodMissing,
        ignore_refinements: false,
    };
    pub const PRIVATE: DispatchMode = DispatchMode {
        visibility: VisProfile::Private,
        missing: MissingBehavior::CallMethodMissing,
        ignore_refinements: false,
    };
    pub const PUBLIC_RETURN_MISSING: DispatchMode = DispatchMode {
        visibility: VisProfile::Public,
        missing: MissingBehavior::ReturnMissing,
        ignore_refinements: false,
    };
    pub const PRIVATE_RETURN_MISSING: DispatchMode = DispatchMode {
        visibility: VisProfile::Private,
        missing: MissingBehavior::ReturnMissing,
        ignore_refinements: false,
    };
    pub const PRIVATE_RETURN_MISSING_IGNORE_REFINEMENTS: DispatchMode = DispatchMode {
        visibility: VisProfile::Private,
        missing: MissingBehavior::ReturnMissing,
        ignore_refinements: true,
    };
}

#[derive(Debug, Clone)]
struct CacheEntry {
    class: Module,
    /// Assumption-epoch snapshot of the receiver class at resolve time.
    epoch: u32,
    fid: FnId,
    owner: Module,
}

///
/// A call site's polymorphic inline cache.
///
/// An ordered list of (class identity, epoch) guarded entries; a hit
/// requires both to match. Misses below the limit resolve and record; at
/// the limit the site goes megamorphic and every call resolves through
/// the global cache without recording.
///
#[derive(Debug, Clone)]
pub struct CallSite {
    pub name: IdentId,
    pub mode: DispatchMode,
    entries: Vec<CacheEntry>,
    megamorphic: bool,
    /// Refinement scopes active at this call site, searched ahead of the
    /// receiver's linearization.
    refinements: Vec<Module>,
    full_lookups: usize,
}

impl CallSite {
    pub fn new(name: IdentId, mode: DispatchMode) -> Self {
        CallSite {
            name,
            mode,
            entries: vec![],
            megamorphic: false,
            refinements: vec![],
            full_lookups: 0,
        }
    }

    pub fn public(name: IdentId) -> Self {
        CallSite::new(name, DispatchMode::PUBLIC)
    }

    pub fn private(name: IdentId) -> Self {
        CallSite::new(name, DispatchMode::PRIVATE)
    }

    pub fn with_refinements(mut self, refinements: Vec<Module>) -> Self {
        self.refinements = refinements;
        self
    }

    pub fn is_megamorphic(&self) -> bool {
        self.megamorphic
    }

    pub fn cached_entries(&self) -> usize {
        self.entries.len()
    }

    /// Full lookups performed, cache hits excluded.
    pub fn full_lookup_count(&self) -> usize {
        self.full_lookups
    }

    /// Resolve `self.name` for a receiver of class `rec_class`.
    ///
    /// Stale entries fail the epoch comparison and fall through to a full
    /// lookup, which re-records.
    pub fn resolve(
        &mut self,
        globals: &mut Globals,
        rec_class: Module,
    ) -> Option<(FnId, Module)> {
        let cur_epoch = rec_class.epoch();
        for entry in &self.entries {
            if entry.class.id() == rec_class.id() && entry.epoch == cur_epoch {
                return Some((entry.fid, entry.owner));
            }
        }
        // Drop entries invalidated by an epoch bump; they would never hit
        // again.
        self.entries
            .retain(|e| e.class.id() != rec_class.id() || e.epoch == cur_epoch);

        self.full_lookups += 1;
        let resolved = self.lookup(globals, rec_class)?;

        if !self.megamorphic {
            if self.entries.len() >= globals.options.dispatch_cache_limit {
                self.megamorphic = true;
                #[cfg(feature = "trace")]
                eprintln!("dispatch: call site {:?} went megamorphic.", self.name);
            } else {
                self.entries.push(CacheEntry {
                    class: rec_class,
                    epoch: cur_epoch,
                    fid: resolved.0,
                    owner: resolved.1,
                });
            }
        }
        Some(resolved)
    }

    fn lookup(&self, globals: &mut Globals, rec_class: Module) -> Option<(FnId, Module)> {
        if !self.mode.ignore_refinements {
            for refinement in &self.refinements {
                if let Some(fid) = refinement.get_instance_method(self.name) {
                    if globals.methods[fid].undefined {
                        return None;
                    }
                    return Some((fid, *refinement));
                }
            }
        }
        globals.methods.find_method(rec_class, self.name)
    }
}

///
/// A proc's body.
///
#[derive(Debug, Clone)]
pub enum ProcInfo {
    /// A body defined in Rust.
    Native { func: BuiltinFunc },
    /// Symbol-to-proc: dispatches `sym` against the first argument,
    /// through its own PUBLIC-mode dispatch cache.
    Sym { sym: IdentId, site: CallSite },
}

impl ProcInfo {
    pub fn native(func: BuiltinFunc) -> Self {
        ProcInfo::Native { func }
    }

    pub fn sym(sym: IdentId) -> Self {
        ProcInfo::Sym {
            sym,
            site: CallSite::public(sym),
        }
    }
}
