extern crate arrayvec;
extern crate fancy_regex;
extern crate fxhash;
extern crate indexmap;
extern crate num;
extern crate once_cell;
extern crate regex;

pub use fxhash::FxHashMap;
pub use fxhash::FxHashSet;

pub mod builtin;
pub mod encoding;
pub mod error;
pub mod globals;
pub mod hashing;
pub mod id_table;
pub mod options;
pub mod regexp;
pub mod rope;
pub mod value;
pub mod vm;

pub use crate::builtin::*;
pub use crate::encoding::*;
pub use crate::error::*;
pub use crate::globals::*;
pub use crate::id_table::IdentId;
pub use crate::options::RuntimeOptions;
pub use crate::regexp::*;
pub use crate::rope::{intern_rope, intern_str, CodeRange, Rope};
pub use crate::value::*;
pub use crate::vm::*;

pub type FxIndexMap<K, V> = indexmap::IndexMap<K, V, fxhash::FxBuildHasher>;
pub type FxIndexSet<T> = indexmap::IndexSet<T, fxhash::FxBuildHasher>;

use core::ptr::NonNull;

///
/// A copyable raw reference to heap-allocated runtime metadata.
///
/// Ownership of the pointee is handed to the collector (out of scope here);
/// `Ref` itself never frees.
///
#[derive(Debug)]
#[repr(transparent)]
pub struct Ref<T>(NonNull<T>);

impl<T: Default> Default for Ref<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Ref<T> {
    pub(crate) fn new(info: T) -> Self {
        let boxed = Box::into_raw(Box::new(info));
        Ref(NonNull::new(boxed).expect("Ref::new(): the pointer is NULL."))
    }

    #[inline(always)]
    pub(crate) fn from_ptr(info: *mut T) -> Self {
        Ref(NonNull::new(info).expect("from_ptr(): the pointer is NULL."))
    }

    #[inline(always)]
    pub(crate) fn as_ptr(&self) -> *mut T {
        self.0.as_ptr()
    }

    #[inline(always)]
    pub(crate) fn id(&self) -> u64 {
        self.0.as_ptr() as u64
    }
}

unsafe impl<T> Send for Ref<T> {}
unsafe impl<T> Sync for Ref<T> {}

impl<T> Copy for Ref<T> {}

impl<T> Clone for Ref<T> {
    #[inline(always)]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Ref<T> {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.as_ptr() == other.as_ptr()
    }
}

impl<T> Eq for Ref<T> {}

impl<T> std::hash::Hash for Ref<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> std::ops::Deref for Ref<T> {
    type Target = T;
    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        unsafe { &*self.0.as_ptr() }
    }
}

impl<T> std::ops::DerefMut for Ref<T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.0.as_ptr() }
    }
}
