use crate::*;

mod hash;
mod integer;
mod module;
mod nativefunction;
mod object;
mod regexp;
mod string;
mod symbol;

pub use nativefunction::{nativefunction_type_size, NativeType};
pub use regexp::{
    matchdata_create, matchdata_fixup_positions, regexp_match_in_region,
    regexp_match_in_region_tregex,
};
pub use string::string_byte_index;

pub(crate) fn init(vm: &mut VM) {
    object::init(vm);
    module::init(vm);
    integer::init(vm);
    string::init(vm);
    symbol::init(vm);
    hash::init(vm);
    regexp::init(vm);
}
