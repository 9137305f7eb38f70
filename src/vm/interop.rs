use crate::*;

///
/// A value owned by a foreign system, dispatched by member name rather
/// than through a Ruby class.
///
pub trait ForeignObject: std::fmt::Debug {
    fn read_member(&self, name: &str) -> Option<Value>;

    fn write_member(&mut self, name: &str, value: Value) -> Result<(), RubyError>;

    /// Invoke `name` with `args`. None means the member does not exist.
    fn invoke_member(&mut self, name: &str, args: &[Value]) -> Option<VMResult>;
}

///
/// Foreign-member write cache.
///
/// Remembers member names already validated against a foreign receiver,
/// bounded by the interop-write-cache option; writes beyond the bound
/// take the uncached path.
///
#[derive(Debug, Default)]
pub struct InteropWriteSite {
    cached_names: Vec<IdentId>,
}

impl InteropWriteSite {
    pub fn new() -> Self {
        InteropWriteSite::default()
    }

    pub fn cached_len(&self) -> usize {
        self.cached_names.len()
    }

    pub fn write(
        &mut self,
        vm: &mut VM,
        mut receiver: Value,
        name: IdentId,
        value: Value,
    ) -> VMResult {
        let limit = vm.globals.options.interop_write_cache;
        let cached = self.cached_names.contains(&name);
        if !cached && self.cached_names.len() < limit {
            self.cached_names.push(name);
        }
        let member = IdentId::get_name(name);
        match receiver.as_mut_rvalue().map(|r| &mut r.kind) {
            Some(ObjKind::Foreign(obj)) => {
                obj.write_member(&member, value)?;
                Ok(value)
            }
            _ => Err(RubyError::typeerr(format!(
                "Receiver is not a foreign object. (given:{})",
                receiver.get_class_name()
            ))),
        }
    }
}
