use crate::*;
use std::ops::{Deref, Index};

///
/// The block slot of a call.
///
/// A symbol block dispatches its name against its first argument; a proc
/// block runs the proc's body.
///
#[derive(Debug, Clone)]
pub enum Block {
    Proc(Value),
    Sym(IdentId),
}

impl From<Value> for Block {
    fn from(proc_obj: Value) -> Self {
        Self::Proc(proc_obj)
    }
}

///
/// The packed argument record of a call.
///
/// The block and the keyword-rest value have dedicated slots so that a
/// nil block is unambiguous and a trailing hash literal is never
/// misrouted into the positionals.
///
#[derive(Debug, Clone)]
pub struct Args {
    pub block: Option<Block>,
    /// nil, or a Hash bound to the keyword-rest slot.
    pub kw_arg: Value,
    args: Vec<Value>,
}

impl Args {
    pub fn new(args: Vec<Value>) -> Self {
        Args {
            block: None,
            kw_arg: Value::nil(),
            args,
        }
    }

    pub fn new0() -> Self {
        Args::new(vec![])
    }

    pub fn new1(arg0: Value) -> Self {
        Args::new(vec![arg0])
    }

    pub fn new2(arg0: Value, arg1: Value) -> Self {
        Args::new(vec![arg0, arg1])
    }

    pub fn new3(arg0: Value, arg1: Value, arg2: Value) -> Self {
        Args::new(vec![arg0, arg1, arg2])
    }

    pub fn from_slice(slice: &[Value]) -> Self {
        Args::new(slice.to_vec())
    }

    pub fn with_block(mut self, block: impl Into<Option<Block>>) -> Self {
        self.block = block.into();
        self
    }

    pub fn with_kw(mut self, kw: Value) -> Self {
        self.kw_arg = kw;
        self
    }

    /// A copy with `arg0` in front of the positionals, block and keyword
    /// slots carried over.
    pub fn prepend(&self, arg0: Value) -> Args {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(arg0);
        args.extend_from_slice(&self.args);
        Args {
            block: self.block.clone(),
            kw_arg: self.kw_arg,
            args,
        }
    }

    /// A copy without the first positional, block and keyword slots
    /// carried over.
    pub fn shift(&self) -> Args {
        Args {
            block: self.block.clone(),
            kw_arg: self.kw_arg,
            args: self.args[1..].to_vec(),
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.args.clone()
    }

    pub fn check_args_num(&self, num: usize) -> Result<(), RubyError> {
        if self.len() == num {
            Ok(())
        } else {
            Err(RubyError::argument_wrong(self.len(), num))
        }
    }

    pub fn check_args_range(&self, min: usize, max: usize) -> Result<(), RubyError> {
        if min <= self.len() && self.len() <= max {
            Ok(())
        } else {
            Err(RubyError::argument_wrong_range(self.len(), min, max))
        }
    }

    pub fn check_args_min(&self, min: usize) -> Result<(), RubyError> {
        if self.len() >= min {
            Ok(())
        } else {
            Err(RubyError::argument(format!(
                "Wrong number of arguments. (given {}, expected {}+)",
                self.len(),
                min
            )))
        }
    }

    pub fn expect_block(&self) -> Result<&Block, RubyError> {
        match &self.block {
            Some(block) => Ok(block),
            None => Err(RubyError::argument("Currently, needs block.")),
        }
    }
}

impl Index<usize> for Args {
    type Output = Value;
    fn index(&self, index: usize) -> &Self::Output {
        &self.args[index]
    }
}

impl Deref for Args {
    type Target = [Value];
    fn deref(&self) -> &Self::Target {
        &self.args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes() {
        assert_eq!(0, Args::new0().len());
        assert_eq!(1, Args::new1(Value::nil()).len());
        assert_eq!(2, Args::new2(Value::nil(), Value::nil()).len());
        assert_eq!(
            3,
            Args::new3(Value::nil(), Value::nil(), Value::nil()).len()
        );
        let a = Args::from_slice(&[Value::integer(1), Value::integer(2)]);
        assert_eq!(Value::integer(2), a[1]);
    }

    #[test]
    fn prepend_keeps_block_and_kw() {
        let args = Args::new1(Value::integer(2)).with_block(Block::Sym(IdentId::TO_S));
        let args = args.prepend(Value::integer(1));
        assert_eq!(2, args.len());
        assert_eq!(Value::integer(1), args[0]);
        assert!(args.block.is_some());
        let back = args.shift();
        assert_eq!(1, back.len());
        assert_eq!(Value::integer(2), back[0]);
        assert!(back.block.is_some());
    }

    #[test]
    fn arity_checks() {
        let args = Args::new1(Value::nil());
        assert!(args.check_args_num(1).is_ok());
        assert!(args.check_args_num(2).is_err());
        assert!(args.check_args_range(0, 1).is_ok());
        assert!(args.check_args_range(2, 3).is_err());
        assert!(args.check_args_min(1).is_ok());
        assert!(args.check_args_min(2).is_err());
    }
}
