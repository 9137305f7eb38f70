use crate::*;

#[derive(Clone, PartialEq)]
pub struct RubyError {
    pub kind: RubyErrorKind,
    /// Set for NoMethodError/NameError raised by dispatch.
    pub receiver: Option<Value>,
    pub method_name: Option<IdentId>,
    pub call_args: Option<Vec<Value>>,
}

impl std::fmt::Debug for RubyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            RubyErrorKind::RuntimeErr { kind, message } => {
                write!(f, "{:?}: ({})", kind, message)
            }
            RubyErrorKind::Internal(msg) => write!(f, "InternalError {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RubyErrorKind {
    RuntimeErr {
        kind: RuntimeErrKind,
        message: String,
    },
    Internal(String),
}

#[derive(Clone, Copy, PartialEq)]
pub enum RuntimeErrKind {
    Name,
    NoMethod,
    Argument,
    Index,
    Type,
    Range,
    Frozen,
    Regexp,
    Runtime,
    Interrupt,
}

impl std::fmt::Debug for RuntimeErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Self::Name => write!(f, "NameError"),
            Self::NoMethod => write!(f, "NoMethodError"),
            Self::Argument => write!(f, "ArgumentError"),
            Self::Index => write!(f, "IndexError"),
            Self::Type => write!(f, "TypeError"),
            Self::Range => write!(f, "RangeError"),
            Self::Frozen => write!(f, "FrozenError"),
            Self::Regexp => write!(f, "RegexpError"),
            Self::Runtime => write!(f, "RuntimeError"),
            Self::Interrupt => write!(f, "Interrupt"),
        }
    }
}

impl RubyError {
    pub fn new(kind: RubyErrorKind) -> Self {
        Self {
            kind,
            receiver: None,
            method_name: None,
            call_args: None,
        }
    }

    fn new_runtime_err(kind: RuntimeErrKind, message: String) -> Self {
        RubyError::new(RubyErrorKind::RuntimeErr { kind, message })
    }

    pub fn is_kind(&self, target: RuntimeErrKind) -> bool {
        matches!(&self.kind, RubyErrorKind::RuntimeErr { kind, .. } if *kind == target)
    }

    pub fn message(&self) -> String {
        match &self.kind {
            RubyErrorKind::RuntimeErr { kind, message } => format!("{:?} ({})", kind, message),
            RubyErrorKind::Internal(msg) => format!("InternalError\n{}", msg),
        }
    }

    pub fn show_err(&self) {
        eprintln!("{}", self.message());
    }
}

impl RubyError {
    pub fn runtime(msg: impl Into<String>) -> RubyError {
        RubyError::new_runtime_err(RuntimeErrKind::Runtime, msg.into())
    }

    pub fn nomethod(msg: impl Into<String>) -> RubyError {
        RubyError::new_runtime_err(RuntimeErrKind::NoMethod, msg.into())
    }

    /// NoMethodError raised when `method_missing` itself came back missing.
    /// Carries the receiver, the name, and the original arguments.
    pub fn undefined_method_with_args(
        method: IdentId,
        receiver: Value,
        args: Vec<Value>,
    ) -> RubyError {
        let mut err = Self::nomethod(format!(
            "undefined method `{:?}' for {:?}:{}",
            method,
            receiver,
            receiver.get_class_name()
        ));
        err.receiver = Some(receiver);
        err.method_name = Some(method);
        err.call_args = Some(args);
        err
    }

    pub fn undefined_method(method: IdentId, receiver: Value) -> RubyError {
        Self::undefined_method_with_args(method, receiver, vec![])
    }

    pub fn undefined_method_for_class(method: IdentId, class: Module) -> RubyError {
        Self::nomethod(format!(
            "undefined method `{:?}' for {:?}",
            method,
            class.name()
        ))
    }

    pub fn internal(msg: impl Into<String>) -> RubyError {
        RubyError::new(RubyErrorKind::Internal(msg.into()))
    }

    pub fn name(msg: impl Into<String>) -> RubyError {
        RubyError::new_runtime_err(RuntimeErrKind::Name, msg.into())
    }

    pub fn typeerr(msg: impl Into<String>) -> RubyError {
        RubyError::new_runtime_err(RuntimeErrKind::Type, msg.into())
    }

    pub fn wrong_type(kind: impl Into<String>, class: &str, val: Value) -> RubyError {
        RubyError::typeerr(format!(
            "{} must be an {}. (given:{})",
            kind.into(),
            class,
            val.get_class_name()
        ))
    }

    pub fn argument(msg: impl Into<String>) -> RubyError {
        RubyError::new_runtime_err(RuntimeErrKind::Argument, msg.into())
    }

    pub fn argument_wrong(given: usize, expected: usize) -> RubyError {
        RubyError::argument(format!(
            "Wrong number of arguments. (given {}, expected {})",
            given, expected
        ))
    }

    pub fn argument_wrong_range(given: usize, min: usize, max: usize) -> RubyError {
        RubyError::argument(format!(
            "Wrong number of arguments. (given {}, expected {}..{})",
            given, min, max
        ))
    }

    pub fn frozen(msg: impl Into<String>) -> RubyError {
        RubyError::new_runtime_err(RuntimeErrKind::Frozen, msg.into())
    }

    pub fn regexp(msg: impl Into<String>) -> RubyError {
        RubyError::new_runtime_err(RuntimeErrKind::Regexp, msg.into())
    }

    pub fn regexp_compile(err: fancy_regex::Error, source: &str) -> RubyError {
        RubyError::regexp(format!(
            "Invalid string for a regular expression. {:?}: /{}/",
            err, source
        ))
    }

    pub fn index(msg: impl Into<String>) -> RubyError {
        RubyError::new_runtime_err(RuntimeErrKind::Index, msg.into())
    }

    pub fn range(msg: impl Into<String>) -> RubyError {
        RubyError::new_runtime_err(RuntimeErrKind::Range, msg.into())
    }

    pub fn interrupt() -> RubyError {
        RubyError::new_runtime_err(RuntimeErrKind::Interrupt, "Interrupted.".to_string())
    }

    pub fn encoding_invalid_byte_sequence(encoding: EncodingRef) -> RubyError {
        RubyError::argument(format!("invalid byte sequence in {}", encoding.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_checks() {
        let err = RubyError::argument_wrong(2, 1);
        assert!(err.is_kind(RuntimeErrKind::Argument));
        assert!(!err.is_kind(RuntimeErrKind::NoMethod));
        assert!(err
            .message()
            .contains("Wrong number of arguments. (given 2, expected 1)"));
    }

    #[test]
    fn no_method_error_payload() {
        let recv = Value::integer(42);
        let name = IdentId::get_id("absent");
        let err = RubyError::undefined_method_with_args(name, recv, vec![Value::integer(1)]);
        assert!(err.is_kind(RuntimeErrKind::NoMethod));
        assert_eq!(Some(name), err.method_name);
        assert_eq!(1, err.call_args.as_ref().unwrap().len());
        assert!(err.message().contains("absent"));
    }
}
