//! Runtime values.

use sponge_types::ast::FunctionDef;
use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

/// Modules a script can `import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleKind {
    Time,
    Os,
    Math,
    Turtle,
    Canvas,
}

impl ModuleKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "time" => Some(Self::Time),
            "os" => Some(Self::Os),
            "math" => Some(Self::Math),
            "turtle" => Some(Self::Turtle),
            "canvas" => Some(Self::Canvas),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Os => "os",
            Self::Math => "math",
            Self::Turtle => "turtle",
            Self::Canvas => "canvas",
        }
    }
}

/// A user-defined function. `defaults` lines up with `def.params`.
#[derive(Debug, PartialEq)]
pub struct Function {
    pub def: FunctionDef,
    pub defaults: Vec<Option<Value>>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.def.name.name
    }
}

/// An exception object, as bound by `except Kind as e`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionValue {
    pub kind: String,
    pub message: String,
}

/// An open session file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHandle {
    pub name: String,
    pub mode: String,
    pub state: Rc<RefCell<FileState>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileState {
    /// Byte offset of the next read.
    pub position: usize,
    pub closed: bool,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: mode.into(),
            state: Rc::new(RefCell::new(FileState::default())),
        }
    }

    pub fn readable(&self) -> bool {
        self.mode.starts_with('r')
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Lists are shared and mutable, as in Python.
    List(Rc<RefCell<Vec<Value>>>),
    Function(Rc<Function>),
    /// A builtin function, or a function exported by a module.
    Builtin {
        module: Option<ModuleKind>,
        name: String,
    },
    Module(ModuleKind),
    File(FileHandle),
    Exception(Rc<ExceptionValue>),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn str(text: impl Into<String>) -> Self {
        Value::Str(text.into())
    }

    pub fn builtin(name: &str) -> Self {
        Value::Builtin {
            module: None,
            name: name.to_string(),
        }
    }

    /// Python's `type(x).__name__`.
    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Builtin { .. } => "builtin_function_or_method",
            Value::Module(_) => "module",
            Value::File(_) => "TextIOWrapper",
            Value::Exception(e) => &e.kind,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Builtin { .. })
    }

    pub fn is_module(&self) -> bool {
        matches!(self, Value::Module(_))
    }

    /// Integer view of `bool` and `int` values.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Float view of any numeric value.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            other => other.as_int().map(|n| n as f64),
        }
    }

    /// `str(x)`.
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Exception(e) => e.message.clone(),
            other => other.repr(),
        }
    }

    /// `repr(x)`.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => quote(s),
            Value::List(items) => {
                let items = items.borrow();
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Function(f) => format!("<function {}>", f.name()),
            Value::Builtin { module: None, name } => format!("<built-in function {name}>"),
            Value::Builtin {
                module: Some(module),
                name,
            } => format!("<function {}.{name}>", module.name()),
            Value::Module(m) => format!("<module '{}'>", m.name()),
            Value::File(handle) => format!(
                "<_io.TextIOWrapper name='{}' mode='{}'>",
                handle.name, handle.mode
            ),
            Value::Exception(e) => format!("{}({})", e.kind, quote(&e.message)),
        }
    }
}

/// Python float formatting: `2.0`, `0.1`, `1e+20`, `inf`, `nan`.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let text = format!("{f:e}");
        return match text.split_once('e') {
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exponent),
                };
                format!("{mantissa}e{sign}{digits:0>2}")
            }
            None => text,
        };
    }
    if f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

/// Python `repr` of a string: single quotes unless the text contains one
/// and no double quote.
fn quote(s: &str) -> String {
    let delimiter = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_formatting_matches_python() {
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(-0.5), "-0.5");
        assert_eq!(format_float(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_float(1e20), "1e+20");
        assert_eq!(format_float(1.5e-7), "1.5e-07");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NAN), "nan");
    }

    #[test]
    fn str_and_repr() {
        let list = Value::list(vec![Value::Int(1), Value::str("a"), Value::None]);
        assert_eq!(list.to_str(), "[1, 'a', None]");
        assert_eq!(Value::str("it's").repr(), "\"it's\"");
        assert_eq!(Value::str("a\nb").repr(), "'a\\nb'");
        assert_eq!(Value::Bool(true).to_str(), "True");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::None.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::str("").truthy());
        assert!(!Value::list(vec![]).truthy());
        assert!(Value::Float(0.5).truthy());
        assert!(Value::Module(ModuleKind::Math).truthy());
    }

    #[test]
    fn callables_and_modules() {
        assert!(Value::builtin("print").is_callable());
        assert!(Value::Module(ModuleKind::Turtle).is_module());
        assert!(!Value::Int(3).is_callable());
        assert_eq!(ModuleKind::from_name("os"), Some(ModuleKind::Os));
        assert_eq!(ModuleKind::from_name("sys"), None);
    }
}
