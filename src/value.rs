//! Runtime value model.
//!
//! A closed set of value variants with the arithmetic, comparison,
//! truthiness, and indexing contracts the evaluator dispatches on.
//! Numbers are IEEE-754 doubles; strings and lists are immutable and
//! reference-counted; maps preserve insertion order.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::ast::Block;
use crate::environment::Environment;
use crate::evaluator::{EvalSignal, Evaluator};

#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Str(Rc<String>),
    Nil,
    List(Rc<Vec<Value>>),
    Map(Rc<IndexMap<MapKey, Value>>),
    Type(TypeTag),
    Function(Rc<FunctionValue>),
    Native(NativeFunction),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(Rc::new(s.into()))
    }

    pub fn list(values: Vec<Value>) -> Self {
        Value::List(Rc::new(values))
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Number(_) => TypeTag::Number,
            Value::Bool(_) => TypeTag::Bool,
            Value::Str(_) => TypeTag::Str,
            Value::Nil => TypeTag::Nil,
            Value::List(_) => TypeTag::List,
            Value::Map(_) => TypeTag::Map,
            Value::Type(_) => TypeTag::Type,
            Value::Function(_) => TypeTag::Function,
            Value::Native(_) => TypeTag::Native,
        }
    }

    pub fn as_callable(&self) -> Option<&dyn Callable> {
        match self {
            Value::Function(function) => Some(function.as_ref()),
            Value::Native(native) => Some(native),
            _ => None,
        }
    }
}

/// Name of an object type; also the payload of the `Type` meta-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Number,
    Bool,
    Str,
    Nil,
    List,
    Map,
    Type,
    Function,
    Native,
}

impl TypeTag {
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Number => "number",
            TypeTag::Bool => "bool",
            TypeTag::Str => "string",
            TypeTag::Nil => "nil",
            TypeTag::List => "list",
            TypeTag::Map => "map",
            TypeTag::Type => "type",
            TypeTag::Function => "function",
            TypeTag::Native => "native",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A user function: formal parameters, body, and the environment in
/// effect at its definition site.
#[derive(Debug)]
pub struct FunctionValue {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub closure: Environment,
}

/// A host function registered in the global table. The handler receives
/// the evaluator so natives can call back into evaluation.
#[derive(Clone)]
pub struct NativeFunction {
    name: Rc<String>,
    arity: usize,
    variadic: bool,
    handler: Rc<NativeHandler>,
}

pub type NativeHandler = dyn Fn(&mut Evaluator, Vec<Value>) -> Result<Value, RuntimeError>;

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        arity: usize,
        handler: impl Fn(&mut Evaluator, Vec<Value>) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        Self {
            name: Rc::new(name.into()),
            arity,
            variadic: false,
            handler: Rc::new(handler),
        }
    }

    pub fn new_variadic(
        name: impl Into<String>,
        handler: impl Fn(&mut Evaluator, Vec<Value>) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        Self {
            name: Rc::new(name.into()),
            arity: 0,
            variadic: true,
            handler: Rc::new(handler),
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("variadic", &self.variadic)
            .finish_non_exhaustive()
    }
}

/// Anything that may appear in call position.
pub trait Callable {
    fn name(&self) -> &str;
    fn arity(&self) -> usize;
    fn variadic(&self) -> bool;
    fn call(&self, evaluator: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalSignal>;
}

impl Callable for FunctionValue {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        self.params.len()
    }

    fn variadic(&self) -> bool {
        false
    }

    fn call(&self, evaluator: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalSignal> {
        evaluator.invoke_function(self, args)
    }
}

impl Callable for NativeFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        self.arity
    }

    fn variadic(&self) -> bool {
        self.variadic
    }

    fn call(&self, evaluator: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalSignal> {
        (self.handler)(evaluator, args).map_err(EvalSignal::bare)
    }
}

/// The hashable subset of value variants permitted as map keys.
#[derive(Debug, Clone)]
pub enum MapKey {
    Number(f64),
    Bool(bool),
    Str(Rc<String>),
    Nil,
    Type(TypeTag),
}

impl MapKey {
    pub fn from_value(value: &Value) -> Result<MapKey, RuntimeError> {
        match value {
            // -0.0 folds onto 0.0 so the two index the same entry.
            Value::Number(n) => Ok(MapKey::Number(if *n == 0.0 { 0.0 } else { *n })),
            Value::Bool(b) => Ok(MapKey::Bool(*b)),
            Value::Str(s) => Ok(MapKey::Str(s.clone())),
            Value::Nil => Ok(MapKey::Nil),
            Value::Type(tag) => Ok(MapKey::Type(*tag)),
            other => Err(RuntimeError::UnhashableKey(other.type_tag())),
        }
    }
}

// Number keys compare and hash by bit pattern, which keeps Eq reflexive.
impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MapKey::Number(a), MapKey::Number(b)) => a.to_bits() == b.to_bits(),
            (MapKey::Bool(a), MapKey::Bool(b)) => a == b,
            (MapKey::Str(a), MapKey::Str(b)) => a == b,
            (MapKey::Nil, MapKey::Nil) => true,
            (MapKey::Type(a), MapKey::Type(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for MapKey {}

impl std::hash::Hash for MapKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            MapKey::Number(n) => {
                0u8.hash(state);
                n.to_bits().hash(state);
            }
            MapKey::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            MapKey::Str(s) => {
                2u8.hash(state);
                s.hash(state);
            }
            MapKey::Nil => 3u8.hash(state),
            MapKey::Type(tag) => {
                4u8.hash(state);
                tag.hash(state);
            }
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Number(n) => write!(f, "{n}"),
            MapKey::Bool(b) => write!(f, "{b}"),
            MapKey::Str(s) => write!(f, "\"{s}\""),
            MapKey::Nil => write!(f, "nil"),
            MapKey::Type(tag) => write!(f, "{tag}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("unsupported operand types for {op}: {lhs} and {rhs}")]
    UnsupportedOperands {
        op: &'static str,
        lhs: TypeTag,
        rhs: TypeTag,
    },
    #[error("cannot negate a {0}")]
    NotNegatable(TypeTag),
    #[error("division by zero")]
    DivideByZero,
    #[error("modulo by zero")]
    ModuloByZero,
    #[error("{target} is not indexable")]
    NotIndexable { target: TypeTag },
    #[error("{target} index must be an integer, got {got}")]
    NonIntegerIndex { target: TypeTag, got: String },
    #[error("{target} index out of range")]
    IndexOutOfRange { target: TypeTag },
    #[error("{0} cannot be used as a map key")]
    UnhashableKey(TypeTag),
    #[error("map key {key} not found")]
    KeyNotFound { key: String },
    #[error("duplicate map key {key}")]
    DuplicateMapKey { key: String },
    #[error("symbol not declared: {0}")]
    UndeclaredSymbol(String),
    #[error("cannot redeclare symbol: {0}")]
    Redeclaration(String),
    #[error("cannot redeclare global: {0}")]
    GlobalRedeclaration(String),
    #[error("{0} is not callable")]
    NotCallable(TypeTag),
    #[error("incorrect number of arguments to {callee}: {expected} expected, {provided} provided")]
    ArityMismatch {
        callee: String,
        expected: usize,
        provided: usize,
    },
    #[error("call depth exceeded limit ({limit})")]
    CallDepthExceeded { limit: usize },
    #[error("invalid argument to {name}: {message}")]
    InvalidArgument {
        name: &'static str,
        message: String,
    },
    #[error("assertion failed: {expression}")]
    AssertionFailed { expression: String },
    #[error("defer used outside of a block")]
    DeferOutsideBlock,
    #[error("break used outside of a loop")]
    BreakOutsideLoop,
    #[error("continue used outside of a loop")]
    ContinueOutsideLoop,
    #[error("return used outside of a function")]
    ReturnOutsideFunction,
    #[error("module '{module}' was not found (searched {searched})")]
    ModuleNotFound { module: String, searched: String },
    #[error("import of module '{module}' failed:\n{detail}")]
    ImportFailed { module: String, detail: String },
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Nil => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0,
        Value::Str(s) => !s.is_empty(),
        Value::List(items) => !items.is_empty(),
        Value::Map(entries) => !entries.is_empty(),
        Value::Type(_) => true,
        Value::Function(_) => true,
        Value::Native(_) => true,
    }
}

pub fn add(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::Str(a), Value::Str(b)) => Ok(Value::string(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => {
            // Concatenation allocates; neither operand is touched.
            let mut items = a.as_ref().clone();
            items.extend(b.iter().cloned());
            Ok(Value::List(Rc::new(items)))
        }
        (a, b) => Err(unsupported("+", a, b)),
    }
}

pub fn subtract(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    numbers(lhs, rhs, "-", |a, b| Value::Number(a - b))
}

pub fn multiply(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    numbers(lhs, rhs, "*", |a, b| Value::Number(a * b))
}

pub fn divide(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Number(_), Value::Number(b)) if *b == 0.0 => Err(RuntimeError::DivideByZero),
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),
        (a, b) => Err(unsupported("/", a, b)),
    }
}

pub fn modulo(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Number(_), Value::Number(b)) if *b == 0.0 => Err(RuntimeError::ModuloByZero),
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a % b)),
        (a, b) => Err(unsupported("%", a, b)),
    }
}

pub fn negate(value: &Value) -> Result<Value, RuntimeError> {
    match value {
        Value::Number(n) => Ok(Value::Number(-n)),
        other => Err(RuntimeError::NotNegatable(other.type_tag())),
    }
}

pub fn not(value: &Value) -> Value {
    Value::Bool(!is_truthy(value))
}

pub fn less_than(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    ordered(lhs, rhs, "<", |a, b| a < b, |a, b| a < b)
}

pub fn less_than_eq(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    ordered(lhs, rhs, "<=", |a, b| a <= b, |a, b| a <= b)
}

pub fn greater_than(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    ordered(lhs, rhs, ">", |a, b| a > b, |a, b| a > b)
}

pub fn greater_than_eq(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    ordered(lhs, rhs, ">=", |a, b| a >= b, |a, b| a >= b)
}

/// Equality is total: every pair of values compares without error.
pub fn equal_to(lhs: &Value, rhs: &Value) -> Value {
    Value::Bool(values_equal(lhs, rhs))
}

pub fn not_equal_to(lhs: &Value, rhs: &Value) -> Value {
    Value::Bool(!values_equal(lhs, rhs))
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        // IEEE semantics; NaN is not equal to itself.
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Nil, Value::Nil) => true,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter().all(|(key, value)| {
                    b.get(key).is_some_and(|other| values_equal(value, other))
                })
        }
        (Value::Type(a), Value::Type(b)) => a == b,
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Native(a), Value::Native(b)) => {
            a.name == b.name && Rc::ptr_eq(&a.handler, &b.handler)
        }
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other)
    }
}

/// `sequence[index]` for strings, lists, and maps.
pub fn item_at_index(target: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match target {
        Value::Str(text) => {
            let idx = sequence_index(index, text.chars().count(), TypeTag::Str)?;
            text.chars()
                .nth(idx)
                .map(|ch| Value::string(ch.to_string()))
                .ok_or(RuntimeError::IndexOutOfRange {
                    target: TypeTag::Str,
                })
        }
        Value::List(items) => {
            let idx = sequence_index(index, items.len(), TypeTag::List)?;
            items
                .get(idx)
                .cloned()
                .ok_or(RuntimeError::IndexOutOfRange {
                    target: TypeTag::List,
                })
        }
        Value::Map(entries) => {
            let key = MapKey::from_value(index)?;
            entries
                .get(&key)
                .cloned()
                .ok_or_else(|| RuntimeError::KeyNotFound {
                    key: key.to_string(),
                })
        }
        other => Err(RuntimeError::NotIndexable {
            target: other.type_tag(),
        }),
    }
}

fn sequence_index(index: &Value, len: usize, target: TypeTag) -> Result<usize, RuntimeError> {
    let Value::Number(raw) = index else {
        return Err(RuntimeError::NonIntegerIndex {
            target,
            got: index.to_string(),
        });
    };

    if !raw.is_finite() || raw.fract() != 0.0 {
        return Err(RuntimeError::NonIntegerIndex {
            target,
            got: raw.to_string(),
        });
    }

    if *raw < 0.0 || *raw >= len as f64 {
        return Err(RuntimeError::IndexOutOfRange { target });
    }

    Ok(*raw as usize)
}

fn numbers(
    lhs: &Value,
    rhs: &Value,
    op: &'static str,
    apply: impl FnOnce(f64, f64) -> Value,
) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(apply(*a, *b)),
        (a, b) => Err(unsupported(op, a, b)),
    }
}

fn ordered(
    lhs: &Value,
    rhs: &Value,
    op: &'static str,
    on_numbers: impl FnOnce(f64, f64) -> bool,
    on_strings: impl FnOnce(&str, &str) -> bool,
) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(on_numbers(*a, *b))),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(on_strings(a, b))),
        (a, b) => Err(unsupported(op, a, b)),
    }
}

fn unsupported(op: &'static str, lhs: &Value, rhs: &Value) -> RuntimeError {
    RuntimeError::UnsupportedOperands {
        op,
        lhs: lhs.type_tag(),
        rhs: rhs.type_tag(),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{}", s),
            Value::Nil => write!(f, "nil"),
            Value::List(items) => {
                let rendered = items
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{}]", rendered)
            }
            Value::Map(entries) => {
                let rendered = entries
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{}}}", rendered)
            }
            Value::Type(tag) => write!(f, "{}", tag),
            Value::Function(function) => {
                write!(f, "<function {} / {}>", function.name, function.params.len())
            }
            Value::Native(native) => write!(f, "<native {}>", native.name),
        }
    }
}
