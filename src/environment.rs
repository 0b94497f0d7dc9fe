//! Two-tier name resolution: a write-once global table shared by every
//! scope, and a chain of lexically nested scopes.
//!
//! Lookup checks globals first so a builtin stays visible even when an
//! unrelated outer scope binds the same name; declaration refuses global
//! names outright, so builtins can never be shadowed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::{RuntimeError, Value};

/// The process-wide global table. Entries are registered once, before
/// evaluation begins, and are read-only afterwards.
#[derive(Debug, Default)]
pub struct Globals {
    values: RefCell<HashMap<String, Value>>,
}

impl Globals {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Registering the same name twice is a host programming error and
    /// fails hard.
    pub fn register(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let mut values = self.values.borrow_mut();
        if values.contains_key(&name) {
            panic!("duplicate global symbol: {name}");
        }
        values.insert(name, value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.borrow().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.borrow().get(name).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct Environment {
    inner: Rc<RefCell<Scope>>,
}

#[derive(Debug)]
struct Scope {
    values: HashMap<String, Value>,
    enclosing: Option<Environment>,
    globals: Rc<Globals>,
}

impl Environment {
    pub fn new(globals: Rc<Globals>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Scope {
                values: HashMap::new(),
                enclosing: None,
                globals,
            })),
        }
    }

    pub fn new_enclosed(enclosing: &Environment) -> Self {
        let globals = enclosing.inner.borrow().globals.clone();
        Self {
            inner: Rc::new(RefCell::new(Scope {
                values: HashMap::new(),
                enclosing: Some(enclosing.clone()),
                globals,
            })),
        }
    }

    /// Binds `name` in this scope. Fails when the name is a global or is
    /// already bound here; shadowing an enclosing scope is allowed.
    pub fn declare(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let mut scope = self.inner.borrow_mut();
        if scope.globals.contains(name) {
            return Err(RuntimeError::GlobalRedeclaration(name.to_string()));
        }
        if scope.values.contains_key(name) {
            return Err(RuntimeError::Redeclaration(name.to_string()));
        }
        scope.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Mutates the innermost scope that already binds `name`. Never
    /// creates a binding, and globals are not assignable.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let enclosing = {
            let mut scope = self.inner.borrow_mut();
            if scope.values.contains_key(name) {
                scope.values.insert(name.to_string(), value);
                return Ok(());
            }
            scope.enclosing.clone()
        };

        match enclosing {
            Some(outer) => outer.assign(name, value),
            None => Err(RuntimeError::UndeclaredSymbol(name.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Result<Value, RuntimeError> {
        let enclosing = {
            let scope = self.inner.borrow();
            if let Some(value) = scope.globals.get(name) {
                return Ok(value);
            }
            if let Some(value) = scope.values.get(name) {
                return Ok(value.clone());
            }
            scope.enclosing.clone()
        };

        match enclosing {
            Some(outer) => outer.lookup_local(name),
            None => Err(RuntimeError::UndeclaredSymbol(name.to_string())),
        }
    }

    // Walks only the scope chain; globals were already consulted by the
    // innermost `get`.
    fn lookup_local(&self, name: &str) -> Result<Value, RuntimeError> {
        let enclosing = {
            let scope = self.inner.borrow();
            if let Some(value) = scope.values.get(name) {
                return Ok(value.clone());
            }
            scope.enclosing.clone()
        };

        match enclosing {
            Some(outer) => outer.lookup_local(name),
            None => Err(RuntimeError::UndeclaredSymbol(name.to_string())),
        }
    }
}
