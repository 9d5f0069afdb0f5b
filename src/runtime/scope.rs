use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::lang::value::Value;

/// A name → value table with an optional enclosing scope.
///
/// Frames share their parents through `Rc`; a declared function keeps its
/// defining scope alive for as long as the function value exists.
pub struct Scope {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn global() -> Rc<Self> {
        Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    pub fn child(parent: &Rc<Scope>) -> Rc<Self> {
        Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Resolve `name` here or in the nearest enclosing scope.
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut scope = self;
        loop {
            if let Some(value) = scope.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            scope = scope.parent.as_deref()?;
        }
    }

    /// Bind in this scope only, shadowing any outer binding.
    pub fn set(&self, name: &str, value: Value) {
        self.bindings.borrow_mut().insert(name.to_string(), value);
    }

    /// Number of enclosing scopes.
    fn depth(&self) -> usize {
        let mut depth = 0;
        let mut scope = self;
        while let Some(parent) = scope.parent.as_deref() {
            depth += 1;
            scope = parent;
        }
        depth
    }

    /// Drop every binding. Breaks function ↔ scope reference cycles.
    pub fn clear(&self) {
        // Take the map out first so values dropping here never observe a
        // live borrow.
        let bindings = std::mem::take(&mut *self.bindings.borrow_mut());
        drop(bindings);
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Scope")
            .field("names", &names)
            .field("depth", &self.depth())
            .finish()
    }
}
