use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Handle to one frame of the lexical scope chain. Cloning the handle shares
/// the frame, which is how closures keep their defining scope alive.
#[derive(Clone, Default)]
pub struct Scope(Rc<Frame>);

#[derive(Default)]
struct Frame {
    parent: Option<Scope>,
    bindings: RefCell<HashMap<String, Value>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh frame whose lookups fall back to `self`.
    pub fn child(&self) -> Self {
        Scope(Rc::new(Frame {
            parent: Some(self.clone()),
            bindings: RefCell::new(HashMap::new()),
        }))
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.0.parent.as_ref()
    }

    /// Looks `name` up in this frame, then outward through the parents.
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(value) = current.0.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            scope = current.parent();
        }
        None
    }

    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.0.bindings.borrow().get(name).cloned()
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.0.bindings.borrow().contains_key(name)
    }

    /// Binds `name` in this frame, shadowing any outer binding.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        tracing::trace!(name = %name, kind = value.type_name(), "define");
        self.0.bindings.borrow_mut().insert(name, value);
    }

    /// Rebinds `name` in the nearest frame that already defines it.
    /// Returns false when no frame in the chain does.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(slot) = current.0.bindings.borrow_mut().get_mut(name) {
                *slot = value;
                return true;
            }
            scope = current.parent();
        }
        false
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// Values can hold closures that point back at this scope, so only the names
// are printed.
impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bindings = self.0.bindings.borrow();
        let mut names: Vec<&String> = bindings.keys().collect();
        names.sort();
        f.debug_struct("Scope")
            .field("names", &names)
            .field("has_parent", &self.0.parent.is_some())
            .finish()
    }
}
