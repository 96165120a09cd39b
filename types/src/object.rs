//! Callable and property-bearing values.
//!
//! `Function` and `Object` are shared handles: cloning them clones the handle,
//! not the underlying callable or property map. That is what lets a thenable
//! check compare identities and lets getters observe later mutation.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::ptr;
use std::rc::Rc;

use crate::{Completion, Value};

type NativeFn = dyn Fn(&Value, &[Value]) -> Completion;

/// A callable value: `(this, args) -> Completion`.
#[derive(Clone)]
pub struct Function(Rc<NativeFn>);

impl Function {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Completion + 'static,
    {
        Self(Rc::new(f))
    }

    /// Call with `this` bound to `receiver`.
    pub fn call(&self, receiver: &Value, args: &[Value]) -> Completion {
        (self.0)(receiver, args)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({:p})", Rc::as_ptr(&self.0).cast::<()>())
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// A single object property: plain data or a getter invoked on every read.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Data(Value),
    Getter(Function),
}

/// A shared, mutable property map.
///
/// Objects may reference themselves. Rendering and comparison track the
/// objects they are inside of, so a cycle shows up as `[circular]` instead of
/// recursing forever.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<BTreeMap<String, Property>>>);

/// An object being rendered (second pointer null) or a pair being compared.
type Mark = (*const (), *const ());

thread_local! {
    static WALKING: RefCell<Vec<Mark>> = const { RefCell::new(Vec::new()) };
}

/// Held while an object's entries are being walked.
pub(crate) struct Walk(Mark);

impl Walk {
    /// `None` if `mark` is already being walked further up the stack.
    fn begin(mark: Mark) -> Option<Self> {
        WALKING.with(|walking| {
            let mut walking = walking.borrow_mut();
            if walking.contains(&mark) {
                return None;
            }
            walking.push(mark);
            Some(Self(mark))
        })
    }
}

impl Drop for Walk {
    fn drop(&mut self) {
        WALKING.with(|walking| {
            let mut walking = walking.borrow_mut();
            if let Some(pos) = walking.iter().rposition(|mark| *mark == self.0) {
                walking.remove(pos);
            }
        });
    }
}

impl Object {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Object::set`].
    #[must_use]
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder form of [`Object::define_getter`].
    #[must_use]
    pub fn with_getter(self, key: impl Into<String>, getter: Function) -> Self {
        self.define_getter(key, getter);
        self
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.0
            .borrow_mut()
            .insert(key.into(), Property::Data(value.into()));
    }

    pub fn define_getter(&self, key: impl Into<String>, getter: Function) {
        self.0
            .borrow_mut()
            .insert(key.into(), Property::Getter(getter));
    }

    /// Read a property. Missing keys read as `Undefined`; a getter that throws
    /// surfaces as `Err`.
    pub fn get(&self, key: &str) -> Completion {
        let property = self.0.borrow().get(key).cloned();
        match property {
            None => Ok(Value::Undefined),
            Some(Property::Data(value)) => Ok(value),
            Some(Property::Getter(getter)) => getter.call(&Value::Object(self.clone()), &[]),
        }
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Data properties only, in key order. Getters are not invoked.
    #[must_use]
    pub fn data_entries(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .iter()
            .filter_map(|(key, property)| match property {
                Property::Data(value) => Some((key.clone(), value.clone())),
                Property::Getter(_) => None,
            })
            .collect()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> *const () {
        Rc::as_ptr(&self.0).cast()
    }

    /// Start rendering this object. `None` means it is already being rendered
    /// by a caller, i.e. the value is circular.
    pub(crate) fn walk(&self) -> Option<Walk> {
        Walk::begin((self.addr(), ptr::null()))
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_walk) = self.walk() else {
            return f.write_str("[circular]");
        };
        f.debug_map().entries(self.0.borrow().iter()).finish()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        // Revisiting a pair already under comparison adds no new difference.
        let Some(_walk) = Walk::begin((self.addr(), other.addr())) else {
            return true;
        };
        *self.0.borrow() == *other.0.borrow()
    }
}

impl<K, V> FromIterator<(K, V)> for Object
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Self::new();
        for (key, value) in iter {
            object.set(key, value);
        }
        object
    }
}
