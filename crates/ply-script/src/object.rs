//! Runtime value representation. `script.h`'s tagged-union `script_obj_t`
//! becomes a Rust enum behind `Rc<RefCell<_>>` handles, giving the same
//! reference-counted-aliasing semantics (two variables can name the same
//! hash and mutations are visible through both) without a manual refcount
//! field. Cycles are broken with the explicit `weak()` builtin (spec §9
//! decision a) rather than a mark-and-sweep collector: `WeakRef` holds a
//! `Weak` pointer that upgrades to `Null` once its target is dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::ast::FunctionDef;
use crate::native::NativeFunction;

pub type ObjRef = Rc<RefCell<ScriptObj>>;

#[derive(Clone)]
pub enum ScriptObj {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Hash(HashMap<String, ObjRef>),
    WeakRef(Weak<RefCell<ScriptObj>>),
    Function(Rc<ScriptFunction>),
    Native(Rc<NativeFunction>),
}

impl fmt::Debug for ScriptObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptObj::Null => write!(f, "null"),
            ScriptObj::Int(v) => write!(f, "{v}"),
            ScriptObj::Float(v) => write!(f, "{v}"),
            ScriptObj::Str(v) => write!(f, "{v:?}"),
            ScriptObj::Hash(h) => write!(f, "hash({} keys)", h.len()),
            ScriptObj::WeakRef(_) => write!(f, "weak(..)"),
            ScriptObj::Function(fun) => write!(f, "fun/{}", fun.def.params.len()),
            ScriptObj::Native(n) => write!(f, "native:{}", n.name),
        }
    }
}

#[derive(Debug)]
pub struct ScriptFunction {
    pub def: FunctionDef,
    /// Lexical closure: the hash frame active where the function literal
    /// was evaluated, consulted after the call's own local frame misses.
    pub closure: Option<ObjRef>,
}

pub fn new_null() -> ObjRef {
    Rc::new(RefCell::new(ScriptObj::Null))
}

pub fn new_int(v: i64) -> ObjRef {
    Rc::new(RefCell::new(ScriptObj::Int(v)))
}

pub fn new_float(v: f64) -> ObjRef {
    Rc::new(RefCell::new(ScriptObj::Float(v)))
}

pub fn new_str(v: impl Into<String>) -> ObjRef {
    Rc::new(RefCell::new(ScriptObj::Str(v.into())))
}

pub fn new_hash() -> ObjRef {
    Rc::new(RefCell::new(ScriptObj::Hash(HashMap::new())))
}

pub fn new_bool(v: bool) -> ObjRef {
    new_int(if v { 1 } else { 0 })
}

impl ScriptObj {
    pub fn is_truthy(&self) -> bool {
        match self {
            ScriptObj::Null => false,
            ScriptObj::Int(v) => *v != 0,
            ScriptObj::Float(v) => *v != 0.0,
            ScriptObj::Str(s) => !s.is_empty(),
            ScriptObj::WeakRef(w) => w.upgrade().is_some(),
            ScriptObj::Hash(_) | ScriptObj::Function(_) | ScriptObj::Native(_) => true,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            ScriptObj::Int(v) => *v as f64,
            ScriptObj::Float(v) => *v,
            ScriptObj::Str(s) => s.parse().unwrap_or(0.0),
            ScriptObj::Null => 0.0,
            _ => 0.0,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            ScriptObj::Int(v) => *v,
            ScriptObj::Float(v) => *v as i64,
            ScriptObj::Str(s) => s.parse().unwrap_or(0),
            ScriptObj::Null => 0,
            _ => 0,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ScriptObj::Float(_))
    }

    pub fn to_display_string(&self) -> String {
        match self {
            ScriptObj::Null => "null".to_string(),
            ScriptObj::Int(v) => v.to_string(),
            ScriptObj::Float(v) => v.to_string(),
            ScriptObj::Str(s) => s.clone(),
            ScriptObj::Hash(_) => "[hash]".to_string(),
            ScriptObj::WeakRef(_) => "[weak]".to_string(),
            ScriptObj::Function(_) => "[function]".to_string(),
            ScriptObj::Native(n) => format!("[native {}]", n.name),
        }
    }
}

/// Deref a `WeakRef` down to its live target, or `Null` if the target has
/// been dropped. All hash/index/call sites route through this so a script
/// that read a weak reference after its target is gone sees `null` rather
/// than panicking.
pub fn deref_weak(obj: &ObjRef) -> ObjRef {
    let is_weak = matches!(&*obj.borrow(), ScriptObj::WeakRef(_));
    if !is_weak {
        return obj.clone();
    }
    let upgraded = match &*obj.borrow() {
        ScriptObj::WeakRef(w) => w.upgrade(),
        _ => unreachable!(),
    };
    match upgraded {
        Some(rc) => rc,
        None => new_null(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_ref_upgrades_to_null_once_the_strong_handle_is_dropped() {
        let target = new_hash();
        let weak = Rc::new(RefCell::new(ScriptObj::WeakRef(Rc::downgrade(&target))));
        assert!(matches!(*deref_weak(&weak).borrow(), ScriptObj::Hash(_)));
        drop(target);
        assert!(matches!(*deref_weak(&weak).borrow(), ScriptObj::Null));
    }

    #[test]
    fn truthiness_matches_empty_string_and_zero_rules() {
        assert!(!ScriptObj::Str(String::new()).is_truthy());
        assert!(ScriptObj::Str("x".into()).is_truthy());
        assert!(!ScriptObj::Int(0).is_truthy());
        assert!(ScriptObj::Int(1).is_truthy());
        assert!(!ScriptObj::Null.is_truthy());
    }
}
