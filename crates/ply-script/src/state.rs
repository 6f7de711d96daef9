//! Variable binding scopes. Mirrors `script_state_new`/`script_state_init_sub`:
//! one refcounted hash shared for the whole run's global scope, and a fresh
//! local hash pushed per function call / `{ }` block that evaluates
//! `local`/`global` as first-class hash references.

use crate::object::{new_hash, ObjRef, ScriptObj};

pub struct ScriptState {
    pub global: ObjRef,
    locals: Vec<ObjRef>,
}

impl ScriptState {
    /// At the top level there is no call frame yet, so `local` and
    /// `global` name the same hash, matching the source running a
    /// script's top-level statements directly in global scope.
    pub fn new() -> Self {
        let global = new_hash();
        Self { locals: vec![global.clone()], global }
    }

    pub fn current_local(&self) -> ObjRef {
        self.locals.last().expect("local scope stack is never empty").clone()
    }

    /// Push a fresh local frame, used when entering a function call.
    pub fn push_frame(&mut self) {
        self.locals.push(new_hash());
    }

    /// Push an existing hash as the local frame, used for closures that
    /// should resume writing into their defining scope.
    pub fn push_frame_with(&mut self, hash: ObjRef) {
        self.locals.push(hash);
    }

    pub fn pop_frame(&mut self) {
        self.locals.pop();
        if self.locals.is_empty() {
            self.locals.push(new_hash());
        }
    }

    /// Read: local frame first, then global, per spec.md's description of
    /// `local`/`global` as the two name-resolution roots.
    pub fn get_var(&self, name: &str) -> ObjRef {
        if let ScriptObj::Hash(h) = &*self.current_local().borrow() {
            if let Some(v) = h.get(name) {
                return v.clone();
            }
        }
        if let ScriptObj::Hash(h) = &*self.global.borrow() {
            if let Some(v) = h.get(name) {
                return v.clone();
            }
        }
        crate::object::new_null()
    }

    /// Write: update an existing binding wherever it already lives (local
    /// takes priority over global), otherwise create a new one in the
    /// local frame.
    pub fn set_var(&mut self, name: &str, value: ObjRef) {
        let local = self.current_local();
        let exists_locally = matches!(&*local.borrow(), ScriptObj::Hash(h) if h.contains_key(name));
        if exists_locally {
            if let ScriptObj::Hash(h) = &mut *local.borrow_mut() {
                h.insert(name.to_string(), value);
            }
            return;
        }
        let exists_globally = matches!(&*self.global.borrow(), ScriptObj::Hash(h) if h.contains_key(name));
        if exists_globally {
            if let ScriptObj::Hash(h) = &mut *self.global.borrow_mut() {
                h.insert(name.to_string(), value);
            }
            return;
        }
        if let ScriptObj::Hash(h) = &mut *local.borrow_mut() {
            h.insert(name.to_string(), value);
        }
    }

    pub fn set_in(root: &ObjRef, name: &str, value: ObjRef) {
        if let ScriptObj::Hash(h) = &mut *root.borrow_mut() {
            h.insert(name.to_string(), value);
        }
    }

    pub fn get_from(root: &ObjRef, name: &str) -> ObjRef {
        if let ScriptObj::Hash(h) = &*root.borrow() {
            if let Some(v) = h.get(name) {
                return v.clone();
            }
        }
        crate::object::new_null()
    }
}

impl Default for ScriptState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::new_int;

    #[test]
    fn top_level_writes_land_in_global_since_there_is_no_call_frame_yet() {
        let mut state = ScriptState::new();
        state.set_var("x", new_int(5));
        assert_eq!(state.get_var("x").borrow().as_i64(), 5);
        assert_eq!(ScriptState::get_from(&state.global, "x").borrow().as_i64(), 5);
    }

    #[test]
    fn local_binding_inside_a_pushed_frame_shadows_a_global_of_the_same_name() {
        let mut state = ScriptState::new();
        ScriptState::set_in(&state.global.clone(), "x", new_int(1));
        state.push_frame();
        state.set_var("x", new_int(2));
        assert_eq!(state.get_var("x").borrow().as_i64(), 2);
        assert_eq!(ScriptState::get_from(&state.global, "x").borrow().as_i64(), 1);
        state.pop_frame();
    }

    #[test]
    fn popping_the_last_frame_leaves_a_usable_empty_one() {
        let mut state = ScriptState::new();
        state.pop_frame();
        state.set_var("x", new_int(9));
        assert_eq!(state.get_var("x").borrow().as_i64(), 9);
    }
}
