//! Native function bridge. `script_add_native_function`'s C signature
//! (`script_obj_t *(*)(script_state_t*, void*)` plus a `void *user_data`)
//! becomes an idiomatic Rust closure capturing its environment directly —
//! there's no need to thread an opaque `user_data` pointer through when
//! closures already own what they need. This is a deliberate deviation
//! from the source's C-FFI shape, noted in the grounding ledger.

use std::rc::Rc;

use crate::eval::{Evaluator, ScriptError};
use crate::object::ObjRef;

pub struct NativeFunction {
    pub name: String,
    #[allow(clippy::type_complexity)]
    func: Box<dyn Fn(&mut Evaluator, &[ObjRef]) -> Result<ObjRef, ScriptError>>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut Evaluator, &[ObjRef]) -> Result<ObjRef, ScriptError> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self { name: name.into(), func: Box::new(func) })
    }

    pub fn call(&self, eval: &mut Evaluator, args: &[ObjRef]) -> Result<ObjRef, ScriptError> {
        (self.func)(eval, args)
    }
}
