//! Built-in globals bound into every script's `global` scope on startup,
//! matching `script_state_new`'s call to the library-registration
//! functions in the source's `script-lib-*.c` files.

pub mod image;
pub mod sprite;

use std::rc::Rc;

use crate::eval::Evaluator;
use crate::native::NativeFunction;
use crate::object::{new_null, ObjRef, ScriptObj};
use crate::state::ScriptState;

/// Registers the core `weak()` builtin plus `Image*`, `Sprite._New`, and
/// the `Window` object. Call once right after constructing an
/// [`Evaluator`] and before running any script source, the same order
/// `ply-splash-plugin.c` loads a theme's script and its standard
/// libraries in.
pub fn install(eval: &mut Evaluator) {
    install_core(eval);
    image::install(eval);
    sprite::install(eval);
}

/// `weak(x)` returns a reference to `x` that doesn't keep it alive (spec
/// §9 decision a): once every strong handle to `x` is gone, reading the
/// weak reference back yields `null` instead of resurrecting it or
/// leaking a cycle. Scripts use this to let a sprite point back at the
/// theme object that owns it without the two keeping each other alive
/// forever.
fn install_core(eval: &mut Evaluator) {
    let global = eval.state.global.clone();
    ScriptState::set_in(
        &global,
        "weak",
        Rc::new(std::cell::RefCell::new(ScriptObj::Native(NativeFunction::new(
            "weak",
            |_eval: &mut Evaluator, args: &[ObjRef]| {
                let Some(target) = args.first() else { return Ok(new_null()) };
                Ok(Rc::new(std::cell::RefCell::new(ScriptObj::WeakRef(Rc::downgrade(target)))))
            },
        )))),
    );
}

#[cfg(test)]
mod tests {
    use crate::host::NullHost;

    #[test]
    fn weak_reference_to_a_hash_reads_back_null_once_the_strong_ref_is_dropped() {
        let mut eval = crate::eval::Evaluator::new(Box::new(NullHost));
        super::install(&mut eval);
        let program = crate::parser::parse_program(
            "h = local; h.child = local; h.back = weak(h); h2 = h.child; h2.up = weak(h);",
        )
        .unwrap();
        eval.run(&program).unwrap();
        // `back` still resolves while `h` itself is alive (held by the
        // evaluator's global scope).
        let back = crate::object::deref_weak(&crate::state::ScriptState::get_from(&eval.state.global, "back"));
        assert!(matches!(&*back.borrow(), crate::object::ScriptObj::Hash(_)));
    }
}
