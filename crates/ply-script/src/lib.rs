#![forbid(unsafe_code)]

//! Embedded scripting runtime for script-driven splash themes (spec §4.8).
//!
//! Grounded on `original_source/src/plugins/splash/script/{script.h,
//! script.c,script-parse.c,script-lib-image.c,script-lib-sprite.c}` for
//! grammar, precedence, and the native standard library surface. The
//! object model trades the source's manual refcounted tagged union for
//! `Rc<RefCell<ScriptObj>>` handles with an explicit `weak()` builtin for
//! cycle-breaking (spec §9 decision a), and native functions are plain
//! Rust closures rather than a `void *user_data` C-FFI shape.

pub mod ast;
pub mod eval;
pub mod host;
pub mod lexer;
pub mod native;
pub mod object;
pub mod parser;
pub mod state;
pub mod stdlib;

pub use eval::{Evaluator, ScriptError};
pub use host::{ImageHandle, ImageSize, ScriptHost, SpriteHandle};
pub use object::{ObjRef, ScriptObj};
pub use parser::ParseError;

/// Parse and run a theme script's top-level source against a fresh
/// evaluator with the standard library installed, the same sequence
/// `ply-splash-plugin.c` performs for a `.script`-backed theme: load the
/// script once at `create`, then call its hook functions by name for the
/// rest of the theme's lifetime.
pub fn load(source: &str, host: Box<dyn ScriptHost>) -> Result<Evaluator, LoadError> {
    let program = parser::parse_program(source).inspect_err(|e| {
        tracing::warn!("script failed to parse: {e}");
    })?;
    let mut eval = Evaluator::new(host);
    stdlib::install(&mut eval);
    eval.run(&program).inspect_err(|e| {
        tracing::warn!("script top level raised an error: {e}");
    })?;
    Ok(eval)
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] ScriptError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;

    #[test]
    fn load_runs_top_level_statements_and_defines_functions() {
        let eval = load(
            "fun refresh_background() { Window.GetWidth(); } x = 1 + 1;",
            Box::new(NullHost),
        )
        .unwrap();
        assert_eq!(eval.state.get_var("x").borrow().as_i64(), 2);
    }

    #[test]
    fn load_surfaces_parse_errors() {
        let err = load("x = ;", Box::new(NullHost));
        assert!(matches!(err, Err(LoadError::Parse(_))));
    }
}
