//! Tree-walking evaluator. Functions don't close over their defining
//! scope (matching `script_state_init_sub`, which always starts a call
//! with a fresh local hash): only the single shared `global` hash and a
//! call's own locals are visible inside it, exactly as in the source.

use std::rc::Rc;

use crate::ast::{BinOp, CompoundOp, Expr, Stmt, UnOp};
use crate::host::ScriptHost;
use crate::object::{deref_weak, new_bool, new_float, new_int, new_null, new_str, ObjRef, ScriptFunction, ScriptObj};
use crate::state::ScriptState;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("{0}")]
    Runtime(String),
    #[error("break outside a loop")]
    BreakOutsideLoop,
    #[error("continue outside a loop")]
    ContinueOutsideLoop,
}

fn runtime_err(msg: impl Into<String>) -> ScriptError {
    ScriptError::Runtime(msg.into())
}

/// Non-local control flow produced while executing a statement list.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(ObjRef),
}

pub struct Evaluator {
    pub state: ScriptState,
    pub host: Box<dyn ScriptHost>,
}

impl Evaluator {
    pub fn new(host: Box<dyn ScriptHost>) -> Self {
        Self { state: ScriptState::new(), host }
    }

    /// Run a top-level statement list (a whole parsed script, or a
    /// callback body such as a refresh handler). Top-level `return`
    /// simply ends evaluation early; `break`/`continue` outside a loop
    /// are errors.
    pub fn run(&mut self, program: &[Stmt]) -> Result<(), ScriptError> {
        match self.exec_block(program)? {
            Flow::Normal | Flow::Return(_) => Ok(()),
            Flow::Break => Err(ScriptError::BreakOutsideLoop),
            Flow::Continue => Err(ScriptError::ContinueOutsideLoop),
        }
    }

    /// Call a named global function (used by the host to invoke lifecycle
    /// hooks like `refresh_splash` after loading a script).
    pub fn call_global_function(&mut self, name: &str, args: &[ObjRef]) -> Result<ObjRef, ScriptError> {
        let func = self.state.get_var(name);
        self.call_value(&func, args)
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, ScriptError> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, ScriptError> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Block(body) => self.exec_block(body),
            Stmt::If { cond, then_branch, else_branch } => {
                if self.eval(cond)?.borrow().is_truthy() {
                    self.exec_block(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.exec_block(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.borrow().is_truthy() {
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For { init, cond, step, body } => {
                self.exec_stmt(init)?;
                while self.eval(cond)?.borrow().is_truthy() {
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    self.exec_stmt(step)?;
                }
                Ok(Flow::Normal)
            }
            Stmt::FunDef { name, def } => {
                let func = Rc::new(ScriptFunction { def: def.clone(), closure: None });
                self.state.set_var(name, Rc::new(std::cell::RefCell::new(ScriptObj::Function(func))));
                Ok(Flow::Normal)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(e) => self.eval(e)?,
                    None => new_null(),
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<ObjRef, ScriptError> {
        match expr {
            Expr::Null => Ok(new_null()),
            Expr::Int(v) => Ok(new_int(*v)),
            Expr::Float(v) => Ok(new_float(*v)),
            Expr::Str(s) => Ok(new_str(s.clone())),
            Expr::Var(name) => Ok(self.state.get_var(name)),
            Expr::LocalRoot => Ok(self.state.current_local()),
            Expr::GlobalRoot => Ok(self.state.global.clone()),
            Expr::Unary(op, operand) => self.eval_unary(*op, operand),
            Expr::Binary(op, lhs, rhs) => self.eval_binary(*op, lhs, rhs),
            Expr::PreIncDec { target, delta } => self.eval_inc_dec(target, *delta, true),
            Expr::PostIncDec { target, delta } => self.eval_inc_dec(target, *delta, false),
            Expr::Assign { target, value } => {
                let v = self.eval(value)?;
                self.assign(target, v.clone())?;
                Ok(v)
            }
            Expr::CompoundAssign { op, target, value } => {
                let current = self.eval(target)?;
                let rhs = self.eval(value)?;
                let result = Self::apply_compound(*op, &current.borrow(), &rhs.borrow());
                self.assign(target, result.clone())?;
                Ok(result)
            }
            Expr::Member(obj, name) => {
                let obj = deref_weak(&self.eval(obj)?);
                Ok(ScriptState::get_from(&obj, name))
            }
            Expr::Index(obj, idx) => {
                let obj = deref_weak(&self.eval(obj)?);
                let key = self.eval(idx)?.borrow().to_display_string();
                Ok(ScriptState::get_from(&obj, &key))
            }
            Expr::Call { callee, args } => {
                let callee_val = self.eval(callee)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for a in args {
                    arg_values.push(self.eval(a)?);
                }
                self.call_value(&callee_val, &arg_values)
            }
            Expr::NewHash => Ok(crate::object::new_hash()),
            Expr::Fun(def) => {
                let func = Rc::new(ScriptFunction { def: def.clone(), closure: None });
                Ok(Rc::new(std::cell::RefCell::new(ScriptObj::Function(func))))
            }
        }
    }

    fn call_value(&mut self, callee: &ObjRef, args: &[ObjRef]) -> Result<ObjRef, ScriptError> {
        let callee = deref_weak(callee);
        let kind = callee.borrow().clone();
        match kind {
            ScriptObj::Native(native) => native.call(self, args),
            ScriptObj::Function(func) => self.call_script_function(&func, args),
            other => Err(runtime_err(format!("attempted to call a non-callable value: {other:?}"))),
        }
    }

    fn call_script_function(&mut self, func: &Rc<ScriptFunction>, args: &[ObjRef]) -> Result<ObjRef, ScriptError> {
        self.state.push_frame();
        for (i, param) in func.def.params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or_else(new_null);
            self.state.set_var(param, value);
        }
        let result = self.exec_block(&func.def.body);
        self.state.pop_frame();
        match result? {
            Flow::Return(v) => Ok(v),
            _ => Ok(new_null()),
        }
    }

    fn assign(&mut self, target: &Expr, value: ObjRef) -> Result<(), ScriptError> {
        match target {
            Expr::Var(name) => {
                self.state.set_var(name, value);
                Ok(())
            }
            Expr::Member(obj, name) => {
                let obj = deref_weak(&self.eval(obj)?);
                ScriptState::set_in(&obj, name, value);
                Ok(())
            }
            Expr::Index(obj, idx) => {
                let obj = deref_weak(&self.eval(obj)?);
                let key = self.eval(idx)?.borrow().to_display_string();
                ScriptState::set_in(&obj, &key, value);
                Ok(())
            }
            _ => Err(runtime_err("invalid assignment target")),
        }
    }

    fn eval_unary(&mut self, op: UnOp, operand: &Expr) -> Result<ObjRef, ScriptError> {
        let v = self.eval(operand)?;
        let v = v.borrow();
        Ok(match op {
            UnOp::Not => new_bool(!v.is_truthy()),
            UnOp::Pos => {
                if v.is_float() {
                    new_float(v.as_f64())
                } else {
                    new_int(v.as_i64())
                }
            }
            UnOp::Neg => {
                if v.is_float() {
                    new_float(-v.as_f64())
                } else {
                    new_int(-v.as_i64())
                }
            }
        })
    }

    fn eval_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<ObjRef, ScriptError> {
        if matches!(op, BinOp::And) {
            let l = self.eval(lhs)?;
            if !l.borrow().is_truthy() {
                return Ok(new_bool(false));
            }
            let r = self.eval(rhs)?;
            return Ok(new_bool(r.borrow().is_truthy()));
        }
        if matches!(op, BinOp::Or) {
            let l = self.eval(lhs)?;
            if l.borrow().is_truthy() {
                return Ok(new_bool(true));
            }
            let r = self.eval(rhs)?;
            return Ok(new_bool(r.borrow().is_truthy()));
        }

        let l = self.eval(lhs)?;
        let r = self.eval(rhs)?;
        let l = l.borrow();
        let r = r.borrow();

        Ok(match op {
            BinOp::Add => {
                if matches!(&*l, ScriptObj::Str(_)) || matches!(&*r, ScriptObj::Str(_)) {
                    new_str(format!("{}{}", l.to_display_string(), r.to_display_string()))
                } else if l.is_float() || r.is_float() {
                    new_float(l.as_f64() + r.as_f64())
                } else {
                    new_int(l.as_i64() + r.as_i64())
                }
            }
            BinOp::Sub => numeric_binop(&l, &r, |a, b| a - b, |a, b| a - b),
            BinOp::Mul => numeric_binop(&l, &r, |a, b| a * b, |a, b| a * b),
            BinOp::Div => new_float(l.as_f64() / r.as_f64()),
            BinOp::Mod => {
                let divisor = r.as_i64();
                new_int(if divisor == 0 { 0 } else { l.as_i64() % divisor })
            }
            BinOp::Eq => new_bool(values_equal(&l, &r)),
            BinOp::NotEq => new_bool(!values_equal(&l, &r)),
            BinOp::Lt => new_bool(l.as_f64() < r.as_f64()),
            BinOp::LtEq => new_bool(l.as_f64() <= r.as_f64()),
            BinOp::Gt => new_bool(l.as_f64() > r.as_f64()),
            BinOp::GtEq => new_bool(l.as_f64() >= r.as_f64()),
            BinOp::And | BinOp::Or => unreachable!("handled above with short-circuit evaluation"),
        })
    }

    fn eval_inc_dec(&mut self, target: &Expr, delta: i64, is_prefix: bool) -> Result<ObjRef, ScriptError> {
        let old = self.eval(target)?;
        let old_is_float = old.borrow().is_float();
        let new_value = if old_is_float {
            new_float(old.borrow().as_f64() + delta as f64)
        } else {
            new_int(old.borrow().as_i64() + delta)
        };
        self.assign(target, new_value.clone())?;
        Ok(if is_prefix { new_value } else { old })
    }

    fn apply_compound(op: CompoundOp, current: &ScriptObj, rhs: &ScriptObj) -> ObjRef {
        match op {
            CompoundOp::Add => {
                if matches!(current, ScriptObj::Str(_)) || matches!(rhs, ScriptObj::Str(_)) {
                    new_str(format!("{}{}", current.to_display_string(), rhs.to_display_string()))
                } else if current.is_float() || rhs.is_float() {
                    new_float(current.as_f64() + rhs.as_f64())
                } else {
                    new_int(current.as_i64() + rhs.as_i64())
                }
            }
            CompoundOp::Sub => numeric_binop(current, rhs, |a, b| a - b, |a, b| a - b),
            CompoundOp::Mul => numeric_binop(current, rhs, |a, b| a * b, |a, b| a * b),
            CompoundOp::Div => new_float(current.as_f64() / rhs.as_f64()),
            CompoundOp::Mod => {
                let r = rhs.as_i64();
                new_int(if r == 0 { 0 } else { current.as_i64() % r })
            }
        }
    }
}

fn numeric_binop(l: &ScriptObj, r: &ScriptObj, f_int: impl Fn(i64, i64) -> i64, f_float: impl Fn(f64, f64) -> f64) -> ObjRef {
    if l.is_float() || r.is_float() {
        new_float(f_float(l.as_f64(), r.as_f64()))
    } else {
        new_int(f_int(l.as_i64(), r.as_i64()))
    }
}

fn values_equal(l: &ScriptObj, r: &ScriptObj) -> bool {
    match (l, r) {
        (ScriptObj::Str(a), ScriptObj::Str(b)) => a == b,
        (ScriptObj::Null, ScriptObj::Null) => true,
        (ScriptObj::Null, _) | (_, ScriptObj::Null) => false,
        _ => l.as_f64() == r.as_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;
    use crate::parser::parse_program;

    fn run(src: &str) -> Evaluator {
        let program = parse_program(src).unwrap();
        let mut eval = Evaluator::new(Box::new(NullHost));
        eval.run(&program).unwrap();
        eval
    }

    #[test]
    fn arithmetic_and_variable_assignment() {
        let mut eval = run("x = 2 + 3 * 4;");
        assert_eq!(eval.state.get_var("x").borrow().as_i64(), 14);
    }

    #[test]
    fn string_concatenation_with_plus() {
        let eval = run(r#"s = "a" + "b" + 1;"#);
        assert_eq!(eval.state.get_var("s").borrow().to_display_string(), "ab1");
    }

    #[test]
    fn while_loop_accumulates() {
        let eval = run("i = 0; total = 0; while (i < 5) { total = total + i; i = i + 1; }");
        assert_eq!(eval.state.get_var("total").borrow().as_i64(), 10);
    }

    #[test]
    fn for_loop_matches_desugared_while_semantics() {
        let eval = run("total = 0; for (i = 0; i < 4; i++) { total = total + i; }");
        assert_eq!(eval.state.get_var("total").borrow().as_i64(), 6);
    }

    #[test]
    fn function_call_returns_value_and_does_not_leak_locals() {
        let eval = run("fun add(a, b) { return a + b; } r = add(3, 4);");
        assert_eq!(eval.state.get_var("r").borrow().as_i64(), 7);
        assert!(matches!(&*eval.state.get_var("a").borrow(), ScriptObj::Null));
    }

    #[test]
    fn recursive_function_call() {
        let eval = run(
            "fun fact(n) { if (n <= 1) { return 1; } return n * fact(n - 1); } r = fact(5);",
        );
        assert_eq!(eval.state.get_var("r").borrow().as_i64(), 120);
    }

    #[test]
    fn break_and_continue_affect_only_the_enclosing_loop() {
        let eval = run(
            "total = 0; for (i = 0; i < 10; i++) { if (i == 5) { break; } if (i % 2 == 0) { continue; } total = total + i; }",
        );
        assert_eq!(eval.state.get_var("total").borrow().as_i64(), 1 + 3);
    }

    #[test]
    fn hash_member_and_index_assignment() {
        let eval = run(r#"h = local; h.a = 1; h["b"] = 2; x = h.a + h["b"];"#);
        assert_eq!(eval.state.get_var("x").borrow().as_i64(), 3);
    }

    #[test]
    fn postfix_increment_returns_old_value_prefix_returns_new() {
        let eval = run("a = 5; b = a++; c = ++a;");
        assert_eq!(eval.state.get_var("b").borrow().as_i64(), 5);
        assert_eq!(eval.state.get_var("c").borrow().as_i64(), 7);
    }

    #[test]
    fn global_root_is_shared_across_function_calls() {
        let eval = run("global.counter = 0; fun bump() { global.counter = global.counter + 1; } bump(); bump();");
        assert_eq!(ScriptState::get_from(&eval.state.global, "counter").borrow().as_i64(), 2);
    }
}
