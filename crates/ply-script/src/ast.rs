//! AST node types produced by the parser, matching the expression/statement
//! shapes in `script.h`'s `script_exp_type`/`script_op_type` enums closely
//! enough to keep the grounding obvious, while using Rust enums/boxes
//! instead of the original's tagged unions.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    /// Bare identifier reference, resolved local-then-global at eval time.
    Var(String),
    /// `local` / `global` pseudo-variables used as explicit scope targets.
    LocalRoot,
    GlobalRoot,
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Prefix `++`/`--`: `delta` is `+1`/`-1`.
    PreIncDec { target: Box<Expr>, delta: i64 },
    /// Postfix `++`/`--`.
    PostIncDec { target: Box<Expr>, delta: i64 },
    Assign { target: Box<Expr>, value: Box<Expr> },
    CompoundAssign { op: CompoundOp, target: Box<Expr>, value: Box<Expr> },
    /// `obj.member`
    Member(Box<Expr>, String),
    /// `obj[index]`
    Index(Box<Expr>, Box<Expr>),
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// Hash-literal constructor used internally by `local`/`global` roots
    /// and by nothing the surface syntax spells directly; kept for
    /// evaluator symmetry with `script_obj_new_hash`.
    NewHash,
    Fun(FunctionDef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Block(Vec<Stmt>),
    If { cond: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>> },
    While { cond: Expr, body: Vec<Stmt> },
    /// Desugared exactly as `script_parse_for` does: `init` runs once,
    /// then `cond`/`body`/`step` repeat like a `while`.
    For { init: Box<Stmt>, cond: Expr, step: Box<Stmt>, body: Vec<Stmt> },
    FunDef { name: String, def: FunctionDef },
    Return(Option<Expr>),
    Break,
    Continue,
}
