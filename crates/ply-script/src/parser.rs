//! Recursive-descent, precedence-climbing expression parser plus a
//! statement parser, both following `script-parse.c`'s grammar and
//! precedence table exactly:
//!
//! ```text
//! assignment  (right-assoc =, +=, -=, *=, /=, %=)
//! ||                                            (0, lowest)
//! &&                                            (1)
//! == !=                                         (2)
//! >= <= > <                                     (3)
//! + -                                           (4)
//! * / %                                         (5, highest binary)
//! unary  + - ! ++ --
//! postfix  ++ -- . [] ()
//! ```

use crate::ast::{BinOp, CompoundOp, Expr, FunctionDef, Stmt, UnOp};
use crate::lexer::{Lexer, Token, TokenKind};

#[derive(Debug, thiserror::Error)]
#[error("parse error L:{line} C:{column}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

pub fn parse_program(source: &str) -> Result<Vec<Stmt>, ParseError> {
    let tokens = Lexer::new(source).tokenize().map_err(|e| ParseError {
        line: e.line,
        column: e.column,
        message: e.message,
    })?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut stmts = Vec::new();
    while !parser.at_eof() {
        stmts.push(parser.parse_statement()?);
    }
    Ok(stmts)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        let tok = self.peek();
        ParseError { line: tok.line, column: tok.column, message: message.into() }
    }

    fn expect_symbol(&mut self, c: char) -> Result<(), ParseError> {
        if self.peek().is_symbol(c) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{c}'")))
        }
    }

    /// Two adjacent symbol tokens with no whitespace between them fuse into
    /// one multi-char operator, mirroring the original's whitespace check
    /// for telling `a++` from `a + +b` apart.
    fn match_fused(&mut self, first: char, second: char) -> bool {
        if self.peek().is_symbol(first) {
            if let Some(next) = self.peek_next() {
                if next.is_symbol(second) && !next.preceded_by_whitespace {
                    self.advance();
                    self.advance();
                    return true;
                }
            }
        }
        false
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        if self.peek().is_symbol('{') {
            return Ok(Stmt::Block(self.parse_block()?));
        }
        if self.peek().is_identifier("if") {
            return self.parse_if();
        }
        if self.peek().is_identifier("while") {
            return self.parse_while();
        }
        if self.peek().is_identifier("for") {
            return self.parse_for();
        }
        if self.peek().is_identifier("fun") {
            return self.parse_fun_def();
        }
        if self.peek().is_identifier("return") {
            self.advance();
            let value = if self.peek().is_symbol(';') { None } else { Some(self.parse_expression()?) };
            self.expect_symbol(';')?;
            return Ok(Stmt::Return(value));
        }
        if self.peek().is_identifier("break") {
            self.advance();
            self.expect_symbol(';')?;
            return Ok(Stmt::Break);
        }
        if self.peek().is_identifier("continue") {
            self.advance();
            self.expect_symbol(';')?;
            return Ok(Stmt::Continue);
        }

        let expr = self.parse_expression()?;
        self.expect_symbol(';')?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_symbol('{')?;
        let mut stmts = Vec::new();
        while !self.peek().is_symbol('}') {
            if self.at_eof() {
                return Err(self.err("unexpected end of input inside block"));
            }
            stmts.push(self.parse_statement()?);
        }
        self.expect_symbol('}')?;
        Ok(stmts)
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.advance(); // 'if'
        self.expect_symbol('(')?;
        let cond = self.parse_expression()?;
        self.expect_symbol(')')?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.peek().is_identifier("else") {
            self.advance();
            if self.peek().is_identifier("if") {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If { cond, then_branch, else_branch })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        self.advance(); // 'while'
        self.expect_symbol('(')?;
        let cond = self.parse_expression()?;
        self.expect_symbol(')')?;
        let body = self.parse_block()?;
        Ok(Stmt::While { cond, body })
    }

    /// `for (init; cond; step) body` desugars at parse time into
    /// `{ init; while (cond) { body; step; } }`, exactly matching
    /// `script_parse_for`'s handling (the `step` expression runs as the
    /// last statement of each iteration's body).
    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.advance(); // 'for'
        self.expect_symbol('(')?;
        let init = Box::new(Stmt::Expr(self.parse_expression()?));
        self.expect_symbol(';')?;
        let cond = self.parse_expression()?;
        self.expect_symbol(';')?;
        let step = Box::new(Stmt::Expr(self.parse_expression()?));
        self.expect_symbol(')')?;
        let body = self.parse_block()?;
        Ok(Stmt::For { init, cond, step, body })
    }

    fn parse_fun_def(&mut self) -> Result<Stmt, ParseError> {
        self.advance(); // 'fun'
        let name = self.parse_identifier_name()?;
        let def = self.parse_function_tail()?;
        Ok(Stmt::FunDef { name, def })
    }

    fn parse_identifier_name(&mut self) -> Result<String, ParseError> {
        match self.advance().kind {
            TokenKind::Identifier(name) => Ok(name),
            _ => Err(self.err("expected identifier")),
        }
    }

    fn parse_function_tail(&mut self) -> Result<FunctionDef, ParseError> {
        self.expect_symbol('(')?;
        let mut params = Vec::new();
        if !self.peek().is_symbol(')') {
            loop {
                params.push(self.parse_identifier_name()?);
                if self.peek().is_symbol(',') {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_symbol(')')?;
        let body = self.parse_block()?;
        Ok(FunctionDef { params, body })
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.parse_logical_or()?;

        let compound = if self.match_fused('+', '=') {
            Some(CompoundOp::Add)
        } else if self.match_fused('-', '=') {
            Some(CompoundOp::Sub)
        } else if self.match_fused('*', '=') {
            Some(CompoundOp::Mul)
        } else if self.match_fused('/', '=') {
            Some(CompoundOp::Div)
        } else if self.match_fused('%', '=') {
            Some(CompoundOp::Mod)
        } else {
            None
        };
        if let Some(op) = compound {
            let value = self.parse_assignment()?;
            return Ok(Expr::CompoundAssign { op, target: Box::new(target), value: Box::new(value) });
        }

        // plain '=' but not '==' (already consumed as Eq by parse_equality
        // if it was meant as comparison; here only a lone '=' remains).
        if self.peek().is_symbol('=') && !matches!(self.peek_next(), Some(t) if t.is_symbol('=') && !t.preceded_by_whitespace) {
            self.advance();
            let value = self.parse_assignment()?;
            return Ok(Expr::Assign { target: Box::new(target), value: Box::new(value) });
        }

        Ok(target)
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_logical_and()?;
        while self.match_fused('|', '|') {
            let right = self.parse_logical_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.match_fused('&', '&') {
            let right = self.parse_equality()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_relational()?;
        loop {
            if self.match_fused('=', '=') {
                let right = self.parse_relational()?;
                left = Expr::Binary(BinOp::Eq, Box::new(left), Box::new(right));
            } else if self.match_fused('!', '=') {
                let right = self.parse_relational()?;
                left = Expr::Binary(BinOp::NotEq, Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            if self.match_fused('>', '=') {
                let right = self.parse_additive()?;
                left = Expr::Binary(BinOp::GtEq, Box::new(left), Box::new(right));
            } else if self.match_fused('<', '=') {
                let right = self.parse_additive()?;
                left = Expr::Binary(BinOp::LtEq, Box::new(left), Box::new(right));
            } else if self.peek().is_symbol('>') {
                self.advance();
                let right = self.parse_additive()?;
                left = Expr::Binary(BinOp::Gt, Box::new(left), Box::new(right));
            } else if self.peek().is_symbol('<') {
                self.advance();
                let right = self.parse_additive()?;
                left = Expr::Binary(BinOp::Lt, Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            if self.peek().is_symbol('+') && !self.next_is_plusplus_or_plusequals() {
                self.advance();
                let right = self.parse_multiplicative()?;
                left = Expr::Binary(BinOp::Add, Box::new(left), Box::new(right));
            } else if self.peek().is_symbol('-') && !self.next_is_minusminus_or_minusequals() {
                self.advance();
                let right = self.parse_multiplicative()?;
                left = Expr::Binary(BinOp::Sub, Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn next_is_plusplus_or_plusequals(&self) -> bool {
        matches!(self.peek_next(), Some(t) if (t.is_symbol('+') || t.is_symbol('=')) && !t.preceded_by_whitespace)
    }

    fn next_is_minusminus_or_minusequals(&self) -> bool {
        matches!(self.peek_next(), Some(t) if (t.is_symbol('-') || t.is_symbol('=')) && !t.preceded_by_whitespace)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            if self.peek().is_symbol('*') {
                self.advance();
                let right = self.parse_unary()?;
                left = Expr::Binary(BinOp::Mul, Box::new(left), Box::new(right));
            } else if self.peek().is_symbol('/') {
                self.advance();
                let right = self.parse_unary()?;
                left = Expr::Binary(BinOp::Div, Box::new(left), Box::new(right));
            } else if self.peek().is_symbol('%') {
                self.advance();
                let right = self.parse_unary()?;
                left = Expr::Binary(BinOp::Mod, Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.match_fused('+', '+') {
            let target = self.parse_unary()?;
            return Ok(Expr::PreIncDec { target: Box::new(target), delta: 1 });
        }
        if self.match_fused('-', '-') {
            let target = self.parse_unary()?;
            return Ok(Expr::PreIncDec { target: Box::new(target), delta: -1 });
        }
        if self.peek().is_symbol('-') {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnOp::Neg, Box::new(operand)));
        }
        if self.peek().is_symbol('+') {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnOp::Pos, Box::new(operand)));
        }
        if self.peek().is_symbol('!') {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnOp::Not, Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.match_fused('+', '+') {
                expr = Expr::PostIncDec { target: Box::new(expr), delta: 1 };
            } else if self.match_fused('-', '-') {
                expr = Expr::PostIncDec { target: Box::new(expr), delta: -1 };
            } else if self.peek().is_symbol('.') {
                self.advance();
                let name = self.parse_identifier_name()?;
                expr = Expr::Member(Box::new(expr), name);
            } else if self.peek().is_symbol('[') {
                self.advance();
                let index = self.parse_expression()?;
                self.expect_symbol(']')?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.peek().is_symbol('(') {
                self.advance();
                let mut args = Vec::new();
                if !self.peek().is_symbol(')') {
                    loop {
                        args.push(self.parse_expression()?);
                        if self.peek().is_symbol(',') {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect_symbol(')')?;
                expr = Expr::Call { callee: Box::new(expr), args };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Integer(v) => {
                self.advance();
                Ok(Expr::Int(v))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::Float(v))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                match name.as_str() {
                    "null" => Ok(Expr::Null),
                    "local" => Ok(Expr::LocalRoot),
                    "global" => Ok(Expr::GlobalRoot),
                    "fun" => {
                        let def = self.parse_function_tail()?;
                        Ok(Expr::Fun(def))
                    }
                    _ => Ok(Expr::Var(name)),
                }
            }
            TokenKind::Symbol('(') => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_symbol(')')?;
                Ok(expr)
            }
            _ => Err(self.err(format!("unexpected token {:?}", tok.kind))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_assignment_statement() {
        let prog = parse_program("x = 1 + 2 * 3;").unwrap();
        assert_eq!(prog.len(), 1);
        match &prog[0] {
            Stmt::Expr(Expr::Assign { value, .. }) => match value.as_ref() {
                Expr::Binary(BinOp::Add, lhs, rhs) => {
                    assert_eq!(**lhs, Expr::Int(1));
                    assert_eq!(**rhs, Expr::Binary(BinOp::Mul, Box::new(Expr::Int(2)), Box::new(Expr::Int(3))));
                }
                other => panic!("unexpected rhs: {other:?}"),
            },
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let prog = parse_program("y = 2 + 3 * 4;").unwrap();
        let Stmt::Expr(Expr::Assign { value, .. }) = &prog[0] else { panic!() };
        assert_eq!(
            **value,
            Expr::Binary(
                BinOp::Add,
                Box::new(Expr::Int(2)),
                Box::new(Expr::Binary(BinOp::Mul, Box::new(Expr::Int(3)), Box::new(Expr::Int(4))))
            )
        );
    }

    #[test]
    fn for_loop_desugars_to_init_while_body_step() {
        let prog = parse_program("for (i = 0; i < 3; i++) { x = x + i; }").unwrap();
        match &prog[0] {
            Stmt::For { init, cond, step, body } => {
                assert!(matches!(**init, Stmt::Expr(Expr::Assign { .. })));
                assert!(matches!(cond, Expr::Binary(BinOp::Lt, _, _)));
                assert!(matches!(**step, Stmt::Expr(Expr::PostIncDec { delta: 1, .. })));
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn distinguishes_postfix_increment_from_binary_plus_of_unary_plus() {
        let prog = parse_program("a = b++;").unwrap();
        let Stmt::Expr(Expr::Assign { value, .. }) = &prog[0] else { panic!() };
        assert!(matches!(**value, Expr::PostIncDec { delta: 1, .. }));

        let prog2 = parse_program("a = b + +c;").unwrap();
        let Stmt::Expr(Expr::Assign { value, .. }) = &prog2[0] else { panic!() };
        assert!(matches!(**value, Expr::Binary(BinOp::Add, _, _)));
    }

    #[test]
    fn parses_if_else_if_chain() {
        let prog = parse_program("if (a) { b = 1; } else if (c) { b = 2; } else { b = 3; }").unwrap();
        match &prog[0] {
            Stmt::If { else_branch: Some(branch), .. } => {
                assert_eq!(branch.len(), 1);
                assert!(matches!(&branch[0], Stmt::If { .. }));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn parses_function_definition_with_params() {
        let prog = parse_program("fun add(a, b) { return a + b; }").unwrap();
        match &prog[0] {
            Stmt::FunDef { name, def } => {
                assert_eq!(name, "add");
                assert_eq!(def.params, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn member_index_and_call_chain_left_to_right() {
        let prog = parse_program("x = a.b[0].c();").unwrap();
        let Stmt::Expr(Expr::Assign { value, .. }) = &prog[0] else { panic!() };
        assert!(matches!(**value, Expr::Call { .. }));
    }

    #[test]
    fn compound_assignment_is_right_associative_with_plain_assignment() {
        let prog = parse_program("x += y = 1;").unwrap();
        let Stmt::Expr(Expr::CompoundAssign { value, .. }) = &prog[0] else { panic!() };
        assert!(matches!(**value, Expr::Assign { .. }));
    }
}
