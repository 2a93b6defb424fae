//! Recursive-descent parser for Knot
//!
//! Grammar (loosest binding first):
//! ```text
//! expr       := let | fun | if | annotated
//! let        := 'let' 'rec'? IDENT IDENT* '=' expr 'in' expr
//! fun        := 'fun' IDENT+ '=>' expr
//! if         := 'if' expr 'then' expr 'else' expr
//! annotated  := binary ('|' contract)*
//! binary     := unary (BINOP unary)*          precedence climbing
//! unary      := ('-' | '!') unary | app
//! app        := postfix postfix*              'Tag e is an enum variant
//! postfix    := atom ('.' (IDENT | STRING))*
//! atom       := literal | IDENT | record | array | '(' expr ')'
//! record     := '{' (field (',' field)* ','?)? '}'
//! field      := (IDENT | STRING) ('|' metadata)* ('=' expr)?
//! ```
//!
//! The syntax tree may be at most `MAX_NESTING` levels deep. Brackets,
//! parentheses, prefix operators and every link of an operator,
//! application or field-access chain count as one level, so parsing,
//! evaluating and dropping a tree never recurses further than that.

use crate::ast::{BinOp, Contract, ContractKind, Expr, ExprKind, ExprRef, FieldDef, UnOp};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::intern::Symbol;
use crate::lexer::{Token, TokenKind, tokenize};
use crate::number::Number;
use crate::source::{SourceFile, Span};
use std::collections::HashSet;
use std::sync::Arc;

pub const MAX_NESTING: usize = 128;

/// Parse a whole source file into a single expression
pub fn parse(source: &Arc<SourceFile>) -> Result<ExprRef, Diagnostic> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expr()?;
    if !parser.check(&TokenKind::Eof) {
        return Err(parser.unexpected("end of input"));
    }
    Ok(expr)
}

struct Parser<'a> {
    source: &'a Arc<SourceFile>,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

fn binary_precedence(kind: &TokenKind) -> Option<(u8, BinOp)> {
    Some(match kind {
        TokenKind::OrOr => (1, BinOp::Or),
        TokenKind::AndAnd => (2, BinOp::And),
        TokenKind::EqEq => (3, BinOp::Eq),
        TokenKind::NotEq => (3, BinOp::NotEq),
        TokenKind::Lt => (4, BinOp::Lt),
        TokenKind::Le => (4, BinOp::Le),
        TokenKind::Gt => (4, BinOp::Gt),
        TokenKind::Ge => (4, BinOp::Ge),
        TokenKind::Concat => (5, BinOp::Concat),
        TokenKind::ArrayConcat => (5, BinOp::ArrayConcat),
        TokenKind::Plus => (6, BinOp::Add),
        TokenKind::Minus => (6, BinOp::Sub),
        TokenKind::Star => (7, BinOp::Mul),
        TokenKind::Slash => (7, BinOp::Div),
        TokenKind::Percent => (7, BinOp::Rem),
        _ => return None,
    })
}

/// Tokens that can begin an application argument
fn starts_atom(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Number(_)
            | TokenKind::Str(_)
            | TokenKind::Ident(_)
            | TokenKind::EnumTag(_)
            | TokenKind::Null
            | TokenKind::True
            | TokenKind::False
            | TokenKind::LBrace
            | TokenKind::LBracket
            | TokenKind::LParen
    )
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        // tokenize always ends with Eof and we never advance past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        let token = self.peek();
        Diagnostic::new(
            DiagnosticKind::Parse,
            format!("unexpected {}, expected {}", token.kind, expected),
        )
        .with_primary(self.source, token.span, "unexpected token")
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(String, Span), Diagnostic> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                let span = self.advance().span;
                Ok((name, span))
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    /// Count one level of nesting; fails once `MAX_NESTING` is reached
    fn descend(&mut self) -> Result<(), Diagnostic> {
        if self.depth >= MAX_NESTING {
            let span = self.peek().span;
            return Err(Diagnostic::new(
                DiagnosticKind::Parse,
                format!("expression nested more than {} levels deep", MAX_NESTING),
            )
            .with_primary(self.source, span, "too deeply nested")
            .with_note("split the expression with `let` bindings"));
        }
        self.depth += 1;
        Ok(())
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, Diagnostic>,
    ) -> Result<T, Diagnostic> {
        self.descend()?;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn parse_expr(&mut self) -> Result<ExprRef, Diagnostic> {
        self.nested(|p| match p.peek().kind {
            TokenKind::Let => p.parse_let(),
            TokenKind::Fun => p.parse_fun(),
            TokenKind::If => p.parse_if(),
            _ => p.parse_annotated(),
        })
    }

    fn parse_let(&mut self) -> Result<ExprRef, Diagnostic> {
        let start = self.advance().span;
        let recursive = self.consume(&TokenKind::Rec);
        let (name, _) = self.expect_ident("a name after `let`")?;

        let mut params = Vec::new();
        while let TokenKind::Ident(param) = &self.peek().kind {
            params.push(param.clone());
            self.advance();
        }
        self.expect(&TokenKind::Assign, "`=` in let binding")?;
        let mut value = self.parse_expr()?;
        for param in params.into_iter().rev() {
            let span = value.span;
            value = Expr::new(ExprKind::Fun { param, body: value }, span);
        }

        self.expect(&TokenKind::In, "`in` after let binding")?;
        let body = self.parse_expr()?;
        let span = start.merge(body.span);
        Ok(Expr::new(
            ExprKind::Let {
                recursive,
                name,
                value,
                body,
            },
            span,
        ))
    }

    fn parse_fun(&mut self) -> Result<ExprRef, Diagnostic> {
        let start = self.advance().span;
        let mut params = vec![self.expect_ident("a parameter name after `fun`")?.0];
        while let TokenKind::Ident(param) = &self.peek().kind {
            params.push(param.clone());
            self.advance();
        }
        self.expect(&TokenKind::FatArrow, "`=>` after function parameters")?;
        let mut body = self.parse_expr()?;
        let span = start.merge(body.span);
        for param in params.into_iter().rev() {
            body = Expr::new(ExprKind::Fun { param, body }, span);
        }
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<ExprRef, Diagnostic> {
        let start = self.advance().span;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::Then, "`then`")?;
        let then_branch = self.parse_expr()?;
        self.expect(&TokenKind::Else, "`else`")?;
        let else_branch = self.parse_expr()?;
        let span = start.merge(else_branch.span);
        Ok(Expr::new(
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            },
            span,
        ))
    }

    fn parse_annotated(&mut self) -> Result<ExprRef, Diagnostic> {
        let expr = self.parse_binary(1)?;
        let mut contracts = Vec::new();
        while self.consume(&TokenKind::Pipe) {
            contracts.push(self.parse_contract()?);
        }
        if contracts.is_empty() {
            return Ok(expr);
        }
        let span = contracts
            .iter()
            .fold(expr.span, |acc, c| acc.merge(c.span));
        Ok(Expr::new(ExprKind::Annotated { expr, contracts }, span))
    }

    fn parse_contract(&mut self) -> Result<Contract, Diagnostic> {
        self.nested(Self::parse_contract_inner)
    }

    fn parse_contract_inner(&mut self) -> Result<Contract, Diagnostic> {
        if self.check(&TokenKind::LParen) {
            let start = self.advance().span;
            let inner = self.parse_contract()?;
            let end = self.expect(&TokenKind::RParen, "`)` after contract")?.span;
            return Ok(Contract {
                kind: inner.kind,
                span: start.merge(end),
            });
        }

        let (name, span) = self.expect_ident("a contract")?;
        let kind = match name.as_str() {
            "Number" => ContractKind::Number,
            "String" => ContractKind::String,
            "Bool" => ContractKind::Bool,
            "Dyn" => ContractKind::Dyn,
            "Array" => {
                let elem = self.parse_contract()?;
                let span = span.merge(elem.span);
                return Ok(Contract {
                    kind: ContractKind::Array(Box::new(elem)),
                    span,
                });
            }
            other => {
                return Err(Diagnostic::new(
                    DiagnosticKind::Parse,
                    format!("unknown contract `{}`", other),
                )
                .with_primary(self.source, span, "not a known contract")
                .with_note("known contracts: Number, String, Bool, Dyn, Array <contract>"));
            }
        };
        Ok(Contract { kind, span })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<ExprRef, Diagnostic> {
        let depth = self.depth;
        let mut lhs = self.parse_unary()?;
        while let Some((prec, op)) = binary_precedence(&self.peek().kind) {
            if prec < min_prec {
                break;
            }
            self.descend()?;
            self.advance();
            let rhs = self.parse_binary(prec + 1)?;
            let span = lhs.span.merge(rhs.span);
            lhs = Expr::new(ExprKind::Binary { op, lhs, rhs }, span);
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<ExprRef, Diagnostic> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnOp::Neg,
            TokenKind::Bang => UnOp::Not,
            _ => return self.parse_application(),
        };
        let start = self.advance().span;
        let operand = self.nested(Self::parse_unary)?;
        let span = start.merge(operand.span);
        Ok(Expr::new(ExprKind::Unary { op, operand }, span))
    }

    fn parse_application(&mut self) -> Result<ExprRef, Diagnostic> {
        let depth = self.depth;
        let mut func = self.parse_postfix()?;

        if let ExprKind::EnumTag(tag) = func.kind
            && starts_atom(&self.peek().kind)
        {
            let payload = self.parse_postfix()?;
            let span = func.span.merge(payload.span);
            func = Expr::new(ExprKind::EnumVariant { tag, payload }, span);
        }

        while starts_atom(&self.peek().kind) {
            self.descend()?;
            let arg = self.parse_postfix()?;
            let span = func.span.merge(arg.span);
            func = Expr::new(ExprKind::App { func, arg }, span);
        }
        self.depth = depth;
        Ok(func)
    }

    fn parse_postfix(&mut self) -> Result<ExprRef, Diagnostic> {
        let depth = self.depth;
        let mut expr = self.parse_atom()?;
        while self.consume(&TokenKind::Dot) {
            self.descend()?;
            let name = match &self.peek().kind {
                TokenKind::Ident(name) | TokenKind::Str(name) => name.clone(),
                _ => return Err(self.unexpected("a field name after `.`")),
            };
            let token = self.advance();
            let span = expr.span.merge(token.span);
            expr = Expr::new(
                ExprKind::Field {
                    target: expr,
                    name,
                    name_span: token.span,
                },
                span,
            );
        }
        self.depth = depth;
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<ExprRef, Diagnostic> {
        let token = self.peek().clone();
        let kind = match token.kind {
            TokenKind::Null => ExprKind::Null,
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::Number(ref text) => match Number::parse_literal(text) {
                Ok(n) => ExprKind::Number(n),
                Err(e) => {
                    return Err(Diagnostic::new(DiagnosticKind::Parse, e.to_string())
                        .with_primary(self.source, token.span, "this literal"));
                }
            },
            TokenKind::Str(ref s) => ExprKind::Str(s.clone()),
            TokenKind::EnumTag(ref tag) => ExprKind::EnumTag(Symbol::intern(tag)),
            TokenKind::Ident(ref name) => ExprKind::Var(name.clone()),
            TokenKind::LBrace => return self.parse_record(),
            TokenKind::LBracket => return self.parse_array(),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                let end = self.expect(&TokenKind::RParen, "`)`")?.span;
                let kind = inner.kind.clone();
                return Ok(Expr::new(kind, token.span.merge(end)));
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok(Expr::new(kind, token.span))
    }

    fn parse_array(&mut self) -> Result<ExprRef, Diagnostic> {
        let start = self.advance().span;
        let mut elements = Vec::new();
        loop {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            elements.push(self.parse_expr()?);
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBracket, "`,` or `]`")?.span;
        Ok(Expr::new(ExprKind::Array(elements), start.merge(end)))
    }

    fn parse_record(&mut self) -> Result<ExprRef, Diagnostic> {
        let start = self.advance().span;
        let mut fields: Vec<FieldDef> = Vec::new();
        let mut seen = HashSet::new();
        loop {
            if self.check(&TokenKind::RBrace) {
                break;
            }
            let field = self.parse_field()?;
            if !seen.insert(field.name.clone()) {
                return Err(Diagnostic::new(
                    DiagnosticKind::Parse,
                    format!("duplicate definition of field `{}`", field.name),
                )
                .with_primary(self.source, field.name_span, "defined again here"));
            }
            fields.push(field);
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace, "`,` or `}`")?.span;
        Ok(Expr::new(ExprKind::Record(fields), start.merge(end)))
    }

    fn parse_field(&mut self) -> Result<FieldDef, Diagnostic> {
        let name = match &self.peek().kind {
            TokenKind::Ident(name) | TokenKind::Str(name) => name.clone(),
            _ => return Err(self.unexpected("a field name")),
        };
        let token = self.advance();

        let mut field = FieldDef {
            name,
            name_span: token.span,
            contracts: Vec::new(),
            not_exported: false,
            doc: None,
            value: None,
        };

        while self.consume(&TokenKind::Pipe) {
            match &self.peek().kind {
                TokenKind::Ident(word) if word == "not_exported" => {
                    self.advance();
                    field.not_exported = true;
                }
                TokenKind::Ident(word) if word == "doc" => {
                    self.advance();
                    let TokenKind::Str(text) = &self.peek().kind else {
                        return Err(self.unexpected("a string after `doc`"));
                    };
                    field.doc = Some(text.clone());
                    self.advance();
                }
                _ => field.contracts.push(self.parse_contract()?),
            }
        }

        if self.consume(&TokenKind::Assign) {
            field.value = Some(self.parse_expr()?);
        }
        Ok(field)
    }
}
