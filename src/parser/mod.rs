//! Recursive-descent parser with Pratt-style precedence climbing.

mod error;

pub use error::{ParseError, MAX_PARSE_ERRORS};

use crate::ast::*;
use crate::lexer::{Channel, Keyword, Operator, Token, TokenKind};
use crate::span::Span;

type PResult<T> = Result<T, ParseError>;

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    file: String,
    newline_before_cur: bool,
    errors: Vec<ParseError>,
    /// Suppresses `class:member` absorption while parsing a ternary's
    /// then-branch, whose trailing `:` must instead close the conditional:
    /// class-ref and ternary forms are both bare `ident : ident`, and the
    /// ternary colon wins in that one position.
    suppress_class_ref: bool,
}

/// Parses a full compilation unit, accumulating recoverable errors.
///
/// Returns `Ok(unit)` only when no errors were recorded; otherwise returns
/// the accumulated list (capped at [`MAX_PARSE_ERRORS`]).
pub fn parse(tokens: &[Token], file: &str) -> Result<CompilationUnit, Vec<ParseError>> {
    let mut parser = Parser::new(tokens, file);
    let unit = parser.parse_compilation_unit();
    if parser.errors.is_empty() {
        match unit {
            Ok(u) => Ok(u),
            Err(e) => Err(vec![e]),
        }
    } else {
        Err(parser.errors)
    }
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], file: &str) -> Self {
        let mut p = Self {
            tokens,
            pos: 0,
            file: file.to_owned(),
            newline_before_cur: false,
            errors: Vec::new(),
            suppress_class_ref: false,
        };
        p.sync_to_visible();
        p
    }

    // -- cursor -----------------------------------------------------

    fn sync_to_visible(&mut self) {
        let mut saw_newline = false;
        while let Some(t) = self.tokens.get(self.pos) {
            if t.channel == Channel::Hidden {
                if matches!(t.kind, TokenKind::Newline) {
                    saw_newline = true;
                }
                self.pos += 1;
            } else {
                break;
            }
        }
        self.newline_before_cur = saw_newline;
    }

    fn cur(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("at least an Eof token"))
    }

    fn bump(&mut self) -> Token {
        let tok = self.cur().clone();
        self.pos += 1;
        self.sync_to_visible();
        tok
    }

    /// Looks at the next *visible* token after the current one, without
    /// consuming anything. Used by the not-class-definition-start predicate.
    fn peek_next_visible(&self) -> &Token {
        let mut i = self.pos + 1;
        while let Some(t) = self.tokens.get(i) {
            if t.channel == Channel::Hidden {
                i += 1;
            } else {
                return t;
            }
        }
        self.tokens.last().unwrap()
    }

    fn at_eof(&self) -> bool {
        matches!(self.cur().kind, TokenKind::Eof)
    }

    fn is_op(&self, op: Operator) -> bool {
        matches!(&self.cur().kind, TokenKind::Op(o) if *o == op)
    }

    fn is_kw(&self, kw: Keyword) -> bool {
        matches!(&self.cur().kind, TokenKind::Keyword(k) if *k == kw)
    }

    fn eat_op(&mut self, op: Operator) -> PResult<Token> {
        if self.is_op(op) {
            Ok(self.bump())
        } else {
            Err(self.error(format!("'{op:?}'")))
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> PResult<Token> {
        if self.is_kw(kw) {
            Ok(self.bump())
        } else {
            Err(self.error(format!("'{kw}'")))
        }
    }

    fn error(&self, expected: impl Into<String>) -> ParseError {
        ParseError {
            file: self.file.clone(),
            span: self.cur().span,
            expected: expected.into(),
            found: describe(self.cur()),
        }
    }

    /// Records a recoverable error and skips tokens up to the next statement
    /// terminator (`;`, newline, or a block-ending keyword).
    fn recover_statement(&mut self, err: ParseError) {
        if self.errors.len() < MAX_PARSE_ERRORS {
            self.errors.push(err);
        }
        loop {
            if self.at_eof() || self.is_op(Operator::Semicolon) {
                if self.is_op(Operator::Semicolon) {
                    self.bump();
                }
                return;
            }
            if self.is_kw(Keyword::Fimse)
                || self.is_kw(Keyword::Efim)
                || self.is_kw(Keyword::Epara)
                || self.is_kw(Keyword::Casofim)
                || self.is_kw(Keyword::Senao)
                || self.is_kw(Keyword::Classe)
            {
                return;
            }
            self.bump();
        }
    }

    /// Name text admissible in a name position, honoring the
    /// context-sensitive keyword-as-identifier rules.
    fn try_name(&mut self) -> Option<String> {
        match &self.cur().kind {
            TokenKind::Ident(s) | TokenKind::TypeName(s) => {
                let s = s.clone();
                self.bump();
                Some(s)
            }
            TokenKind::Keyword(k) if k.admissible_as_identifier() => {
                let s = k.to_string().to_lowercase();
                self.bump();
                Some(s)
            }
            _ => None,
        }
    }

    fn expect_name(&mut self) -> PResult<String> {
        self.try_name().ok_or_else(|| self.error("an identifier"))
    }

    /// Member-name position after `.`: admits a larger keyword superset.
    fn expect_member_name(&mut self) -> PResult<String> {
        match &self.cur().kind {
            TokenKind::Ident(s) | TokenKind::TypeName(s) => {
                let s = s.clone();
                self.bump();
                Ok(s)
            }
            TokenKind::Keyword(k) if k.admissible_as_member_name() => {
                let s = k.to_string().to_lowercase();
                self.bump();
                Ok(s)
            }
            _ => Err(self.error("a member name")),
        }
    }

    // -- top level ----------------------------------------------------

    fn parse_compilation_unit(&mut self) -> PResult<CompilationUnit> {
        let mut options = Vec::new();
        while self.is_file_option_start() {
            match self.parse_file_option() {
                Ok(o) => options.push(o),
                Err(e) => {
                    self.recover_statement(e);
                }
            }
        }
        let mut classes = Vec::new();
        while !self.at_eof() {
            match self.parse_class() {
                Ok(c) => classes.push(c),
                Err(e) => self.recover_statement(e),
            }
        }
        Ok(CompilationUnit { options, classes })
    }

    fn is_file_option_start(&self) -> bool {
        matches!(
            &self.cur().kind,
            TokenKind::Keyword(
                Keyword::Incluir
                    | Keyword::Exec
                    | Keyword::Telatxt
                    | Keyword::Log
                    | Keyword::Err
                    | Keyword::Completo
                    | Keyword::Arqexec
            )
        )
    }

    fn parse_file_option(&mut self) -> PResult<FileOption> {
        let span = self.cur().span;
        let name = match &self.cur().kind {
            TokenKind::Keyword(k) => k.to_string().to_lowercase(),
            _ => return Err(self.error("a file option")),
        };
        self.bump();
        let value = if self.is_op(Operator::Eq) {
            self.bump();
            Some(self.parse_option_value()?)
        } else if !self.is_op(Operator::Semicolon) && !matches!(self.cur().kind, TokenKind::Newline) {
            // `arqexec CMD...` — bare trailing command text.
            Some(self.parse_option_value()?)
        } else {
            None
        };
        self.consume_statement_end();
        Ok(FileOption { name, value, span })
    }

    fn parse_option_value(&mut self) -> PResult<String> {
        match &self.cur().kind {
            TokenKind::Str(s) => {
                let s = s.clone();
                self.bump();
                Ok(s)
            }
            TokenKind::Int(i) => {
                let s = i.to_string();
                self.bump();
                Ok(s)
            }
            TokenKind::Ident(s) | TokenKind::TypeName(s) => {
                let s = s.clone();
                self.bump();
                Ok(s)
            }
            _ => Err(self.error("an option value")),
        }
    }

    fn consume_statement_end(&mut self) {
        if self.is_op(Operator::Semicolon) {
            self.bump();
        }
    }

    fn parse_class(&mut self) -> PResult<ClassDef> {
        let span = self.cur().span;
        self.eat_kw(Keyword::Classe)?;
        let name = self.expect_name()?;
        let mut bases = Vec::new();
        if self.is_kw(Keyword::Herda) {
            self.bump();
            bases.push(self.expect_name()?);
            while self.is_op(Operator::Comma) {
                self.bump();
                bases.push(self.expect_name()?);
            }
        }
        self.eat_op(Operator::LBrace)?;
        let mut members = Vec::new();
        while !self.is_op(Operator::RBrace) && !self.at_eof() {
            match self.parse_member() {
                Ok(m) => members.push(m),
                Err(e) => self.recover_statement(e),
            }
        }
        self.eat_op(Operator::RBrace)?;
        Ok(ClassDef {
            name,
            bases,
            members,
            span,
        })
    }

    // -- members --------------------------------------------------------

    fn parse_member(&mut self) -> PResult<Member> {
        if self.is_kw(Keyword::Func) {
            return self.parse_function(false).map(Member::Function);
        }
        if self.is_kw(Keyword::Varfunc) {
            return self.parse_function(true).map(Member::VarFunc);
        }
        if self.is_kw(Keyword::Const) {
            return self.parse_constant().map(Member::Constant);
        }
        if self.is_kw(Keyword::Varconst) {
            return self.parse_constant().map(Member::VarConstant);
        }
        self.parse_var_decl_member().map(Member::Var)
    }

    fn parse_function(&mut self, is_varfunc: bool) -> PResult<FunctionDef> {
        let span = self.cur().span;
        let start_line = span.line;
        if is_varfunc {
            self.eat_kw(Keyword::Varfunc)?;
        } else {
            self.eat_kw(Keyword::Func)?;
        }
        let name = self.expect_name()?;
        self.eat_op(Operator::Colon)?;
        let body = self.parse_stmt_list_until_member_end()?;
        Ok(FunctionDef {
            name,
            body,
            span,
            start_line,
        })
    }

    fn parse_constant(&mut self) -> PResult<ConstantDef> {
        let span = self.cur().span;
        self.bump(); // const / varconst
        let name = self.expect_name()?;
        self.eat_op(Operator::Eq)?;
        let value = self.parse_expr()?;
        let mut side_effects = Vec::new();
        while self.is_op(Operator::Comma) {
            self.bump();
            side_effects.push(self.parse_expr()?);
        }
        self.consume_statement_end();
        Ok(ConstantDef {
            name,
            value,
            side_effects,
            span,
        })
    }

    fn parse_var_decl_member(&mut self) -> PResult<VarDecl> {
        let decl = self.parse_var_decl_common()?;
        self.consume_statement_end();
        Ok(decl)
    }

    fn parse_var_decl_common(&mut self) -> PResult<VarDecl> {
        let span = self.cur().span;
        let mut modifiers = Modifiers::default();
        loop {
            if self.is_kw(Keyword::Comum) {
                modifiers.common = true;
                self.bump();
            } else if self.is_kw(Keyword::Sav) {
                modifiers.sav = true;
                self.bump();
            } else {
                break;
            }
        }
        let ty = self.parse_type_name()?;
        let name = self.expect_name()?;
        let vector_size = if self.is_op(Operator::LBracket) {
            self.bump();
            let e = self.parse_expr()?;
            self.eat_op(Operator::RBracket)?;
            Some(e)
        } else {
            None
        };
        let init = if self.is_op(Operator::Eq) {
            self.bump();
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(VarDecl {
            modifiers,
            ty,
            name,
            vector_size,
            init,
            span,
        })
    }

    fn parse_type_name(&mut self) -> PResult<TypeName> {
        let name = match &self.cur().kind {
            TokenKind::TypeName(s) => {
                let s = s.clone();
                self.bump();
                s
            }
            _ => return Err(self.error("a type name")),
        };
        let capacity = if self.is_op(Operator::LParen) {
            self.bump();
            let n = match &self.cur().kind {
                TokenKind::Int(i) => *i as u32,
                _ => return Err(self.error("a numeric capacity")),
            };
            self.bump();
            self.eat_op(Operator::RParen)?;
            Some(n)
        } else {
            None
        };
        Ok(TypeName { name, capacity })
    }

    // -- statements -------------------------------------------------------

    /// Statement list terminated either by `}` (function/varfunc bodies use
    /// brace-less `:`-then-statements in this grammar, so the real
    /// terminator is the next member or the class's closing `}`) — the
    /// not-class-definition-start predicate is what actually ends the list.
    fn parse_stmt_list_until_member_end(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            if self.at_eof() || self.is_op(Operator::RBrace) {
                break;
            }
            if self.is_member_start() {
                break;
            }
            match self.parse_statement() {
                Ok(s) => stmts.push(s),
                Err(e) => self.recover_statement(e),
            }
        }
        Ok(stmts)
    }

    fn is_member_start(&self) -> bool {
        if matches!(
            &self.cur().kind,
            TokenKind::Keyword(Keyword::Func | Keyword::Varfunc | Keyword::Const | Keyword::Varconst)
        ) {
            return true;
        }
        if matches!(&self.cur().kind, TokenKind::TypeName(_)) {
            return true;
        }
        // `comum`/`sav` double as modifier keywords and as ordinary
        // identifiers; only treat them as a var-decl start when a type name
        // follows the modifier chain, not when one stands alone as a
        // statement-level identifier.
        if matches!(&self.cur().kind, TokenKind::Keyword(Keyword::Comum | Keyword::Sav)) {
            let mut i = self.pos;
            loop {
                let t = match self.tokens.get(i) {
                    Some(t) if t.channel == Channel::Default => t,
                    Some(_) => {
                        i += 1;
                        continue;
                    }
                    None => return false,
                };
                match &t.kind {
                    TokenKind::Keyword(Keyword::Comum | Keyword::Sav) => {
                        i += 1;
                        continue;
                    }
                    TokenKind::TypeName(_) => return true,
                    _ => return false,
                }
            }
        }
        false
    }

    fn parse_block_until(&mut self, terminators: &[Keyword]) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            if self.at_eof() {
                break;
            }
            if let TokenKind::Keyword(k) = &self.cur().kind {
                if terminators.contains(k) {
                    break;
                }
            }
            match self.parse_statement() {
                Ok(s) => stmts.push(s),
                Err(e) => self.recover_statement(e),
            }
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        match &self.cur().kind {
            TokenKind::Keyword(Keyword::Se) => self.parse_if(),
            TokenKind::Keyword(Keyword::Enquanto) => self.parse_while(),
            TokenKind::Keyword(Keyword::Para) => self.parse_for(),
            TokenKind::Keyword(Keyword::Cada) => self.parse_foreach(),
            TokenKind::Keyword(Keyword::Casovar) => self.parse_switch(),
            TokenKind::Keyword(Keyword::Ret) => self.parse_return(),
            TokenKind::Keyword(Keyword::Sair) => self.parse_exit(),
            TokenKind::Keyword(Keyword::Continuar) => self.parse_continue(),
            TokenKind::Keyword(Keyword::Terminar) => {
                self.bump();
                self.consume_statement_end();
                Ok(Stmt::Terminate { span })
            }
            TokenKind::Keyword(Keyword::Refvar) => self.parse_refvar(),
            TokenKind::TypeName(_) => self
                .parse_var_decl_common()
                .map(|decl| Stmt::LocalVar { decl })
                .inspect(|_| self.consume_statement_end()),
            _ => self.parse_expr_statement(),
        }
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        self.eat_kw(Keyword::Se)?;
        let mut branches = Vec::new();
        let cond = self.parse_expr()?;
        let body = self.parse_block_until(&[Keyword::Senao, Keyword::Fimse]);
        branches.push((cond, body?));
        let mut else_body = None;
        loop {
            if self.is_kw(Keyword::Senao) {
                self.bump();
                if self.is_kw(Keyword::Se) {
                    self.bump();
                    let c = self.parse_expr()?;
                    let b = self.parse_block_until(&[Keyword::Senao, Keyword::Fimse])?;
                    branches.push((c, b));
                    continue;
                }
                else_body = Some(self.parse_block_until(&[Keyword::Fimse])?);
            }
            break;
        }
        self.eat_kw(Keyword::Fimse)?;
        Ok(Stmt::If {
            branches,
            else_body,
            span,
        })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        self.eat_kw(Keyword::Enquanto)?;
        let cond = self.parse_expr()?;
        let body = self.parse_block_until(&[Keyword::Efim])?;
        self.eat_kw(Keyword::Efim)?;
        Ok(Stmt::While { cond, body, span })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        self.eat_kw(Keyword::Para)?;
        let init = if self.is_op(Operator::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_expr_statement()?))
        };
        if matches!(init, None) {
            self.eat_op(Operator::Semicolon)?;
        }
        let cond = if self.is_op(Operator::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.eat_op(Operator::Semicolon)?;
        let incr = if self.is_kw(Keyword::Epara) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let body = self.parse_block_until(&[Keyword::Epara])?;
        self.eat_kw(Keyword::Epara)?;
        Ok(Stmt::For {
            init,
            cond,
            incr,
            body,
            span,
        })
    }

    fn parse_foreach(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        self.eat_kw(Keyword::Cada)?;
        let var = self.expect_name()?;
        self.eat_kw(Keyword::Em)?;
        let collection = self.parse_expr()?;
        let body = self.parse_block_until(&[Keyword::Epara])?;
        self.eat_kw(Keyword::Epara)?;
        Ok(Stmt::Foreach {
            var,
            collection,
            body,
            span,
        })
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        self.eat_kw(Keyword::Casovar)?;
        let value = self.parse_expr()?;
        self.eat_op(Operator::LBrace)?;
        let mut cases = Vec::new();
        let mut default = None;
        while self.is_kw(Keyword::Casose) {
            self.bump();
            if self.is_op(Operator::Colon) {
                // bare `casose:` is the default arm.
                self.bump();
                default = Some(self.parse_block_until_case_boundary()?);
                continue;
            }
            let label = match &self.cur().kind {
                TokenKind::Str(s) => {
                    let s = s.clone();
                    self.bump();
                    s
                }
                _ => return Err(self.error("a string case label")),
            };
            self.eat_op(Operator::Colon)?;
            let body = self.parse_block_until_case_boundary()?;
            cases.push((label, body));
        }
        self.eat_op(Operator::RBrace)?;
        self.eat_kw(Keyword::Casofim)?;
        Ok(Stmt::Switch {
            value,
            cases,
            default,
            span,
        })
    }

    fn parse_block_until_case_boundary(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            if self.at_eof() || self.is_op(Operator::RBrace) || self.is_kw(Keyword::Casose) {
                break;
            }
            match self.parse_statement() {
                Ok(s) => stmts.push(s),
                Err(e) => self.recover_statement(e),
            }
        }
        Ok(stmts)
    }

    fn parse_return(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        self.eat_kw(Keyword::Ret)?;
        if self.is_op(Operator::Semicolon) || matches!(self.cur().kind, TokenKind::Newline) {
            self.consume_statement_end();
            return Ok(Stmt::Return {
                cond: None,
                value: None,
                span,
            });
        }
        let first = self.parse_expr()?;
        if self.is_op(Operator::Comma) {
            self.bump();
            let value = self.parse_expr()?;
            self.consume_statement_end();
            Ok(Stmt::Return {
                cond: Some(first),
                value: Some(value),
                span,
            })
        } else {
            self.consume_statement_end();
            Ok(Stmt::Return {
                cond: None,
                value: Some(first),
                span,
            })
        }
    }

    fn parse_exit(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        self.eat_kw(Keyword::Sair)?;
        let cond = self.parse_optional_trailing_expr()?;
        Ok(Stmt::Exit { cond, span })
    }

    fn parse_continue(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        self.eat_kw(Keyword::Continuar)?;
        let cond = self.parse_optional_trailing_expr()?;
        Ok(Stmt::Continue { cond, span })
    }

    fn parse_optional_trailing_expr(&mut self) -> PResult<Option<Expr>> {
        if self.is_op(Operator::Semicolon) || matches!(self.cur().kind, TokenKind::Newline) || self.at_eof() {
            self.consume_statement_end();
            Ok(None)
        } else {
            let e = self.parse_expr()?;
            self.consume_statement_end();
            Ok(Some(e))
        }
    }

    fn parse_refvar(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        self.eat_kw(Keyword::Refvar)?;
        let name = self.expect_name()?;
        self.eat_op(Operator::Eq)?;
        let target = self.parse_expr()?;
        self.consume_statement_end();
        Ok(Stmt::RefVar { name, target, span })
    }

    fn parse_expr_statement(&mut self) -> PResult<Stmt> {
        let span = self.cur().span;
        let mut exprs = vec![self.parse_expr()?];
        while self.is_op(Operator::Comma) {
            self.bump();
            exprs.push(self.parse_expr()?);
        }
        self.consume_statement_end();
        Ok(Stmt::Expr { exprs, span })
    }

    // -- expressions: Pratt precedence climbing --------------------------

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        let lhs = self.parse_conditional()?;
        let op = match &self.cur().kind {
            TokenKind::Op(Operator::Eq) => Some(AssignOp::Assign),
            TokenKind::Op(Operator::PlusEq) => Some(AssignOp::AddAssign),
            TokenKind::Op(Operator::MinusEq) => Some(AssignOp::SubAssign),
            TokenKind::Op(Operator::StarEq) => Some(AssignOp::MulAssign),
            TokenKind::Op(Operator::SlashEq) => Some(AssignOp::DivAssign),
            TokenKind::Op(Operator::PercentEq) => Some(AssignOp::ModAssign),
            TokenKind::Op(Operator::AmpEq) => Some(AssignOp::AndAssign),
            TokenKind::Op(Operator::PipeEq) => Some(AssignOp::OrAssign),
            TokenKind::Op(Operator::CaretEq) => Some(AssignOp::XorAssign),
            TokenKind::Op(Operator::ShlEq) => Some(AssignOp::ShlAssign),
            TokenKind::Op(Operator::ShrEq) => Some(AssignOp::ShrAssign),
            _ => None,
        };
        let Some(op) = op else { return Ok(lhs) };
        let span = self.cur().span;
        self.bump();
        if !is_assignable(&lhs) {
            return Err(ParseError {
                file: self.file.clone(),
                span: lhs.span(),
                expected: "an assignable target".to_owned(),
                found: "a non-assignable expression".to_owned(),
            });
        }
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            target: Box::new(lhs),
            op,
            value: Box::new(value),
            span,
        })
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let cond = self.parse_null_coalesce()?;
        if self.is_op(Operator::Question) {
            let span = self.cur().span;
            self.bump();
            let prev_suppress = self.suppress_class_ref;
            self.suppress_class_ref = true;
            let then_branch = self.parse_expr();
            self.suppress_class_ref = prev_suppress;
            let then_branch = then_branch?;
            self.eat_op(Operator::Colon)?;
            let else_branch = self.parse_conditional()?;
            return Ok(Expr::Conditional {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
                span,
            });
        }
        Ok(cond)
    }

    fn parse_null_coalesce(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_logical_or()?;
        while self.is_op(Operator::QuestionQuestion) || self.is_op(Operator::QuestionColon) {
            let span = self.cur().span;
            self.bump();
            let rhs = self.parse_logical_or()?;
            lhs = Expr::NullCoalesce {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_logical_or(&mut self) -> PResult<Expr> {
        self.parse_left_assoc_binary(Self::parse_logical_and, &[(Operator::PipePipe, BinOp::Or)])
    }

    fn parse_logical_and(&mut self) -> PResult<Expr> {
        self.parse_left_assoc_binary(Self::parse_bitor, &[(Operator::AmpAmp, BinOp::And)])
    }

    fn parse_bitor(&mut self) -> PResult<Expr> {
        self.parse_left_assoc_binary(Self::parse_bitxor, &[(Operator::Pipe, BinOp::BitOr)])
    }

    fn parse_bitxor(&mut self) -> PResult<Expr> {
        self.parse_left_assoc_binary(Self::parse_bitand, &[(Operator::Caret, BinOp::BitXor)])
    }

    fn parse_bitand(&mut self) -> PResult<Expr> {
        self.parse_left_assoc_binary(Self::parse_equality, &[(Operator::Amp, BinOp::BitAnd)])
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        self.parse_left_assoc_binary(
            Self::parse_relational,
            &[
                (Operator::EqEq, BinOp::Eq),
                (Operator::EqEqEq, BinOp::StrictEq),
                (Operator::NotEq, BinOp::NotEq),
                (Operator::NotEqEq, BinOp::StrictNotEq),
            ],
        )
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        self.parse_left_assoc_binary(
            Self::parse_shift,
            &[
                (Operator::Lt, BinOp::Lt),
                (Operator::Gt, BinOp::Gt),
                (Operator::LtEq, BinOp::LtEq),
                (Operator::GtEq, BinOp::GtEq),
            ],
        )
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        self.parse_left_assoc_binary(
            Self::parse_additive,
            &[(Operator::Shl, BinOp::Shl), (Operator::Shr, BinOp::Shr)],
        )
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        self.parse_left_assoc_binary(
            Self::parse_multiplicative,
            &[(Operator::Plus, BinOp::Add), (Operator::Minus, BinOp::Sub)],
        )
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        self.parse_left_assoc_binary(
            Self::parse_unary,
            &[
                (Operator::Star, BinOp::Mul),
                (Operator::Slash, BinOp::Div),
                (Operator::Percent, BinOp::Mod),
            ],
        )
    }

    fn parse_left_assoc_binary(
        &mut self,
        next: fn(&mut Self) -> PResult<Expr>,
        ops: &[(Operator, BinOp)],
    ) -> PResult<Expr> {
        let mut lhs = next(self)?;
        loop {
            let matched = ops.iter().find(|(op, _)| self.is_op(*op));
            let Some((_, binop)) = matched else { break };
            let span = self.cur().span;
            self.bump();
            let rhs = next(self)?;
            lhs = Expr::Binary {
                op: *binop,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let span = self.cur().span;
        let op = match &self.cur().kind {
            TokenKind::Op(Operator::Minus) => Some(UnOp::Neg),
            TokenKind::Op(Operator::Bang) => Some(UnOp::Not),
            TokenKind::Op(Operator::Tilde) => Some(UnOp::BitNot),
            TokenKind::Op(Operator::PlusPlus) => Some(UnOp::PreInc),
            TokenKind::Op(Operator::MinusMinus) => Some(UnOp::PreDec),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.is_op(Operator::Dot) {
                let span = self.cur().span;
                self.bump();
                let member = self.parse_member_name_form()?;
                expr = Expr::MemberAccess {
                    object: Box::new(expr),
                    member,
                    span,
                };
                continue;
            }
            if self.is_op(Operator::LBracket) {
                let span = self.cur().span;
                self.bump();
                let index = self.parse_expr()?;
                self.eat_op(Operator::RBracket)?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
                continue;
            }
            if self.is_op(Operator::LParen) {
                let span = self.cur().span;
                self.bump();
                let args = self.parse_args()?;
                self.eat_op(Operator::RParen)?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    span,
                };
                continue;
            }
            if (self.is_op(Operator::PlusPlus) || self.is_op(Operator::MinusMinus))
                && !self.newline_before_cur
            {
                let span = self.cur().span;
                let op = if self.is_op(Operator::PlusPlus) {
                    PostfixOp::Inc
                } else {
                    PostfixOp::Dec
                };
                self.bump();
                expr = Expr::Postfix {
                    op,
                    operand: Box::new(expr),
                    span,
                };
                continue;
            }
            break;
        }
        Ok(expr)
    }

    /// After `.`, a member may itself be dynamic: `obj.name[expr]`.
    fn parse_member_name_form(&mut self) -> PResult<MemberName> {
        if self.is_op(Operator::LBracket) {
            let parts = self.parse_dynamic_name_parts(None)?;
            return Ok(MemberName::Dynamic(parts));
        }
        let name = self.expect_member_name()?;
        if self.is_op(Operator::LBracket) {
            let parts = self.parse_dynamic_name_parts(Some(name))?;
            return Ok(MemberName::Dynamic(parts));
        }
        Ok(MemberName::Static(name))
    }

    fn parse_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.is_op(Operator::RParen) {
            return Ok(args);
        }
        args.push(self.parse_expr()?);
        while self.is_op(Operator::Comma) {
            self.bump();
            args.push(self.parse_expr()?);
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let span = self.cur().span;
        match self.cur().kind.clone() {
            TokenKind::Int(i) => {
                self.bump();
                Ok(Expr::Number {
                    value: Number::Int(i),
                    span,
                })
            }
            TokenKind::Double(d) => {
                self.bump();
                Ok(Expr::Number {
                    value: Number::Double(d),
                    span,
                })
            }
            TokenKind::Str(s) => {
                self.bump();
                let mut value = s;
                // Adjacent string literals concatenate at parse time.
                while let TokenKind::Str(more) = &self.cur().kind {
                    value.push_str(more);
                    self.bump();
                }
                Ok(Expr::Str { value, span })
            }
            TokenKind::Keyword(Keyword::Nulo) => {
                self.bump();
                Ok(Expr::Null { span })
            }
            TokenKind::Keyword(Keyword::Este) => {
                self.bump();
                Ok(Expr::This { span })
            }
            TokenKind::Keyword(Keyword::Args) => {
                self.bump();
                Ok(Expr::ArgsCount { span })
            }
            TokenKind::Keyword(Keyword::Novo) => self.parse_new(span),
            TokenKind::Keyword(Keyword::Apagar) => {
                self.bump();
                let target = self.parse_unary()?;
                Ok(Expr::Delete {
                    target: Box::new(target),
                    span,
                })
            }
            TokenKind::Op(Operator::Dollar) => self.parse_dollar_ref(span),
            TokenKind::Op(Operator::LParen) => {
                self.bump();
                let e = self.parse_expr()?;
                self.eat_op(Operator::RParen)?;
                Ok(e)
            }
            TokenKind::Op(Operator::LBracket) => {
                let parts = self.parse_dynamic_name_parts(None)?;
                let countdown = self.maybe_eat_countdown();
                self.maybe_class_ref(Expr::DynamicIdentifier {
                    parts,
                    countdown,
                    span,
                })
            }
            TokenKind::Ident(s) if arg_ref_index(&s).is_some() => {
                let idx = arg_ref_index(&s).unwrap();
                self.bump();
                Ok(Expr::ArgRef { index: idx, span })
            }
            TokenKind::Ident(_) | TokenKind::TypeName(_) | TokenKind::Keyword(_) => {
                let name = self.expect_name()?;
                if self.is_op(Operator::LBracket) {
                    let parts = self.parse_dynamic_name_parts(Some(name))?;
                    let countdown = self.maybe_eat_countdown();
                    return self.maybe_class_ref(Expr::DynamicIdentifier {
                        parts,
                        countdown,
                        span,
                    });
                }
                self.maybe_class_ref(Expr::Identifier { name, span })
            }
            _ => Err(self.error("an expression")),
        }
    }

    /// `arg0[expr]:member` forms a class-ref whose left side may itself be a
    /// dynamic identifier; this hooks both plain and dynamic identifiers.
    fn maybe_class_ref(&mut self, built: Expr) -> PResult<Expr> {
        if self.suppress_class_ref || !self.is_op(Operator::Colon) {
            return Ok(built);
        }
        let span = built.span();
        let class = expr_to_member_name(built)?;
        self.bump();
        let member = if self.is_op(Operator::LBracket) {
            MemberName::Dynamic(self.parse_dynamic_name_parts(None)?)
        } else {
            let name = self.expect_member_name()?;
            if self.is_op(Operator::LBracket) {
                MemberName::Dynamic(self.parse_dynamic_name_parts(Some(name))?)
            } else {
                MemberName::Static(name)
            }
        };
        Ok(Expr::ClassRef { class, member, span })
    }

    fn parse_new(&mut self, span: Span) -> PResult<Expr> {
        self.eat_kw(Keyword::Novo)?;
        let class_name = self.expect_name()?;
        self.eat_op(Operator::LParen)?;
        let args = self.parse_args()?;
        self.eat_op(Operator::RParen)?;
        Ok(Expr::New {
            class_name,
            args,
            span,
        })
    }

    fn parse_dollar_ref(&mut self, span: Span) -> PResult<Expr> {
        self.eat_op(Operator::Dollar)?;
        if self.is_op(Operator::LBracket) {
            let parts = self.parse_dynamic_name_parts(None)?;
            return Ok(Expr::DollarRef {
                class: Some(MemberName::Dynamic(parts)),
                span,
            });
        }
        if let Some(name) = self.try_name() {
            if self.is_op(Operator::LBracket) {
                let parts = self.parse_dynamic_name_parts(Some(name))?;
                return Ok(Expr::DollarRef {
                    class: Some(MemberName::Dynamic(parts)),
                    span,
                });
            }
            return Ok(Expr::DollarRef {
                class: Some(MemberName::Static(name)),
                span,
            });
        }
        Ok(Expr::DollarRef { class: None, span })
    }

    /// Parses the `[expr]` / `[expr]_[expr]` / `[expr]_suffix` dynamic-name
    /// tail that follows an optional leading literal fragment.
    fn parse_dynamic_name_parts(&mut self, leading: Option<String>) -> PResult<Vec<NamePart>> {
        let mut parts = Vec::new();
        if let Some(lit) = leading {
            parts.push(NamePart::Literal(lit));
        }
        loop {
            self.eat_op(Operator::LBracket)?;
            let e = self.parse_expr()?;
            self.eat_op(Operator::RBracket)?;
            parts.push(NamePart::Expr(Box::new(e)));
            // A trailing bare identifier glues onto the name: either another
            // bracket group follows immediately (`[x]_[y]`) or it's a plain
            // literal suffix (`name[expr]_suffix`).
            if let TokenKind::Ident(s) = &self.cur().kind {
                let s = s.clone();
                if self.peek_next_visible_is_lbracket_from(self.pos + 1) {
                    parts.push(NamePart::Literal(s));
                    self.bump();
                    continue;
                }
                parts.push(NamePart::Literal(s));
                self.bump();
            }
            break;
        }
        Ok(parts)
    }

    fn peek_next_visible_is_lbracket_from(&self, from: usize) -> bool {
        let mut i = from;
        while let Some(t) = self.tokens.get(i) {
            if t.channel == Channel::Hidden {
                i += 1;
                continue;
            }
            return matches!(t.kind, TokenKind::Op(Operator::LBracket));
        }
        false
    }

    fn maybe_eat_countdown(&mut self) -> bool {
        if self.is_op(Operator::At) {
            self.bump();
            true
        } else {
            false
        }
    }
}

/// Recognizes the `arg0`..`arg9` reference tokens, which the lexer produces
/// as plain identifiers since digits are valid identifier-continue
/// characters.
fn arg_ref_index(text: &str) -> Option<u8> {
    let suffix = text.strip_prefix("arg")?;
    if suffix.len() != 1 {
        return None;
    }
    let d = suffix.as_bytes()[0];
    if d.is_ascii_digit() {
        Some(d - b'0')
    } else {
        None
    }
}

fn is_assignable(e: &Expr) -> bool {
    matches!(
        e,
        Expr::Identifier { .. }
            | Expr::DynamicIdentifier { .. }
            | Expr::MemberAccess { .. }
            | Expr::Index { .. }
            | Expr::ArgRef { .. }
            | Expr::ClassRef { .. }
    )
}

fn expr_to_member_name(e: Expr) -> PResult<MemberName> {
    match e {
        Expr::Identifier { name, .. } => Ok(MemberName::Static(name)),
        Expr::DynamicIdentifier { parts, .. } => Ok(MemberName::Dynamic(parts)),
        other => Err(ParseError {
            file: String::new(),
            span: other.span(),
            expected: "a class name".to_owned(),
            found: "a complex expression".to_owned(),
        }),
    }
}

fn describe(t: &Token) -> String {
    match &t.kind {
        TokenKind::Eof => "end of input".to_owned(),
        TokenKind::Newline => "a newline".to_owned(),
        _ => format!("'{}'", t.lexeme),
    }
}
