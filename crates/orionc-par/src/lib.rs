//! orionc-par - Recursive-descent parser for the Orion language.
//!
//! Consumes an [`orionc_lex::Lexer`] and produces a [`Program`] AST. Expression
//! parsing uses precedence climbing (lowest to highest: logical `or`, logical
//! `and`, equality, comparison, additive, multiplicative, composition, unary,
//! call/member/index, primary).
//!
//! On a syntax error the parser reports a diagnostic (via [`Handler`]) and
//! recovers by skipping tokens until the next statement boundary (`;`, a
//! closing delimiter, or EOF), so a single parse run surfaces every syntax
//! error in the file rather than stopping at the first one.
//!
//! Binary operators are encoded as a single `char` discriminant — `+ - * /
//! < > E N G L A O` for `+ - * / < > == != >= <= && ||` — because the code
//! generator in `orionc-gen` switches on this discriminant directly; this is
//! a deliberate surface contract between the two crates, not an
//! implementation detail to be hidden behind a richer enum.

use orionc_lex::{Keyword, Lexer, Payload, Token, TokenKind};
use orionc_util::diagnostic::{DiagnosticBuilder, DiagnosticCode};
use orionc_util::{Handler, Span};

// ===========================================================================
// AST
// ===========================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub items: Vec<Item>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    FuncDef(FuncDef),
    ClassDef(ClassDef),
    Module(ModuleDecl),
    Import(Import),
    AspectDef(AspectDef),
    MacroDef(MacroDef),
    VarDecl(VarDecl),
    Stmt(Stmt),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FuncDef {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    pub exported: bool,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Option<TypeExpr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub base: Option<String>,
    pub fields: Vec<VarDecl>,
    pub methods: Vec<FuncDef>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModuleDecl {
    pub name: String,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Import {
    /// `import X`
    Whole { name: String },
    /// `import X as Y`
    Aliased { name: String, alias: String },
    /// `from X import a, b as c`
    Selective {
        name: String,
        symbols: Vec<(String, Option<String>)>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct AspectDef {
    pub name: String,
    pub pointcuts: Vec<Pointcut>,
    pub advice: Vec<Advice>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pointcut {
    pub name: String,
    /// Glob pattern over function names, e.g. `"fib*"`.
    pub pattern: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdviceKind {
    Before,
    After,
    Around,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Advice {
    pub kind: AdviceKind,
    pub pointcut: String,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    Named(String),
    Array(Box<TypeExpr>),
    Function(Vec<TypeExpr>, Box<TypeExpr>),
}

pub type Block = Vec<Stmt>;

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Block(Block),
    If {
        cond: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    DoWhile {
        body: Block,
        cond: Expr,
    },
    ForRange {
        var: String,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        body: Block,
    },
    ForCollection {
        var: String,
        iter: Expr,
        body: Block,
    },
    ForTraditional {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Block,
    },
    Switch {
        subject: Expr,
        cases: Vec<Case>,
        default: Option<Block>,
    },
    Return(Option<Expr>),
    VarDecl(VarDecl),
    VarAssign {
        target: Expr,
        /// `None` for `=`, else the compound-assignment operator (`+`, `-`,
        /// `*`, `/`) using the same char encoding as [`BinOp`].
        compound_op: Option<char>,
        value: Expr,
    },
    Print(Expr),
    Break,
    Continue,
    Try {
        body: Block,
        catches: Vec<Catch>,
        finally: Option<Block>,
    },
    Throw(Expr),
    Match {
        subject: Expr,
        arms: Vec<MatchArm>,
    },
    Expr(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Case {
    pub values: Vec<Expr>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Catch {
    pub error_type: Option<String>,
    pub binding: String,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pattern {
    Literal(Literal),
    Ident(String),
    Otherwise,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Number(f64, bool),
    Str(String),
    Bool(bool),
    Null,
}

/// Binary operator discriminant — see the module doc for why this is a
/// bare `char`.
pub type BinOp = char;

pub const OP_ADD: BinOp = '+';
pub const OP_SUB: BinOp = '-';
pub const OP_MUL: BinOp = '*';
pub const OP_DIV: BinOp = '/';
pub const OP_LT: BinOp = '<';
pub const OP_GT: BinOp = '>';
pub const OP_EQ: BinOp = 'E';
pub const OP_NE: BinOp = 'N';
pub const OP_GE: BinOp = 'G';
pub const OP_LE: BinOp = 'L';
pub const OP_AND: BinOp = 'A';
pub const OP_OR: BinOp = 'O';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LambdaBody {
    Expr(Box<Expr>),
    Block(Block),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    NumberLit(f64, bool),
    StringLit(String),
    BoolLit(bool),
    NullLit,
    Ident(String),
    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    UnOp {
        op: UnOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        field: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    ArrayLit(Vec<Expr>),
    Lambda {
        params: Vec<Param>,
        return_type: Option<TypeExpr>,
        body: LambdaBody,
    },
    Compose {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    New {
        class_name: String,
        args: Vec<Expr>,
    },
    This,
}

// ===========================================================================
// Parser
// ===========================================================================

pub struct Parser<'h> {
    lexer: Lexer,
    handler: &'h Handler,
    error_count: usize,
}

type PResult<T> = Result<T, ()>;

impl<'h> Parser<'h> {
    pub fn new(source: &str, handler: &'h Handler) -> Self {
        Parser {
            lexer: Lexer::new(source),
            handler,
            error_count: 0,
        }
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn parse_program(&mut self) -> Program {
        let mut items = Vec::new();
        while !self.check_eof() {
            match self.parse_item() {
                Ok(item) => items.push(item),
                Err(()) => self.recover_to_statement_boundary(),
            }
        }
        Program { items }
    }

    // --- token helpers -----------------------------------------------

    fn peek(&self) -> Token {
        self.lexer.peek(0)
    }

    fn peek_n(&self, n: usize) -> Token {
        self.lexer.peek(n)
    }

    fn check_eof(&self) -> bool {
        self.peek().is_eof()
    }

    fn bump(&mut self) -> Token {
        self.lexer.next()
    }

    fn check_kind(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn check_keyword(&self, kw: Keyword) -> bool {
        self.peek().as_keyword() == Some(kw)
    }

    fn eat_kind(&mut self, kind: TokenKind) -> bool {
        if self.check_kind(&kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.check_keyword(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_kind(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.check_kind(&kind) {
            Ok(self.bump())
        } else {
            self.error_expected(what);
            Err(())
        }
    }

    fn expect_ident(&mut self) -> PResult<String> {
        if self.check_kind(&TokenKind::Ident) {
            Ok(self.bump().lexeme)
        } else {
            self.error_expected("identifier");
            Err(())
        }
    }

    fn expect_keyword(&mut self, kw: Keyword, what: &str) -> PResult<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            self.error_expected(what);
            Err(())
        }
    }

    fn error_expected(&mut self, what: &str) {
        let tok = self.peek();
        self.error_count += 1;
        DiagnosticBuilder::error(format!(
            "expected {}, found {:?} ({:?})",
            what, tok.kind, tok.lexeme
        ))
        .code(DiagnosticCode::E_PARSER_EXPECTED_TOKEN)
        .span(tok.span())
        .emit(self.handler);
    }

    /// Error recovery: skip tokens until a statement boundary — a `;`
    /// (consumed), a closing `}` (not consumed, so the caller's block parser
    /// sees it), or EOF.
    fn recover_to_statement_boundary(&mut self) {
        loop {
            let tok = self.peek();
            match tok.kind {
                TokenKind::Eof | TokenKind::RBrace => return,
                TokenKind::Semicolon => {
                    self.bump();
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    // --- items ---------------------------------------------------------

    fn parse_item(&mut self) -> PResult<Item> {
        if self.eat_keyword(Keyword::Export) {
            let mut item = self.parse_item_inner()?;
            if let Item::FuncDef(ref mut f) = item {
                f.exported = true;
            }
            return Ok(item);
        }
        self.parse_item_inner()
    }

    fn parse_item_inner(&mut self) -> PResult<Item> {
        if self.check_keyword(Keyword::Func) {
            return self.parse_func_def().map(Item::FuncDef);
        }
        if self.check_keyword(Keyword::Class) {
            return self.parse_class_def().map(Item::ClassDef);
        }
        if self.check_keyword(Keyword::Module) {
            return self.parse_module_decl().map(Item::Module);
        }
        if self.check_keyword(Keyword::Import) || self.check_keyword(Keyword::From) {
            return self.parse_import().map(Item::Import);
        }
        if self.check_keyword(Keyword::Aspect) {
            return self.parse_aspect_def().map(Item::AspectDef);
        }
        if self.check_keyword(Keyword::Macro) {
            return self.parse_macro_def().map(Item::MacroDef);
        }
        // A bare `main { ... }` block (spec.md §6's module-file-layout
        // sentinel — a module source with no `module <name>` declaration
        // derives its name from the file stem instead). `main` is not a
        // reserved keyword: an ordinary identifier named `main` can still
        // be declared and used elsewhere, so this only fires when `main` is
        // immediately followed by `{`.
        if self.check_kind(&TokenKind::Ident)
            && self.peek().lexeme == "main"
            && self.peek_n(1).kind == TokenKind::LBrace
        {
            self.bump();
            let body = self.parse_block()?;
            return Ok(Item::Stmt(Stmt::Block(body)));
        }
        // Bare identifier followed by `=` at top level is a variable
        // declaration on first use.
        if self.check_kind(&TokenKind::Ident) && self.peek_n(1).kind == TokenKind::Eq {
            return self.parse_var_decl().map(Item::VarDecl);
        }
        self.parse_stmt().map(Item::Stmt)
    }

    fn parse_func_def(&mut self) -> PResult<FuncDef> {
        let start = self.peek().span();
        self.expect_keyword(Keyword::Func, "'func'")?;
        let name = self.expect_ident()?;
        let params = self.parse_params()?;
        let return_type = if self.eat_kind(TokenKind::Arrow) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let body = if self.eat_kind(TokenKind::FatArrow) {
            let expr = self.parse_expr()?;
            self.eat_kind(TokenKind::Semicolon);
            vec![Stmt::Return(Some(expr))]
        } else {
            self.parse_block()?
        };
        Ok(FuncDef {
            name,
            params,
            return_type,
            body,
            exported: false,
            span: start,
        })
    }

    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        self.expect_kind(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check_kind(&TokenKind::RParen) {
            loop {
                let name = self.expect_ident()?;
                let ty = if self.eat_kind(TokenKind::Colon) {
                    Some(self.parse_type_expr()?)
                } else {
                    None
                };
                params.push(Param { name, ty });
                if !self.eat_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect_kind(TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn parse_type_expr(&mut self) -> PResult<TypeExpr> {
        if self.eat_kind(TokenKind::LBracket) {
            let inner = self.parse_type_expr()?;
            self.expect_kind(TokenKind::RBracket, "']'")?;
            return Ok(TypeExpr::Array(Box::new(inner)));
        }
        let name = self.expect_ident()?;
        Ok(TypeExpr::Named(name))
    }

    fn parse_class_def(&mut self) -> PResult<ClassDef> {
        let start = self.peek().span();
        self.expect_keyword(Keyword::Class, "'class'")?;
        let name = self.expect_ident()?;
        let base = if self.eat_keyword(Keyword::Extends) {
            Some(self.expect_ident()?)
        } else {
            None
        };
        self.expect_kind(TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check_kind(&TokenKind::RBrace) && !self.check_eof() {
            if self.check_keyword(Keyword::Func) {
                match self.parse_func_def() {
                    Ok(m) => methods.push(m),
                    Err(()) => self.recover_to_statement_boundary(),
                }
            } else {
                match self.parse_var_decl() {
                    Ok(f) => fields.push(f),
                    Err(()) => self.recover_to_statement_boundary(),
                }
            }
        }
        self.expect_kind(TokenKind::RBrace, "'}'")?;
        Ok(ClassDef {
            name,
            base,
            fields,
            methods,
            span: start,
        })
    }

    fn parse_module_decl(&mut self) -> PResult<ModuleDecl> {
        let start = self.peek().span();
        self.expect_keyword(Keyword::Module, "'module'")?;
        let name = self.expect_ident()?;
        self.eat_kind(TokenKind::Semicolon);
        Ok(ModuleDecl { name, span: start })
    }

    fn parse_import(&mut self) -> PResult<Import> {
        if self.eat_keyword(Keyword::From) {
            let name = self.expect_ident()?;
            self.expect_keyword(Keyword::Import, "'import'")?;
            let mut symbols = Vec::new();
            loop {
                let sym = self.expect_ident()?;
                let alias = if self.eat_keyword(Keyword::As) {
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                symbols.push((sym, alias));
                if !self.eat_kind(TokenKind::Comma) {
                    break;
                }
            }
            self.eat_kind(TokenKind::Semicolon);
            return Ok(Import::Selective { name, symbols });
        }
        self.expect_keyword(Keyword::Import, "'import'")?;
        let name = self.expect_ident()?;
        if self.eat_keyword(Keyword::As) {
            let alias = self.expect_ident()?;
            self.eat_kind(TokenKind::Semicolon);
            return Ok(Import::Aliased { name, alias });
        }
        self.eat_kind(TokenKind::Semicolon);
        Ok(Import::Whole { name })
    }

    fn parse_aspect_def(&mut self) -> PResult<AspectDef> {
        let start = self.peek().span();
        self.expect_keyword(Keyword::Aspect, "'aspect'")?;
        let name = self.expect_ident()?;
        self.expect_kind(TokenKind::LBrace, "'{'")?;
        let mut pointcuts = Vec::new();
        let mut advice = Vec::new();
        while !self.check_kind(&TokenKind::RBrace) && !self.check_eof() {
            if self.eat_keyword(Keyword::Pointcut) {
                let pname = self.expect_ident()?;
                self.expect_kind(TokenKind::Eq, "'='")?;
                let pattern_tok = self.expect_kind(TokenKind::Str, "string pattern")?;
                let pattern = match pattern_tok.payload {
                    Some(Payload::Str(s)) => s,
                    _ => pattern_tok.lexeme,
                };
                self.eat_kind(TokenKind::Semicolon);
                pointcuts.push(Pointcut {
                    name: pname,
                    pattern,
                });
            } else {
                let kind = if self.eat_keyword(Keyword::Before) {
                    AdviceKind::Before
                } else if self.eat_keyword(Keyword::After) {
                    AdviceKind::After
                } else if self.eat_keyword(Keyword::Around) {
                    AdviceKind::Around
                } else {
                    self.error_expected("'pointcut', 'before', 'after', or 'around'");
                    self.recover_to_statement_boundary();
                    continue;
                };
                let pointcut = self.expect_ident()?;
                let body = self.parse_block()?;
                advice.push(Advice {
                    kind,
                    pointcut,
                    body,
                });
            }
        }
        self.expect_kind(TokenKind::RBrace, "'}'")?;
        Ok(AspectDef {
            name,
            pointcuts,
            advice,
            span: start,
        })
    }

    fn parse_macro_def(&mut self) -> PResult<MacroDef> {
        let start = self.peek().span();
        self.expect_keyword(Keyword::Macro, "'macro'")?;
        let name = self.expect_ident()?;
        self.expect_kind(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check_kind(&TokenKind::RParen) {
            loop {
                params.push(self.expect_ident()?);
                if !self.eat_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect_kind(TokenKind::RParen, "')'")?;
        let body = self.parse_block()?;
        Ok(MacroDef {
            name,
            params,
            body,
            span: start,
        })
    }

    fn parse_var_decl(&mut self) -> PResult<VarDecl> {
        let start = self.peek().span();
        let name = self.expect_ident()?;
        let ty = if self.eat_kind(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let init = if self.eat_kind(TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.eat_kind(TokenKind::Semicolon);
        Ok(VarDecl {
            name,
            ty,
            init,
            span: start,
        })
    }

    // --- statements ------------------------------------------------------

    fn parse_block(&mut self) -> PResult<Block> {
        self.expect_kind(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check_kind(&TokenKind::RBrace) && !self.check_eof() {
            match self.parse_stmt() {
                Ok(s) => stmts.push(s),
                Err(()) => self.recover_to_statement_boundary(),
            }
        }
        self.expect_kind(TokenKind::RBrace, "'}'")?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        if self.check_kind(&TokenKind::LBrace) {
            return self.parse_block().map(Stmt::Block);
        }
        if self.check_keyword(Keyword::If) {
            return self.parse_if();
        }
        if self.check_keyword(Keyword::While) {
            return self.parse_while();
        }
        if self.check_keyword(Keyword::Do) {
            return self.parse_do_while();
        }
        if self.check_keyword(Keyword::For) {
            return self.parse_for();
        }
        if self.check_keyword(Keyword::Switch) {
            return self.parse_switch();
        }
        if self.check_keyword(Keyword::Return) {
            self.bump();
            let value = if self.check_kind(&TokenKind::Semicolon) || self.check_kind(&TokenKind::RBrace) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.eat_kind(TokenKind::Semicolon);
            return Ok(Stmt::Return(value));
        }
        if self.check_keyword(Keyword::Print) {
            self.bump();
            let value = self.parse_expr()?;
            self.eat_kind(TokenKind::Semicolon);
            return Ok(Stmt::Print(value));
        }
        if self.check_keyword(Keyword::Break) {
            self.bump();
            self.eat_kind(TokenKind::Semicolon);
            return Ok(Stmt::Break);
        }
        if self.check_keyword(Keyword::Continue) {
            self.bump();
            self.eat_kind(TokenKind::Semicolon);
            return Ok(Stmt::Continue);
        }
        if self.check_keyword(Keyword::Try) {
            return self.parse_try();
        }
        if self.check_keyword(Keyword::Throw) {
            self.bump();
            let value = self.parse_expr()?;
            self.eat_kind(TokenKind::Semicolon);
            return Ok(Stmt::Throw(value));
        }
        if self.check_keyword(Keyword::Match) {
            return self.parse_match();
        }
        self.parse_simple_stmt()
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.expect_keyword(Keyword::If, "'if'")?;
        self.expect_kind(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect_kind(TokenKind::RParen, "')'")?;
        let then_branch = self.parse_stmt_as_block()?;
        let else_branch = if self.eat_keyword(Keyword::Else) {
            if self.check_keyword(Keyword::If) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_stmt_as_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    /// A statement in positions that grammatically accept either a brace
    /// block or a single bare statement (`if`/`while`/`for` bodies).
    fn parse_stmt_as_block(&mut self) -> PResult<Block> {
        if self.check_kind(&TokenKind::LBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_stmt()?])
        }
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        self.expect_keyword(Keyword::While, "'while'")?;
        self.expect_kind(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect_kind(TokenKind::RParen, "')'")?;
        let body = self.parse_stmt_as_block()?;
        Ok(Stmt::While { cond, body })
    }

    fn parse_do_while(&mut self) -> PResult<Stmt> {
        self.expect_keyword(Keyword::Do, "'do'")?;
        let body = self.parse_block()?;
        self.expect_keyword(Keyword::While, "'while'")?;
        self.expect_kind(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect_kind(TokenKind::RParen, "')'")?;
        self.eat_kind(TokenKind::Semicolon);
        Ok(Stmt::DoWhile { body, cond })
    }

    /// Dispatches on the three `for` forms. After `in`, if the iterated
    /// expression is a `range(...)` call it's a range-for; otherwise a
    /// collection-for. Absence of `in` after the opening `(` means the
    /// classic C-style `for (init; cond; step)` form.
    fn parse_for(&mut self) -> PResult<Stmt> {
        self.expect_keyword(Keyword::For, "'for'")?;
        self.expect_kind(TokenKind::LParen, "'('")?;

        if self.check_kind(&TokenKind::Ident) && self.peek_n(1).as_keyword() == Some(Keyword::In) {
            let var = self.expect_ident()?;
            self.expect_keyword(Keyword::In, "'in'")?;
            if self.check_kind(&TokenKind::Ident) && self.peek().lexeme == "range" {
                self.bump();
                self.expect_kind(TokenKind::LParen, "'('")?;
                let start = self.parse_expr()?;
                self.expect_kind(TokenKind::Comma, "','")?;
                let end = self.parse_expr()?;
                let step = if self.eat_kind(TokenKind::Comma) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.expect_kind(TokenKind::RParen, "')'")?;
                self.expect_kind(TokenKind::RParen, "')'")?;
                let body = self.parse_stmt_as_block()?;
                return Ok(Stmt::ForRange {
                    var,
                    start,
                    end,
                    step,
                    body,
                });
            }
            let iter = self.parse_expr()?;
            self.expect_kind(TokenKind::RParen, "')'")?;
            let body = self.parse_stmt_as_block()?;
            return Ok(Stmt::ForCollection { var, iter, body });
        }

        let init = if self.check_kind(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_simple_stmt()?))
        };
        if init.is_none() {
            self.eat_kind(TokenKind::Semicolon);
        }
        let cond = if self.check_kind(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_kind(TokenKind::Semicolon, "';'")?;
        let step = if self.check_kind(&TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_bare_assign_or_expr()?))
        };
        self.expect_kind(TokenKind::RParen, "')'")?;
        let body = self.parse_stmt_as_block()?;
        Ok(Stmt::ForTraditional {
            init,
            cond,
            step,
            body,
        })
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        self.expect_keyword(Keyword::Switch, "'switch'")?;
        self.expect_kind(TokenKind::LParen, "'('")?;
        let subject = self.parse_expr()?;
        self.expect_kind(TokenKind::RParen, "')'")?;
        self.expect_kind(TokenKind::LBrace, "'{'")?;
        let mut cases = Vec::new();
        let mut default = None;
        while !self.check_kind(&TokenKind::RBrace) && !self.check_eof() {
            if self.eat_keyword(Keyword::Case) {
                let values = vec![self.parse_expr()?];
                self.expect_kind(TokenKind::Colon, "':'")?;
                let body = self.parse_case_body();
                cases.push(Case { values, body });
            } else if self.eat_keyword(Keyword::Default) {
                self.expect_kind(TokenKind::Colon, "':'")?;
                default = Some(self.parse_case_body());
            } else {
                self.error_expected("'case' or 'default'");
                self.recover_to_statement_boundary();
            }
        }
        self.expect_kind(TokenKind::RBrace, "'}'")?;
        Ok(Stmt::Switch {
            subject,
            cases,
            default,
        })
    }

    fn parse_case_body(&mut self) -> Block {
        let mut body = Vec::new();
        while !self.check_keyword(Keyword::Case)
            && !self.check_keyword(Keyword::Default)
            && !self.check_kind(&TokenKind::RBrace)
            && !self.check_eof()
        {
            match self.parse_stmt() {
                Ok(s) => body.push(s),
                Err(()) => self.recover_to_statement_boundary(),
            }
        }
        body
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        self.expect_keyword(Keyword::Try, "'try'")?;
        let body = self.parse_block()?;
        let mut catches = Vec::new();
        while self.eat_keyword(Keyword::Catch) {
            let (error_type, binding) = if self.eat_kind(TokenKind::LParen) {
                let first = self.expect_ident()?;
                let (et, b) = if self.eat_kind(TokenKind::Colon) {
                    (Some(first), self.expect_ident()?)
                } else {
                    (None, first)
                };
                self.expect_kind(TokenKind::RParen, "')'")?;
                (et, b)
            } else {
                (None, self.expect_ident()?)
            };
            let cbody = self.parse_block()?;
            catches.push(Catch {
                error_type,
                binding,
                body: cbody,
            });
        }
        let finally = if self.eat_keyword(Keyword::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt::Try {
            body,
            catches,
            finally,
        })
    }

    fn parse_match(&mut self) -> PResult<Stmt> {
        self.expect_keyword(Keyword::Match, "'match'")?;
        self.expect_kind(TokenKind::LParen, "'('")?;
        let subject = self.parse_expr()?;
        self.expect_kind(TokenKind::RParen, "')'")?;
        self.expect_kind(TokenKind::LBrace, "'{'")?;
        let mut arms = Vec::new();
        while !self.check_kind(&TokenKind::RBrace) && !self.check_eof() {
            if !self.eat_keyword(Keyword::Case) {
                self.error_expected("'case'");
                self.recover_to_statement_boundary();
                continue;
            }
            let pattern = self.parse_pattern()?;
            let guard = if self.eat_keyword(Keyword::When) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect_kind(TokenKind::FatArrow, "'=>'")?;
            let body = self.parse_expr()?;
            self.eat_kind(TokenKind::Semicolon);
            arms.push(MatchArm {
                pattern,
                guard,
                body,
            });
        }
        self.expect_kind(TokenKind::RBrace, "'}'")?;
        Ok(Stmt::Match { subject, arms })
    }

    fn parse_pattern(&mut self) -> PResult<Pattern> {
        if self.eat_keyword(Keyword::Otherwise) {
            return Ok(Pattern::Otherwise);
        }
        match self.peek().kind {
            TokenKind::Number => {
                let tok = self.bump();
                let (value, is_float) = match tok.payload {
                    Some(Payload::Number { value, is_float }) => (value, is_float),
                    _ => (0.0, false),
                };
                Ok(Pattern::Literal(Literal::Number(value, is_float)))
            }
            TokenKind::Str => {
                let tok = self.bump();
                let s = match tok.payload {
                    Some(Payload::Str(s)) => s,
                    _ => tok.lexeme,
                };
                Ok(Pattern::Literal(Literal::Str(s)))
            }
            TokenKind::True => {
                self.bump();
                Ok(Pattern::Literal(Literal::Bool(true)))
            }
            TokenKind::False => {
                self.bump();
                Ok(Pattern::Literal(Literal::Bool(false)))
            }
            TokenKind::Null => {
                self.bump();
                Ok(Pattern::Literal(Literal::Null))
            }
            TokenKind::Ident => Ok(Pattern::Ident(self.bump().lexeme)),
            _ => {
                self.error_expected("pattern");
                Err(())
            }
        }
    }

    /// Disambiguates a statement starting with a bare primary: an identifier
    /// followed by `=`/compound-assign is an assignment, and otherwise it's
    /// an expression statement. Also handles `VarDecl` when a type
    /// annotation (`name: Type ...`) is present.
    fn parse_simple_stmt(&mut self) -> PResult<Stmt> {
        if self.check_kind(&TokenKind::Ident) && self.peek_n(1).kind == TokenKind::Colon {
            return self.parse_var_decl().map(Stmt::VarDecl);
        }
        if self.check_kind(&TokenKind::Ident) && self.peek_n(1).kind == TokenKind::Eq {
            return self.parse_assignment(None);
        }
        for (tk, op) in [
            (TokenKind::PlusEq, OP_ADD),
            (TokenKind::MinusEq, OP_SUB),
            (TokenKind::StarEq, OP_MUL),
            (TokenKind::SlashEq, OP_DIV),
        ] {
            if self.check_kind(&TokenKind::Ident) && self.peek_n(1).kind == tk {
                return self.parse_assignment(Some(op));
            }
        }
        self.parse_bare_assign_or_expr()
    }

    fn parse_bare_assign_or_expr(&mut self) -> PResult<Stmt> {
        let expr = self.parse_expr()?;
        if self.eat_kind(TokenKind::Eq) {
            let value = self.parse_expr()?;
            self.eat_kind(TokenKind::Semicolon);
            return Ok(Stmt::VarAssign {
                target: expr,
                compound_op: None,
                value,
            });
        }
        self.eat_kind(TokenKind::Semicolon);
        Ok(Stmt::Expr(expr))
    }

    fn parse_assignment(&mut self, compound_op: Option<char>) -> PResult<Stmt> {
        let name = self.expect_ident()?;
        // consume the (compound-)assignment operator token
        self.bump();
        let value = self.parse_expr()?;
        self.eat_kind(TokenKind::Semicolon);
        Ok(Stmt::VarAssign {
            target: Expr::Ident(name),
            compound_op,
            value,
        })
    }

    // --- expressions -----------------------------------------------------

    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat_kind(TokenKind::PipePipe) {
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp {
                op: OP_OR,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.eat_kind(TokenKind::AmpAmp) {
            let rhs = self.parse_equality()?;
            lhs = Expr::BinOp {
                op: OP_AND,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = if self.check_kind(&TokenKind::EqEq) {
                OP_EQ
            } else if self.check_kind(&TokenKind::BangEq) {
                OP_NE
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_comparison()?;
            lhs = Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = if self.check_kind(&TokenKind::Lt) {
                OP_LT
            } else if self.check_kind(&TokenKind::Gt) {
                OP_GT
            } else if self.check_kind(&TokenKind::LtEq) {
                OP_LE
            } else if self.check_kind(&TokenKind::GtEq) {
                OP_GE
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_additive()?;
            lhs = Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.check_kind(&TokenKind::Plus) {
                OP_ADD
            } else if self.check_kind(&TokenKind::Minus) {
                OP_SUB
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_compose()?;
        loop {
            let op = if self.check_kind(&TokenKind::Star) {
                OP_MUL
            } else if self.check_kind(&TokenKind::Slash) {
                OP_DIV
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_compose()?;
            lhs = Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    /// `f >> g` — point-free function composition between primaries.
    fn parse_compose(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        while self.eat_kind(TokenKind::Compose) {
            let rhs = self.parse_unary()?;
            lhs = Expr::Compose {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        if self.eat_kind(TokenKind::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::UnOp {
                op: UnOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.eat_kind(TokenKind::Bang) {
            let operand = self.parse_unary()?;
            return Ok(Expr::UnOp {
                op: UnOp::Not,
                operand: Box::new(operand),
            });
        }
        // `#x` (stringify) is only meaningful inside a macro body (spec.md
        // §4.6); modeled as a `Call` to the reserved name `#stringify`
        // rather than a new `Expr` variant, since only the macro expander
        // ever inspects it.
        if self.eat_kind(TokenKind::Hash) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Call {
                callee: Box::new(Expr::Ident("#stringify".to_string())),
                args: vec![operand],
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_kind(TokenKind::Dot) {
                let field = self.expect_ident()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    field,
                };
            } else if self.check_kind(&TokenKind::LParen) {
                let args = self.parse_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.eat_kind(TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect_kind(TokenKind::RBracket, "']'")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat_kind(TokenKind::HashHash) {
                // `x##y` (paste), only meaningful inside a macro body — see
                // the `#x` note above.
                let rhs = self.parse_postfix()?;
                expr = Expr::Call {
                    callee: Box::new(Expr::Ident("##paste".to_string())),
                    args: vec![expr, rhs],
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> PResult<Vec<Expr>> {
        self.expect_kind(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.check_kind(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect_kind(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Number => {
                self.bump();
                let (value, is_float) = match tok.payload {
                    Some(Payload::Number { value, is_float }) => (value, is_float),
                    _ => (0.0, false),
                };
                Ok(Expr::NumberLit(value, is_float))
            }
            TokenKind::Str => {
                self.bump();
                let s = match tok.payload {
                    Some(Payload::Str(s)) => s,
                    _ => tok.lexeme,
                };
                Ok(Expr::StringLit(s))
            }
            TokenKind::True => {
                self.bump();
                Ok(Expr::BoolLit(true))
            }
            TokenKind::False => {
                self.bump();
                Ok(Expr::BoolLit(false))
            }
            TokenKind::Null => {
                self.bump();
                Ok(Expr::NullLit)
            }
            TokenKind::Keyword(Keyword::This) => {
                self.bump();
                Ok(Expr::This)
            }
            TokenKind::Keyword(Keyword::New) => {
                self.bump();
                let class_name = self.expect_ident()?;
                let args = self.parse_args()?;
                Ok(Expr::New { class_name, args })
            }
            TokenKind::Ident => {
                // A single bare-identifier lambda `x => expr` is legal
                // without parens; parenthesized param lists are handled by
                // `looks_like_lambda_params` below.
                if self.peek_n(1).kind == TokenKind::FatArrow {
                    let name = self.bump().lexeme;
                    self.bump(); // =>
                    let expr = self.parse_expr()?;
                    return Ok(Expr::Lambda {
                        params: vec![Param { name, ty: None }],
                        return_type: None,
                        body: LambdaBody::Expr(Box::new(expr)),
                    });
                }
                self.bump();
                Ok(Expr::Ident(tok.lexeme))
            }
            TokenKind::LBracket => {
                self.bump();
                let mut elems = Vec::new();
                if !self.check_kind(&TokenKind::RBracket) {
                    loop {
                        elems.push(self.parse_expr()?);
                        if !self.eat_kind(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect_kind(TokenKind::RBracket, "']'")?;
                Ok(Expr::ArrayLit(elems))
            }
            TokenKind::LParen => {
                if self.looks_like_lambda_params() {
                    return self.parse_lambda();
                }
                self.bump();
                let inner = self.parse_expr()?;
                self.expect_kind(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            _ => {
                self.error_expected("expression");
                Err(())
            }
        }
    }

    /// Look ahead past a balanced `(...)` to see whether it's followed by
    /// `=>` or `->` (lambda with explicit return type) to distinguish a
    /// lambda parameter list from a parenthesized expression.
    fn looks_like_lambda_params(&self) -> bool {
        let mut depth = 0i32;
        let mut i = 0usize;
        loop {
            let tok = self.peek_n(i);
            match tok.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        let after = self.peek_n(i + 1);
                        return after.kind == TokenKind::FatArrow || after.kind == TokenKind::Arrow;
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            i += 1;
            if i > 256 {
                return false;
            }
        }
    }

    fn parse_lambda(&mut self) -> PResult<Expr> {
        let params = self.parse_params()?;
        let return_type = if self.eat_kind(TokenKind::Arrow) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        self.expect_kind(TokenKind::FatArrow, "'=>'")?;
        let body = if self.check_kind(&TokenKind::LBrace) {
            LambdaBody::Block(self.parse_block()?)
        } else {
            LambdaBody::Expr(Box::new(self.parse_expr()?))
        };
        Ok(Expr::Lambda {
            params,
            return_type,
            body,
        })
    }
}

/// Parses a whole program, reporting diagnostics to `handler` and returning
/// the best-effort AST regardless of how many errors were found (callers
/// check `handler.has_errors()`/`parser.error_count()`).
pub fn parse(source: &str, handler: &Handler) -> Program {
    let mut parser = Parser::new(source, handler);
    parser.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        let handler = Handler::new();
        let program = parse(src, &handler);
        assert!(!handler.has_errors(), "unexpected parse errors for: {src}");
        program
    }

    #[test]
    fn parses_arithmetic_and_print() {
        let p = parse_ok("func main() { a = 2; b = 3; print a + b; }");
        assert_eq!(p.items.len(), 1);
    }

    #[test]
    fn parses_if_else() {
        let p = parse_ok("func main() { x = 10; if (x > 5) print \"big\"; else print \"small\"; }");
        match &p.items[0] {
            Item::FuncDef(f) => assert_eq!(f.body.len(), 2),
            _ => panic!("expected func"),
        }
    }

    #[test]
    fn parses_class_with_method() {
        let p = parse_ok(
            "class Point { x = 0; y = 0; func dist() => sqrt(this.x*this.x + this.y*this.y); }",
        );
        match &p.items[0] {
            Item::ClassDef(c) => {
                assert_eq!(c.fields.len(), 2);
                assert_eq!(c.methods.len(), 1);
            }
            _ => panic!("expected class"),
        }
    }

    #[test]
    fn parses_try_catch() {
        let p = parse_ok("func main() { try { throw \"ValidationError: bad\"; } catch (e) { print e; } }");
        match &p.items[0] {
            Item::FuncDef(f) => match &f.body[0] {
                Stmt::Try { catches, .. } => assert_eq!(catches.len(), 1),
                _ => panic!("expected try"),
            },
            _ => panic!("expected func"),
        }
    }

    #[test]
    fn parses_aliased_import() {
        let p = parse_ok("import math_lib as m;");
        assert_eq!(
            p.items[0],
            Item::Import(Import::Aliased {
                name: "math_lib".into(),
                alias: "m".into(),
            })
        );
    }

    #[test]
    fn parses_range_for() {
        let p = parse_ok("func main() { for i in range(1, 4) print i; }");
        match &p.items[0] {
            Item::FuncDef(f) => assert!(matches!(f.body[0], Stmt::ForRange { .. })),
            _ => panic!("expected func"),
        }
    }

    #[test]
    fn parses_collection_for() {
        let p = parse_ok("func main() { for x in xs print x; }");
        match &p.items[0] {
            Item::FuncDef(f) => assert!(matches!(f.body[0], Stmt::ForCollection { .. })),
            _ => panic!("expected func"),
        }
    }

    #[test]
    fn bare_identifier_eq_is_assignment() {
        let p = parse_ok("func main() { x = 1; }");
        match &p.items[0] {
            Item::FuncDef(f) => assert!(matches!(f.body[0], Stmt::VarAssign { .. })),
            _ => panic!(),
        }
    }

    #[test]
    fn bare_identifier_call_is_expr_stmt() {
        let p = parse_ok("func main() { foo(); }");
        match &p.items[0] {
            Item::FuncDef(f) => assert!(matches!(f.body[0], Stmt::Expr(Expr::Call { .. }))),
            _ => panic!(),
        }
    }

    #[test]
    fn parses_match_with_guard_and_otherwise() {
        let p = parse_ok(
            "func main() { match (x) { case 1 => print \"one\"; case n when n > 5 => print \"big\"; case otherwise => print \"?\"; } }",
        );
        match &p.items[0] {
            Item::FuncDef(f) => match &f.body[0] {
                Stmt::Match { arms, .. } => assert_eq!(arms.len(), 3),
                _ => panic!("expected match"),
            },
            _ => panic!(),
        }
    }

    #[test]
    fn parses_lambda_and_composition() {
        let p = parse_ok("func main() { f = (x) => x + 1; h = f >> f; }");
        match &p.items[0] {
            Item::FuncDef(f) => {
                assert!(matches!(
                    f.body[0],
                    Stmt::VarAssign { value: Expr::Lambda { .. }, .. }
                ));
                assert!(matches!(
                    f.body[1],
                    Stmt::VarAssign { value: Expr::Compose { .. }, .. }
                ));
            }
            _ => panic!(),
        }
    }

    #[test]
    fn recovers_from_syntax_error_and_reports_all_errors() {
        let handler = Handler::new();
        let src = "func main() { x = ; y = ; }";
        let _ = parse(src, &handler);
        assert_eq!(handler.error_count(), 2);
    }

    #[test]
    fn parses_aspect_with_pointcut_and_advice() {
        let p = parse_ok(
            r#"aspect Logging {
                pointcut calls = "fib*";
                before calls { print "enter"; }
                after calls { print "exit"; }
            }"#,
        );
        match &p.items[0] {
            Item::AspectDef(a) => {
                assert_eq!(a.pointcuts.len(), 1);
                assert_eq!(a.advice.len(), 2);
            }
            _ => panic!("expected aspect"),
        }
    }

    #[test]
    fn parses_macro_def() {
        let p = parse_ok("macro double(x) { return x * 2; }");
        assert!(matches!(p.items[0], Item::MacroDef(_)));
    }
}
