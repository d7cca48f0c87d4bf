//! orionc-lex - Lexical analyzer for the Orion language.
//!
//! Transforms a source buffer into a stream of [`Token`]s. Consumers are the
//! recursive-descent parser in `orionc-par`, which needs arbitrary lookahead
//! (`peek`) and the ability to rewind to an earlier position (`save`/
//! `restore`) to disambiguate a bare identifier as the start of an assignment,
//! a call, or a plain expression statement.
//!
//! The lexer is eager: the whole source is scanned once in [`Lexer::new`] into
//! a flat token buffer, and `next`/`peek`/`save`/`restore` are cheap index
//! operations over that buffer. This keeps the speculative-parse contract
//! trivial to implement correctly at the cost of a small, bounded amount of
//! up-front memory (one token per lexeme).

use orionc_util::Span;
use std::fmt;

/// A keyword recognized by the lexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    If,
    Else,
    For,
    While,
    Do,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Func,
    Class,
    Extends,
    New,
    This,
    Module,
    Import,
    Export,
    From,
    As,
    Try,
    Catch,
    Finally,
    Throw,
    Match,
    When,
    Otherwise,
    Aspect,
    Pointcut,
    Advice,
    Before,
    After,
    Around,
    Macro,
    In,
    Range,
    Print,
}

impl Keyword {
    /// Look up a keyword by its source text. Returns `None` for ordinary
    /// identifiers.
    pub fn lookup(text: &str) -> Option<Keyword> {
        use Keyword::*;
        Some(match text {
            "if" => If,
            "else" => Else,
            "for" => For,
            "while" => While,
            "do" => Do,
            "switch" => Switch,
            "case" => Case,
            "default" => Default,
            "break" => Break,
            "continue" => Continue,
            "return" => Return,
            "func" => Func,
            "class" => Class,
            "extends" => Extends,
            "new" => New,
            "this" => This,
            "module" => Module,
            "import" => Import,
            "export" => Export,
            "from" => From,
            "as" => As,
            "try" => Try,
            "catch" => Catch,
            "finally" => Finally,
            "throw" => Throw,
            "match" => Match,
            "when" => When,
            "otherwise" => Otherwise,
            "aspect" => Aspect,
            "pointcut" => Pointcut,
            "advice" => Advice,
            "before" => Before,
            "after" => After,
            "around" => Around,
            "macro" => Macro,
            "in" => In,
            "range" => Range,
            "print" => Print,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        use Keyword::*;
        match self {
            If => "if",
            Else => "else",
            For => "for",
            While => "while",
            Do => "do",
            Switch => "switch",
            Case => "case",
            Default => "default",
            Break => "break",
            Continue => "continue",
            Return => "return",
            Func => "func",
            Class => "class",
            Extends => "extends",
            New => "new",
            This => "this",
            Module => "module",
            Import => "import",
            Export => "export",
            From => "from",
            As => "as",
            Try => "try",
            Catch => "catch",
            Finally => "finally",
            Throw => "throw",
            Match => "match",
            When => "when",
            Otherwise => "otherwise",
            Aspect => "aspect",
            Pointcut => "pointcut",
            Advice => "advice",
            Before => "before",
            After => "after",
            Around => "around",
            Macro => "macro",
            In => "in",
            Range => "range",
            Print => "print",
        }
    }
}

/// The literal/numeric payload carried by some tokens.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// A numeric literal. `is_float` records whether a `.` was present in the
    /// source so the parser can distinguish `Int` from `Float` literals
    /// without re-scanning the lexeme.
    Number { value: f64, is_float: bool },
    /// The unescaped contents of a string literal (quotes stripped, escapes
    /// resolved).
    Str(String),
    /// A human-readable diagnostic for an `Invalid` token.
    Message(String),
}

/// The kind of a token. Multi-character operators are recognized by maximal
/// munch in [`Lexer::scan_one`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    True,
    False,
    Null,
    Keyword(Keyword),

    // Punctuation / operators
    Plus,        // +
    Minus,       // -
    Star,        // *
    Slash,       // /
    Percent,     // %
    Hash,        // #   stringify
    HashHash,    // ##  paste
    Eq,          // =
    EqEq,        // ==
    Bang,        // !
    BangEq,      // !=
    Lt,          // <
    LtEq,        // <=
    Gt,          // >
    GtEq,        // >=
    AmpAmp,      // &&
    PipePipe,    // ||
    PlusEq,      // +=
    MinusEq,     // -=
    StarEq,      // *=
    SlashEq,     // /=
    Arrow,       // ->
    FatArrow,    // =>
    Compose,     // >>
    Dot,         // .
    DotDot,      // ..
    Comma,       // ,
    Colon,       // :
    Semicolon,   // ;
    LParen,      // (
    RParen,      // )
    LBrace,      // {
    RBrace,      // }
    LBracket,    // [
    RBracket,    // ]

    Eof,
    /// Lexical fault: unterminated string or a character that begins no
    /// token. The diagnostic message is stashed in `payload`.
    Invalid,
}

/// A single lexical token.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: u32,
    pub column: u32,
    pub payload: Option<Payload>,
}

impl Token {
    pub fn span(&self) -> Span {
        Span::new(0, self.lexeme.len(), self.line, self.column)
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    pub fn as_keyword(&self) -> Option<Keyword> {
        match self.kind {
            TokenKind::Keyword(k) => Some(k),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?})", self.kind, self.lexeme)
    }
}

/// An opaque checkpoint returned by [`Lexer::save`] and consumed by
/// [`Lexer::restore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// The lexer. Scans the whole source up front into a token buffer; `next`,
/// `peek`, `save`, and `restore` are index operations over that buffer.
pub struct Lexer {
    tokens: Vec<Token>,
    cursor: usize,
    debug_level: u8,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        let tokens = tokenize(source);
        Lexer {
            tokens,
            cursor: 0,
            debug_level: 0,
        }
    }

    /// Adjusts diagnostic verbosity. Higher levels cause `next`/`peek` to
    /// trace their operation to stderr; this has no effect on tokenization.
    pub fn set_debug_level(&mut self, level: u8) {
        self.debug_level = level;
    }

    fn at(&self, index: usize) -> Token {
        let last = self.tokens.len() - 1;
        self.tokens[index.min(last)].clone()
    }

    /// Returns the next token and advances. Idempotent at end of input: once
    /// the cursor reaches the trailing `Eof` token it keeps returning `Eof`.
    pub fn next(&mut self) -> Token {
        let tok = self.at(self.cursor);
        if self.cursor < self.tokens.len() - 1 {
            self.cursor += 1;
        }
        if self.debug_level > 0 {
            eprintln!("[lex] next -> {}", tok);
        }
        tok
    }

    /// Looks `n` tokens ahead without consuming. `peek(0)` is the token that
    /// the next call to `next()` would return.
    pub fn peek(&self, n: usize) -> Token {
        self.at(self.cursor + n)
    }

    /// Checkpoints the current position.
    pub fn save(&self) -> Checkpoint {
        Checkpoint(self.cursor)
    }

    /// Rewinds to a previously saved position.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.cursor = checkpoint.0;
    }

    /// True once every token has been consumed (cursor sits on the trailing
    /// `Eof`).
    pub fn at_eof(&self) -> bool {
        self.tokens[self.cursor].is_eof()
    }
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.at_eof() {
            None
        } else {
            Some(Lexer::next(self))
        }
    }
}

/// Scans `source` into a flat token buffer terminated by exactly one `Eof`.
fn tokenize(source: &str) -> Vec<Token> {
    let mut scanner = Scanner::new(source);
    let mut out = Vec::new();
    loop {
        let tok = scanner.scan_one();
        let is_eof = tok.is_eof();
        out.push(tok);
        if is_eof {
            break;
        }
    }
    out
}

struct Scanner<'s> {
    chars: Vec<char>,
    source: &'s str,
    pos: usize,
    line: u32,
    column: u32,
}

impl<'s> Scanner<'s> {
    fn new(source: &'s str) -> Self {
        Scanner {
            chars: source.chars().collect(),
            source,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char(0)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            // Tabs count as a single column, per the lexer contract.
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek_char(0) == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char(0) {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_char(1) == Some('/') => {
                    while !matches!(self.peek_char(0), None | Some('\n')) {
                        self.bump();
                    }
                }
                Some('/') if self.peek_char(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek_char(0) {
                            None => break,
                            Some('*') if self.peek_char(1) == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn make(&self, kind: TokenKind, lexeme: String, line: u32, column: u32) -> Token {
        Token {
            kind,
            lexeme,
            line,
            column,
            payload: None,
        }
    }

    fn scan_one(&mut self) -> Token {
        self.skip_trivia();
        let (line, column) = (self.line, self.column);

        let c = match self.bump() {
            None => return self.make(TokenKind::Eof, String::new(), line, column),
            Some(c) => c,
        };

        if c.is_ascii_digit() {
            return self.scan_number(c, line, column);
        }
        if c == '_' || c.is_alphabetic() {
            return self.scan_ident(c, line, column);
        }
        if c == '"' {
            return self.scan_string(line, column);
        }

        use TokenKind::*;
        let (kind, lexeme) = match c {
            '+' if self.eat('=') => (PlusEq, "+=".to_string()),
            '+' => (Plus, "+".to_string()),
            '-' if self.eat('=') => (MinusEq, "-=".to_string()),
            '-' if self.eat('>') => (Arrow, "->".to_string()),
            '-' => (Minus, "-".to_string()),
            '*' if self.eat('=') => (StarEq, "*=".to_string()),
            '*' => (Star, "*".to_string()),
            '/' if self.eat('=') => (SlashEq, "/=".to_string()),
            '/' => (Slash, "/".to_string()),
            '%' => (Percent, "%".to_string()),
            '#' if self.eat('#') => (HashHash, "##".to_string()),
            '#' => (Hash, "#".to_string()),
            '=' if self.eat('=') => (EqEq, "==".to_string()),
            '=' if self.eat('>') => (FatArrow, "=>".to_string()),
            '=' => (Eq, "=".to_string()),
            '!' if self.eat('=') => (BangEq, "!=".to_string()),
            '!' => (Bang, "!".to_string()),
            '<' if self.eat('=') => (LtEq, "<=".to_string()),
            '<' => (Lt, "<".to_string()),
            '>' if self.eat('=') => (GtEq, ">=".to_string()),
            '>' if self.eat('>') => (Compose, ">>".to_string()),
            '>' => (Gt, ">".to_string()),
            '&' if self.eat('&') => (AmpAmp, "&&".to_string()),
            '|' if self.eat('|') => (PipePipe, "||".to_string()),
            '.' if self.eat('.') => (DotDot, "..".to_string()),
            '.' => (Dot, ".".to_string()),
            ',' => (Comma, ",".to_string()),
            ':' => (Colon, ":".to_string()),
            ';' => (Semicolon, ";".to_string()),
            '(' => (LParen, "(".to_string()),
            ')' => (RParen, ")".to_string()),
            '{' => (LBrace, "{".to_string()),
            '}' => (RBrace, "}".to_string()),
            '[' => (LBracket, "[".to_string()),
            ']' => (RBracket, "]".to_string()),
            other => {
                let mut tok = self.make(Invalid, other.to_string(), line, column);
                tok.payload = Some(Payload::Message(format!(
                    "unexpected character {:?} at {}:{}",
                    other, line, column
                )));
                return tok;
            }
        };
        self.make(kind, lexeme, line, column)
    }

    fn scan_ident(&mut self, first: char, line: u32, column: u32) -> Token {
        let mut text = String::new();
        text.push(first);
        while let Some(c) = self.peek_char(0) {
            if c == '_' || c.is_alphanumeric() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let kind = match text.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => match Keyword::lookup(&text) {
                Some(kw) => TokenKind::Keyword(kw),
                None => TokenKind::Ident,
            },
        };
        self.make(kind, text, line, column)
    }

    fn scan_number(&mut self, first: char, line: u32, column: u32) -> Token {
        let mut text = String::new();
        text.push(first);
        let mut is_float = false;
        while let Some(c) = self.peek_char(0) {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else if c == '.' && !is_float && self.peek_char(1).map_or(false, |c2| c2.is_ascii_digit()) {
                is_float = true;
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let value: f64 = text.parse().unwrap_or(0.0);
        let mut tok = self.make(TokenKind::Number, text, line, column);
        tok.payload = Some(Payload::Number { value, is_float });
        tok
    }

    fn scan_string(&mut self, line: u32, column: u32) -> Token {
        let mut raw = String::from("\"");
        let mut value = String::new();
        loop {
            match self.peek_char(0) {
                None | Some('\n') => {
                    let mut tok = self.make(TokenKind::Invalid, raw, line, column);
                    tok.payload = Some(Payload::Message(format!(
                        "unterminated string literal starting at {}:{}",
                        line, column
                    )));
                    return tok;
                }
                Some('"') => {
                    self.bump();
                    raw.push('"');
                    break;
                }
                Some('\\') => {
                    self.bump();
                    raw.push('\\');
                    match self.bump() {
                        Some('n') => {
                            value.push('\n');
                            raw.push('n');
                        }
                        Some('t') => {
                            value.push('\t');
                            raw.push('t');
                        }
                        Some('"') => {
                            value.push('"');
                            raw.push('"');
                        }
                        Some('\\') => {
                            value.push('\\');
                            raw.push('\\');
                        }
                        Some(other) => {
                            value.push(other);
                            raw.push(other);
                        }
                        None => {
                            let mut tok = self.make(TokenKind::Invalid, raw, line, column);
                            tok.payload = Some(Payload::Message(
                                "unterminated string literal (trailing escape)".to_string(),
                            ));
                            return tok;
                        }
                    }
                }
                Some(c) => {
                    self.bump();
                    raw.push(c);
                    value.push(c);
                }
            }
        }
        let mut tok = self.make(TokenKind::Str, raw, line, column);
        tok.payload = Some(Payload::Str(value));
        tok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn skips_whitespace_and_comments() {
        let ks = kinds("  // comment\n/* block */  x  ");
        assert_eq!(ks, vec![TokenKind::Ident, TokenKind::Eof]);
    }

    #[test]
    fn maximal_munch_operators() {
        let ks = kinds("== != <= >= && || -> => >> .. += -= *= /= ##");
        assert_eq!(
            ks,
            vec![
                TokenKind::EqEq,
                TokenKind::BangEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::AmpAmp,
                TokenKind::PipePipe,
                TokenKind::Arrow,
                TokenKind::FatArrow,
                TokenKind::Compose,
                TokenKind::DotDot,
                TokenKind::PlusEq,
                TokenKind::MinusEq,
                TokenKind::StarEq,
                TokenKind::SlashEq,
                TokenKind::HashHash,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numeric_literal_records_fraction() {
        let toks = Lexer::new("42 3.14").tokens;
        assert_eq!(
            toks[0].payload,
            Some(Payload::Number { value: 42.0, is_float: false })
        );
        assert_eq!(
            toks[1].payload,
            Some(Payload::Number { value: 3.14, is_float: true })
        );
    }

    #[test]
    fn unterminated_string_yields_single_invalid_then_eof() {
        let toks = Lexer::new("\"abc").tokens;
        assert_eq!(toks.len(), 2);
        assert_eq!(toks[0].kind, TokenKind::Invalid);
        assert_eq!(toks[1].kind, TokenKind::Eof);
    }

    #[test]
    fn string_escapes_are_resolved() {
        let toks = Lexer::new(r#""a\nb""#).tokens;
        assert_eq!(toks[0].payload, Some(Payload::Str("a\nb".to_string())));
    }

    #[test]
    fn keywords_are_disambiguated_from_identifiers() {
        let toks = Lexer::new("class classy").tokens;
        assert_eq!(toks[0].kind, TokenKind::Keyword(Keyword::Class));
        assert_eq!(toks[1].kind, TokenKind::Ident);
    }

    #[test]
    fn save_restore_round_trips() {
        let mut lex = Lexer::new("a b c");
        let _ = lex.next();
        let cp = lex.save();
        let second = lex.next();
        lex.restore(cp);
        assert_eq!(lex.next(), second);
    }

    #[test]
    fn n_tokens_then_infinite_eof() {
        let mut lex = Lexer::new("a b");
        assert!(!lex.next().is_eof());
        assert!(!lex.next().is_eof());
        assert!(lex.next().is_eof());
        assert!(lex.next().is_eof());
        assert!(lex.next().is_eof());
    }

    #[test]
    fn peek_does_not_advance() {
        let mut lex = Lexer::new("a b");
        let peeked = lex.peek(1);
        let first = lex.next();
        let second = lex.next();
        assert_eq!(first.lexeme, "a");
        assert_eq!(peeked, second);
    }

    #[test]
    fn tab_counts_as_one_column() {
        let toks = Lexer::new("\tx").tokens;
        assert_eq!(toks[0].column, 2);
    }

    #[test]
    fn line_counter_increments_on_newline() {
        let toks = Lexer::new("a\nb").tokens;
        assert_eq!(toks[0].line, 1);
        assert_eq!(toks[1].line, 2);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// No arbitrary input can make the scanner loop forever or panic;
        /// it always terminates with exactly one trailing `Eof`.
        #[test]
        fn never_panics_and_always_terminates(src in ".{0,200}") {
            let tokens = Lexer::new(&src).tokens;
            prop_assert!(tokens.last().unwrap().is_eof());
            prop_assert_eq!(tokens.iter().filter(|t| t.is_eof()).count(), 1);
        }
    }
}
