//! Lexer (tokenizer) for Mica source code
//!
//! Converts raw source text into a flat [`Token`] stream consumed by the
//! preprocessor and parser. `//` and `/* */` comments are trivia and never
//! produce tokens; `#` directive lines become [`TokenKind::Comment`] tokens
//! whose lexeme is the directive text, routed to the preprocessor rather
//! than the parser.

use crate::diagnostics::DiagnosticBag;
use std::fmt;
use std::rc::Rc;

/// Lexical classification of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals and names
    Identifier,
    Number,
    String,
    Character,

    // Keywords
    Int,
    Char,
    Bool,
    Void,
    Struct,
    Mutable,
    Signed,
    Unsigned,
    Private,
    Export,
    Extern,
    Hint,
    CCall,
    StdCall,
    If,
    Else,
    While,
    For,
    Return,
    Break,
    True,
    False,
    Null,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equal,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PercentEqual,
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    AmpAmp,
    PipePipe,
    Bang,
    Amp,
    Pipe,
    Caret,
    Tilde,
    LessLess,
    GreaterGreater,
    Question,
    Colon,
    Dot,

    // Punctuation
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Semicolon,
    Comma,

    /// A `#` directive line; the lexeme is the text after the `#`.
    Comment,
    Unknown,
    EndOfFile,
}

impl TokenKind {
    /// Human-readable name used in diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Identifier => "identifier",
            TokenKind::Number => "number literal",
            TokenKind::String => "string literal",
            TokenKind::Character => "character literal",
            TokenKind::Int => "'int'",
            TokenKind::Char => "'char'",
            TokenKind::Bool => "'bool'",
            TokenKind::Void => "'void'",
            TokenKind::Struct => "'struct'",
            TokenKind::Mutable => "'mutable'",
            TokenKind::Signed => "'signed'",
            TokenKind::Unsigned => "'unsigned'",
            TokenKind::Private => "'private'",
            TokenKind::Export => "'export'",
            TokenKind::Extern => "'extern'",
            TokenKind::Hint => "'hint'",
            TokenKind::CCall => "'ccall'",
            TokenKind::StdCall => "'stdcall'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::While => "'while'",
            TokenKind::For => "'for'",
            TokenKind::Return => "'return'",
            TokenKind::Break => "'break'",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Null => "'null'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Equal => "'='",
            TokenKind::PlusEqual => "'+='",
            TokenKind::MinusEqual => "'-='",
            TokenKind::StarEqual => "'*='",
            TokenKind::SlashEqual => "'/='",
            TokenKind::PercentEqual => "'%='",
            TokenKind::EqualEqual => "'=='",
            TokenKind::BangEqual => "'!='",
            TokenKind::Less => "'<'",
            TokenKind::LessEqual => "'<='",
            TokenKind::Greater => "'>'",
            TokenKind::GreaterEqual => "'>='",
            TokenKind::AmpAmp => "'&&'",
            TokenKind::PipePipe => "'||'",
            TokenKind::Bang => "'!'",
            TokenKind::Amp => "'&'",
            TokenKind::Pipe => "'|'",
            TokenKind::Caret => "'^'",
            TokenKind::Tilde => "'~'",
            TokenKind::LessLess => "'<<'",
            TokenKind::GreaterGreater => "'>>'",
            TokenKind::Question => "'?'",
            TokenKind::Colon => "':'",
            TokenKind::Dot => "'.'",
            TokenKind::OpenParen => "'('",
            TokenKind::CloseParen => "')'",
            TokenKind::OpenBrace => "'{'",
            TokenKind::CloseBrace => "'}'",
            TokenKind::OpenBracket => "'['",
            TokenKind::CloseBracket => "']'",
            TokenKind::Semicolon => "';'",
            TokenKind::Comma => "','",
            TokenKind::Comment => "directive",
            TokenKind::Unknown => "unknown token",
            TokenKind::EndOfFile => "end of file",
        }
    }
}

/// A classified slice of source text with its position.
///
/// Immutable once produced; tree nodes retain the tokens that produced them
/// so diagnostics can point back into the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub file: Rc<str>,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: String, file: Rc<str>, line: u32, column: u32) -> Self {
        Self {
            kind,
            lexeme,
            file,
            line,
            column,
        }
    }

    /// A fabricated token standing in for an expected-but-missing one,
    /// positioned at the token it replaces.
    pub fn placeholder(kind: TokenKind, at: &Token) -> Self {
        Self {
            kind,
            lexeme: String::new(),
            file: Rc::clone(&at.file),
            line: at.line,
            column: at.column,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Identifier => write!(f, "identifier '{}'", self.lexeme),
            TokenKind::Number => write!(f, "number literal {}", self.lexeme),
            TokenKind::String => write!(f, "string literal \"{}\"", self.lexeme),
            TokenKind::Character => {
                write!(f, "character literal '{}'", self.lexeme.escape_default())
            }
            _ => write!(f, "{}", self.kind.describe()),
        }
    }
}

/// Map an identifier to its keyword kind, if it is reserved.
fn keyword_kind(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "int" => TokenKind::Int,
        "char" => TokenKind::Char,
        "bool" => TokenKind::Bool,
        "void" => TokenKind::Void,
        "struct" => TokenKind::Struct,
        "mutable" => TokenKind::Mutable,
        "signed" => TokenKind::Signed,
        "unsigned" => TokenKind::Unsigned,
        "private" => TokenKind::Private,
        "export" => TokenKind::Export,
        "extern" => TokenKind::Extern,
        "hint" => TokenKind::Hint,
        "ccall" => TokenKind::CCall,
        "stdcall" => TokenKind::StdCall,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "return" => TokenKind::Return,
        "break" => TokenKind::Break,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        _ => return None,
    };
    Some(kind)
}

/// Single-pass lexer over one source file.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: u32,
    column: u32,
    file: Rc<str>,
}

impl Lexer {
    pub fn new(source: &str, file: Rc<str>) -> Self {
        Self {
            input: source.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            file,
        }
    }

    /// Drain the lexer into a token vector ending with `EndOfFile`.
    pub fn tokenize(&mut self, diagnostics: &mut DiagnosticBag) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token(diagnostics);
            let done = token.is(TokenKind::EndOfFile);
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    /// Produce the next token; repeatedly returns `EndOfFile` at the end.
    pub fn next_token(&mut self, diagnostics: &mut DiagnosticBag) -> Token {
        self.skip_trivia();

        let (line, column) = (self.line, self.column);
        let ch = match self.advance() {
            Some(ch) => ch,
            None => return self.token_at(TokenKind::EndOfFile, String::new(), line, column),
        };

        match ch {
            '#' => self.directive(line, column),
            '"' => self.string_literal(diagnostics, line, column),
            '\'' => self.char_literal(diagnostics, line, column),
            '0'..='9' => self.number_literal(ch, line, column),
            'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(ch, line, column),

            '+' => self.one_of(&[('=', TokenKind::PlusEqual)], TokenKind::Plus, line, column),
            '-' => self.one_of(&[('=', TokenKind::MinusEqual)], TokenKind::Minus, line, column),
            '*' => self.one_of(&[('=', TokenKind::StarEqual)], TokenKind::Star, line, column),
            '/' => self.one_of(&[('=', TokenKind::SlashEqual)], TokenKind::Slash, line, column),
            '%' => self.one_of(
                &[('=', TokenKind::PercentEqual)],
                TokenKind::Percent,
                line,
                column,
            ),
            '=' => self.one_of(&[('=', TokenKind::EqualEqual)], TokenKind::Equal, line, column),
            '!' => self.one_of(&[('=', TokenKind::BangEqual)], TokenKind::Bang, line, column),
            '<' => self.one_of(
                &[('=', TokenKind::LessEqual), ('<', TokenKind::LessLess)],
                TokenKind::Less,
                line,
                column,
            ),
            '>' => self.one_of(
                &[
                    ('=', TokenKind::GreaterEqual),
                    ('>', TokenKind::GreaterGreater),
                ],
                TokenKind::Greater,
                line,
                column,
            ),
            '&' => self.one_of(&[('&', TokenKind::AmpAmp)], TokenKind::Amp, line, column),
            '|' => self.one_of(&[('|', TokenKind::PipePipe)], TokenKind::Pipe, line, column),
            '^' => self.token_at(TokenKind::Caret, ch.to_string(), line, column),
            '~' => self.token_at(TokenKind::Tilde, ch.to_string(), line, column),
            '?' => self.token_at(TokenKind::Question, ch.to_string(), line, column),
            ':' => self.token_at(TokenKind::Colon, ch.to_string(), line, column),
            '.' => self.token_at(TokenKind::Dot, ch.to_string(), line, column),
            '(' => self.token_at(TokenKind::OpenParen, ch.to_string(), line, column),
            ')' => self.token_at(TokenKind::CloseParen, ch.to_string(), line, column),
            '{' => self.token_at(TokenKind::OpenBrace, ch.to_string(), line, column),
            '}' => self.token_at(TokenKind::CloseBrace, ch.to_string(), line, column),
            '[' => self.token_at(TokenKind::OpenBracket, ch.to_string(), line, column),
            ']' => self.token_at(TokenKind::CloseBracket, ch.to_string(), line, column),
            ';' => self.token_at(TokenKind::Semicolon, ch.to_string(), line, column),
            ',' => self.token_at(TokenKind::Comma, ch.to_string(), line, column),

            _ => {
                let token = self.token_at(TokenKind::Unknown, ch.to_string(), line, column);
                diagnostics.report_error(&token, format!("unexpected character '{}'", ch));
                token
            }
        }
    }

    /// Multi-character operator with longest match: try each follow
    /// character, fall back to the single-character kind.
    fn one_of(
        &mut self,
        follows: &[(char, TokenKind)],
        single: TokenKind,
        line: u32,
        column: u32,
    ) -> Token {
        for &(next, kind) in follows {
            if self.peek() == Some(next) {
                self.advance();
                let lexeme = kind.describe().trim_matches('\'').to_string();
                return self.token_at(kind, lexeme, line, column);
            }
        }
        let lexeme = single.describe().trim_matches('\'').to_string();
        self.token_at(single, lexeme, line, column)
    }

    /// A `#` directive runs to the end of its line; the lexeme is the
    /// trimmed text after `#`.
    fn directive(&mut self, line: u32, column: u32) -> Token {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            text.push(ch);
            self.advance();
        }
        self.token_at(TokenKind::Comment, text.trim().to_string(), line, column)
    }

    fn string_literal(
        &mut self,
        diagnostics: &mut DiagnosticBag,
        line: u32,
        column: u32,
    ) -> Token {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch == '"' {
                self.advance();
                return self.token_at(TokenKind::String, text, line, column);
            }
            if ch == '\\' {
                self.advance();
                if let Some(unescaped) = self.escape_char(diagnostics) {
                    text.push(unescaped);
                }
            } else {
                text.push(ch);
                self.advance();
            }
        }

        let token = self.token_at(TokenKind::String, text, line, column);
        diagnostics.report_error(&token, "unterminated string literal");
        token
    }

    fn char_literal(&mut self, diagnostics: &mut DiagnosticBag, line: u32, column: u32) -> Token {
        let value = match self.advance() {
            Some('\\') => self.escape_char(diagnostics).unwrap_or('\0'),
            Some(ch) => ch,
            None => {
                let token = self.token_at(TokenKind::Character, String::new(), line, column);
                diagnostics.report_error(&token, "unterminated character literal");
                return token;
            }
        };

        let token = self.token_at(TokenKind::Character, value.to_string(), line, column);
        if self.advance() != Some('\'') {
            diagnostics.report_error(&token, "expected closing quote in character literal");
        }
        token
    }

    /// Decode the character after a consumed backslash.
    fn escape_char(&mut self, diagnostics: &mut DiagnosticBag) -> Option<char> {
        let escaped = self.advance()?;
        let value = match escaped {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            '0' => '\0',
            'x' => {
                let hex: String = [self.advance()?, self.advance()?].iter().collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(v) => v as char,
                    Err(_) => {
                        let token =
                            self.token_at(TokenKind::Unknown, hex.clone(), self.line, self.column);
                        diagnostics.report_error(
                            &token,
                            format!("invalid hex escape sequence \\x{}", hex),
                        );
                        return None;
                    }
                }
            }
            _ => {
                let token = self.token_at(
                    TokenKind::Unknown,
                    escaped.to_string(),
                    self.line,
                    self.column,
                );
                diagnostics.report_error(&token, format!("unknown escape sequence \\{}", escaped));
                return None;
            }
        };
        Some(value)
    }

    fn number_literal(&mut self, first: char, line: u32, column: u32) -> Token {
        let mut digits = String::new();
        digits.push(first);
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        self.token_at(TokenKind::Number, digits, line, column)
    }

    fn identifier_or_keyword(&mut self, first: char, line: u32, column: u32) -> Token {
        let mut ident = String::new();
        ident.push(first);
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let kind = keyword_kind(&ident).unwrap_or(TokenKind::Identifier);
        self.token_at(kind, ident, line, column)
    }

    /// Skip whitespace and `//`/`/* */` comments. `#` lines are tokens,
    /// not trivia, and are left for `next_token`.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') | Some('\n') => {
                    self.advance();
                }
                Some('/') => {
                    if self.peek_ahead(1) == Some('/') {
                        self.skip_line_comment();
                    } else if self.peek_ahead(1) == Some('*') {
                        self.skip_block_comment();
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek() {
            self.advance();
            if ch == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) {
        self.advance(); // '/'
        self.advance(); // '*'
        while self.position < self.input.len() {
            if self.peek() == Some('*') && self.peek_ahead(1) == Some('/') {
                self.advance();
                self.advance();
                return;
            }
            self.advance();
        }
    }

    fn token_at(&self, kind: TokenKind, lexeme: String, line: u32, column: u32) -> Token {
        Token::new(kind, lexeme, Rc::clone(&self.file), line, column)
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.input.get(self.position + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }
}
