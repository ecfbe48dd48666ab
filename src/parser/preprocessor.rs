//! Preprocessor: a lexer-level token filter
//!
//! Directives ride in `#` comment tokens and are re-lexed with a private
//! sub-lexer over the directive text:
//!
//! - `include "path"` / `include <path>` inlines another file's fully lexed
//!   and preprocessed token stream
//! - `define NAME TOKEN` registers a single-token, non-recursive macro
//! - `if COND` / `ifdef NAME` / `ifndef NAME` / `else` / `endif` discard
//!   tokens from disabled branches
//!
//! Conditional state is a stack of frames, so nested `if`/`endif` blocks
//! pair correctly even inside disabled regions; a token is emitted only
//! when every enclosing frame is active.

use crate::diagnostics::DiagnosticBag;
use crate::parser::lexer::{Lexer, Token, TokenKind};
use rustc_hash::FxHashMap;
use std::fs;
use std::path::PathBuf;

/// Expands directives in a lexed token stream, producing the final token
/// sequence consumed by the parser.
pub struct Preprocessor {
    defines: FxHashMap<String, Token>,
    conditionals: Vec<bool>,
    include_paths: Vec<PathBuf>,
}

impl Preprocessor {
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Self {
            defines: FxHashMap::default(),
            conditionals: Vec::new(),
            include_paths,
        }
    }

    /// Run the filter over a full token stream. The result always ends with
    /// the stream's `EndOfFile` token.
    pub fn process(&mut self, tokens: Vec<Token>, diagnostics: &mut DiagnosticBag) -> Vec<Token> {
        let eof = tokens
            .last()
            .cloned()
            .expect("lexer output always ends with an end-of-file token");

        let mut output = Vec::with_capacity(tokens.len());
        self.expand_into(tokens, &mut output, diagnostics);

        if !self.conditionals.is_empty() {
            diagnostics.report_error(&eof, "missing 'endif' before end of file");
            self.conditionals.clear();
        }

        output.push(eof);
        output
    }

    /// Append the non-directive tokens of `tokens` to `output`, expanding
    /// directives recursively. `EndOfFile` tokens are dropped here so that
    /// included streams splice cleanly.
    fn expand_into(
        &mut self,
        tokens: Vec<Token>,
        output: &mut Vec<Token>,
        diagnostics: &mut DiagnosticBag,
    ) {
        for token in tokens {
            match token.kind {
                TokenKind::Comment => self.directive(&token, output, diagnostics),
                TokenKind::EndOfFile => {}
                _ if self.active() => output.push(self.substitute(token)),
                _ => {}
            }
        }
    }

    /// All enclosing conditional frames allow emission.
    fn active(&self) -> bool {
        self.conditionals.iter().all(|&enabled| enabled)
    }

    /// Single-token define substitution; not recursive.
    fn substitute(&self, token: Token) -> Token {
        if token.is(TokenKind::Identifier) {
            if let Some(replacement) = self.defines.get(&token.lexeme) {
                return replacement.clone();
            }
        }
        token
    }

    fn directive(
        &mut self,
        comment: &Token,
        output: &mut Vec<Token>,
        diagnostics: &mut DiagnosticBag,
    ) {
        let mut sub = Lexer::new(&comment.lexeme, comment.file.clone());
        let name = sub.next_token(diagnostics);

        match name.lexeme.as_str() {
            "include" => {
                if self.active() {
                    self.include(comment, &mut sub, output, diagnostics);
                }
            }
            "define" => {
                if self.active() {
                    let name = sub.next_token(diagnostics);
                    if !name.is(TokenKind::Identifier) {
                        diagnostics.report_error(comment, "expected a name after 'define'");
                        return;
                    }
                    let value = sub.next_token(diagnostics);
                    self.defines.insert(name.lexeme, value);
                }
            }
            "if" => {
                let condition = self.substitute(sub.next_token(diagnostics));
                let enabled = condition.lexeme == "true" || condition.lexeme == "1";
                self.conditionals.push(enabled);
            }
            "ifdef" => {
                let condition = sub.next_token(diagnostics);
                self.conditionals
                    .push(self.defines.contains_key(&condition.lexeme));
            }
            "ifndef" => {
                let condition = sub.next_token(diagnostics);
                self.conditionals
                    .push(!self.defines.contains_key(&condition.lexeme));
            }
            "else" => match self.conditionals.last_mut() {
                Some(enabled) => *enabled = !*enabled,
                None => diagnostics.report_error(comment, "'else' without a matching 'if'"),
            },
            "endif" => {
                if self.conditionals.pop().is_none() {
                    diagnostics.report_error(comment, "'endif' without a matching 'if'");
                }
            }
            other => {
                diagnostics
                    .report_warning(comment, format!("unknown preprocessor directive '{}'", other));
            }
        }
    }

    /// Inline the fully lexed and preprocessed token stream of another file.
    fn include(
        &mut self,
        comment: &Token,
        sub: &mut Lexer,
        output: &mut Vec<Token>,
        diagnostics: &mut DiagnosticBag,
    ) {
        let path_token = sub.next_token(diagnostics);
        let path = match path_token.kind {
            TokenKind::String => path_token.lexeme.clone(),
            // `< path >` form: collect lexemes up to the closing '>'.
            TokenKind::Less => {
                let mut path = String::new();
                loop {
                    let piece = sub.next_token(diagnostics);
                    if piece.is(TokenKind::Greater) || piece.is(TokenKind::EndOfFile) {
                        break;
                    }
                    path.push_str(&piece.lexeme);
                }
                path
            }
            _ => {
                diagnostics.report_error(comment, "expected a file path after 'include'");
                return;
            }
        };

        let Some((resolved, source)) = self.locate(&path) else {
            diagnostics.report_error(comment, format!("cannot open include file '{}'", path));
            return;
        };

        let file: std::rc::Rc<str> = resolved.to_string_lossy().into_owned().into();
        let tokens = Lexer::new(&source, file).tokenize(diagnostics);
        self.expand_into(tokens, output, diagnostics);
    }

    /// Search the configured include paths; the whole file is read, with no
    /// size cap.
    fn locate(&self, path: &str) -> Option<(PathBuf, String)> {
        let direct = PathBuf::from(path);
        if let Ok(source) = fs::read_to_string(&direct) {
            return Some((direct, source));
        }
        for dir in &self.include_paths {
            let candidate = dir.join(path);
            if let Ok(source) = fs::read_to_string(&candidate) {
                return Some((candidate, source));
            }
        }
        None
    }
}
