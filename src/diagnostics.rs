//! Diagnostic records collected by the compilation stages
//!
//! Every stage appends [`Diagnostic`]s to a [`DiagnosticBag`] instead of
//! failing on the first problem, so a single run reports everything it
//! found. The bag exposes per-severity counts; the driver uses the error
//! count to decide whether the next stage may run.

use crate::parser::lexer::Token;
use std::fmt;
use std::rc::Rc;

/// How serious a diagnostic is. `Error` blocks the next pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Message,
    Warning,
    Error,
}

/// A single positioned diagnostic record.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: Rc<str>,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file, self.line, self.column, self.message
        )
    }
}

/// Ordered collection of diagnostics for one compiler invocation.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
    messages: usize,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    fn report(&mut self, severity: Severity, token: &Token, message: String) {
        match severity {
            Severity::Message => self.messages += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Error => self.errors += 1,
        }
        self.diagnostics.push(Diagnostic {
            severity,
            message,
            file: Rc::clone(&token.file),
            line: token.line,
            column: token.column,
        });
    }

    pub fn report_message(&mut self, token: &Token, message: impl Into<String>) {
        self.report(Severity::Message, token, message.into());
    }

    pub fn report_warning(&mut self, token: &Token, message: impl Into<String>) {
        self.report(Severity::Warning, token, message.into());
    }

    pub fn report_error(&mut self, token: &Token, message: impl Into<String>) {
        self.report(Severity::Error, token, message.into());
    }

    /// Diagnostics in the order they were discovered.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn message_count(&self) -> usize {
        self.messages
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::{Token, TokenKind};

    fn token() -> Token {
        Token::new(TokenKind::Identifier, "x".to_string(), "test.mi".into(), 3, 7)
    }

    #[test]
    fn test_counts_by_severity() {
        let mut bag = DiagnosticBag::new();
        bag.report_message(&token(), "note");
        bag.report_warning(&token(), "odd");
        bag.report_error(&token(), "bad");
        bag.report_error(&token(), "worse");

        assert_eq!(bag.message_count(), 1);
        assert_eq!(bag.warning_count(), 1);
        assert_eq!(bag.error_count(), 2);
        assert!(bag.has_errors());
        assert_eq!(bag.diagnostics().len(), 4);
    }

    #[test]
    fn test_discovery_order_preserved() {
        let mut bag = DiagnosticBag::new();
        bag.report_error(&token(), "first");
        bag.report_warning(&token(), "second");
        let rendered: Vec<String> = bag.diagnostics().iter().map(|d| d.message.clone()).collect();
        assert_eq!(rendered, vec!["first", "second"]);
    }

    #[test]
    fn test_display_includes_position() {
        let mut bag = DiagnosticBag::new();
        bag.report_error(&token(), "unexpected token");
        let text = bag.diagnostics()[0].to_string();
        assert_eq!(text, "test.mi:3:7: unexpected token");
    }
}
