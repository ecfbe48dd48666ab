//! Statement parsing
//!
//! Dispatch is a single-token lookahead switch over the leading keyword or
//! punctuation; unrecognized tokens fall through to expression-statement.
//! A declaration is chosen when the leading token begins a type, which is
//! how `Point p;` is told apart from an expression once `Point` is a
//! registered type name.

use crate::parser::ast::{Statement, VariableDeclaration};
use crate::parser::lexer::TokenKind;
use crate::parser::parse::Parser;

impl Parser<'_> {
    pub(crate) fn parse_statement(&mut self) -> Statement {
        match self.peek().kind {
            TokenKind::Semicolon => Statement::Empty {
                semicolon: self.advance(),
            },
            TokenKind::OpenBrace => self.parse_block(),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Break => {
                let keyword = self.advance();
                self.expect(TokenKind::Semicolon);
                Statement::Break { keyword }
            }
            TokenKind::Else => {
                // An `else` with no preceding `if`: one diagnostic, then
                // recover by parsing the orphaned branch as the statement.
                let keyword = self.advance();
                self.diagnostics
                    .report_error(&keyword, "'else' without a preceding 'if'");
                self.parse_statement()
            }
            _ if self.looks_like_type() => {
                Statement::Declaration(self.parse_variable_declaration())
            }
            _ => {
                let expr = self.parse_expression();
                self.expect(TokenKind::Semicolon);
                Statement::Expression { expr }
            }
        }
    }

    /// Parse `{ statements }`.
    pub(crate) fn parse_block(&mut self) -> Statement {
        let open = self.expect(TokenKind::OpenBrace);

        let mut statements = Vec::new();
        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::EndOfFile) {
            let start = self.position;
            statements.push(self.parse_statement());
            if self.position == start {
                self.advance();
            }
        }
        self.expect(TokenKind::CloseBrace);

        Statement::Block { open, statements }
    }

    fn parse_if_statement(&mut self) -> Statement {
        let keyword = self.expect(TokenKind::If);
        self.expect(TokenKind::OpenParen);
        let condition = self.parse_expression();
        self.expect(TokenKind::CloseParen);

        let then_branch = Box::new(self.parse_statement());
        let else_branch = if self.match_kind(TokenKind::Else) {
            Some(Box::new(self.parse_statement()))
        } else {
            None
        };

        Statement::If {
            keyword,
            condition,
            then_branch,
            else_branch,
        }
    }

    fn parse_while_statement(&mut self) -> Statement {
        let keyword = self.expect(TokenKind::While);
        self.expect(TokenKind::OpenParen);
        let condition = self.parse_expression();
        self.expect(TokenKind::CloseParen);
        let body = Box::new(self.parse_statement());

        Statement::While {
            keyword,
            condition,
            body,
        }
    }

    fn parse_for_statement(&mut self) -> Statement {
        let keyword = self.expect(TokenKind::For);
        self.expect(TokenKind::OpenParen);

        let initializer = if self.match_kind(TokenKind::Semicolon) {
            None
        } else if self.looks_like_type() {
            // The declaration consumes its own semicolon.
            Some(Box::new(Statement::Declaration(
                self.parse_variable_declaration(),
            )))
        } else {
            let expr = self.parse_expression();
            self.expect(TokenKind::Semicolon);
            Some(Box::new(Statement::Expression { expr }))
        };

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression())
        };
        self.expect(TokenKind::Semicolon);

        let increment = if self.check(TokenKind::CloseParen) {
            None
        } else {
            Some(self.parse_expression())
        };
        self.expect(TokenKind::CloseParen);

        let body = Box::new(self.parse_statement());

        Statement::For {
            keyword,
            initializer,
            condition,
            increment,
            body,
        }
    }

    fn parse_return_statement(&mut self) -> Statement {
        let keyword = self.expect(TokenKind::Return);
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression())
        };
        self.expect(TokenKind::Semicolon);

        Statement::Return { keyword, value }
    }

    fn parse_variable_declaration(&mut self) -> VariableDeclaration {
        let var_type = self.parse_type();
        let name = self.expect_identifier();

        let initializer = if self.match_kind(TokenKind::Equal) {
            Some(self.parse_expression())
        } else {
            None
        };
        self.expect(TokenKind::Semicolon);

        VariableDeclaration {
            var_type,
            name,
            initializer,
        }
    }
}
