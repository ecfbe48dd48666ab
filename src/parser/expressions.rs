//! Expression parsing with precedence climbing
//!
//! Three integer priority tables drive the climb: unary, binary and
//! assignment operators each have their own. `parse_binary` consumes
//! operators whose priority strictly exceeds the current floor and recurses
//! with that priority, which yields left associativity; assignment and the
//! ternary recurse at their own level and so associate to the right.
//!
//! Assignment is told apart from comparison by speculatively parsing a
//! modifiable (lvalue-capable) expression and checking for an
//! assignment-class operator; the cursor rewinds when the speculation
//! fails.

use crate::parser::ast::{Expression, Literal};
use crate::parser::lexer::TokenKind;
use crate::parser::parse::Parser;

/// Priority of prefix operators; `-1` when the token is not one.
fn unary_priority(kind: TokenKind) -> i32 {
    match kind {
        TokenKind::Bang | TokenKind::Tilde => 11,
        TokenKind::Minus | TokenKind::Plus => 11,
        TokenKind::Star | TokenKind::Amp => 11,
        _ => -1,
    }
}

/// Priority of infix operators; `-1` when the token is not one.
fn binary_priority(kind: TokenKind) -> i32 {
    match kind {
        TokenKind::PipePipe => 1,
        TokenKind::AmpAmp => 2,
        TokenKind::Pipe => 3,
        TokenKind::Caret => 4,
        TokenKind::Amp => 5,
        TokenKind::EqualEqual | TokenKind::BangEqual => 6,
        TokenKind::Less
        | TokenKind::LessEqual
        | TokenKind::Greater
        | TokenKind::GreaterEqual => 7,
        TokenKind::LessLess | TokenKind::GreaterGreater => 8,
        TokenKind::Plus | TokenKind::Minus => 9,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 10,
        _ => -1,
    }
}

/// Priority of assignment-class operators; `-1` when the token is not one.
fn assignment_priority(kind: TokenKind) -> i32 {
    match kind {
        TokenKind::Equal
        | TokenKind::PlusEqual
        | TokenKind::MinusEqual
        | TokenKind::StarEqual
        | TokenKind::SlashEqual
        | TokenKind::PercentEqual => 0,
        _ => -1,
    }
}

impl Parser<'_> {
    pub(crate) fn parse_expression(&mut self) -> Expression {
        self.parse_assignment()
    }

    /// Speculate on `lvalue op= value`; rewind and fall back to ordinary
    /// parsing when the tokens are not an assignment.
    fn parse_assignment(&mut self) -> Expression {
        let start = self.checkpoint();

        if let Some(target) = self.try_parse_modifiable() {
            if assignment_priority(self.peek().kind) >= 0 {
                let operator = self.advance();
                let value = self.parse_expression();
                return Expression::Assignment {
                    operator,
                    target: Box::new(target),
                    value: Box::new(value),
                };
            }
        }

        self.rewind(start);
        self.parse_ternary()
    }

    /// Parse only the expression forms that can denote a storage location:
    /// variables, dereferences, indexing, field access, and parentheses
    /// around those. Never reports; returns `None` on any other shape.
    fn try_parse_modifiable(&mut self) -> Option<Expression> {
        let mut expr = match self.peek().kind {
            TokenKind::Star => {
                let star = self.advance();
                let operand = self.try_parse_modifiable()?;
                Expression::Dereference {
                    star,
                    operand: Box::new(operand),
                }
            }
            TokenKind::OpenParen => {
                let open = self.advance();
                let inner = self.try_parse_modifiable()?;
                if !self.match_kind(TokenKind::CloseParen) {
                    return None;
                }
                Expression::Parenthesized {
                    open,
                    inner: Box::new(inner),
                }
            }
            TokenKind::Identifier => Expression::Variable {
                name: self.advance(),
            },
            _ => return None,
        };

        loop {
            if self.check(TokenKind::Dot) {
                let dot = self.advance();
                if !self.check(TokenKind::Identifier) {
                    return None;
                }
                expr = Expression::Field {
                    object: Box::new(expr),
                    dot,
                    field: self.advance(),
                };
            } else if self.check(TokenKind::OpenBracket) {
                let open = self.advance();
                let index = self.parse_expression();
                if !self.match_kind(TokenKind::CloseBracket) {
                    return None;
                }
                expr = Expression::Index {
                    object: Box::new(expr),
                    open,
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }

        Some(expr)
    }

    /// `cond ? a : b`, right-associative through the recursion on the
    /// else branch.
    fn parse_ternary(&mut self) -> Expression {
        let condition = self.parse_binary(-1);

        if self.check(TokenKind::Question) {
            let question = self.advance();
            let then_value = self.parse_expression();
            self.expect(TokenKind::Colon);
            let else_value = self.parse_ternary();
            return Expression::Ternary {
                question,
                condition: Box::new(condition),
                then_value: Box::new(then_value),
                else_value: Box::new(else_value),
            };
        }

        condition
    }

    /// Precedence climb: consume operators above `parent_priority`,
    /// recursing with the consumed operator's priority as the new floor.
    fn parse_binary(&mut self, parent_priority: i32) -> Expression {
        let mut left = self.parse_unary(0);

        while !self.check(TokenKind::EndOfFile) {
            let priority = binary_priority(self.peek().kind);
            if priority < 0 || priority <= parent_priority {
                break;
            }

            let operator = self.advance();
            let right = self.parse_binary(priority);
            left = Expression::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        left
    }

    fn parse_unary(&mut self, parent_priority: i32) -> Expression {
        let kind = self.peek().kind;
        let priority = unary_priority(kind);

        if priority >= 0 && priority >= parent_priority {
            let operator = self.advance();
            let operand = Box::new(self.parse_unary(parent_priority));
            return match kind {
                TokenKind::Star => Expression::Dereference {
                    star: operator,
                    operand,
                },
                TokenKind::Amp => Expression::AddressOf {
                    amp: operator,
                    operand,
                },
                _ => Expression::Unary { operator, operand },
            };
        }

        self.parse_cast()
    }

    /// `(type)operand` — distinguished from a parenthesized expression by
    /// speculatively parsing a type after the parenthesis.
    fn parse_cast(&mut self) -> Expression {
        if self.check(TokenKind::OpenParen) {
            let start = self.checkpoint();
            let open = self.advance();

            if let Some(target) = self.try_parse_type() {
                if self.match_kind(TokenKind::CloseParen) {
                    let operand = Box::new(self.parse_unary(0));
                    return Expression::Cast {
                        open,
                        target,
                        operand,
                    };
                }
            }
            self.rewind(start);
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Expression {
        let mut expr = self.parse_primary();

        loop {
            if self.check(TokenKind::Dot) {
                let dot = self.advance();
                let field = self.expect_identifier();
                expr = Expression::Field {
                    object: Box::new(expr),
                    dot,
                    field,
                };
            } else if self.check(TokenKind::OpenBracket) {
                let open = self.advance();
                let index = self.parse_expression();
                self.expect(TokenKind::CloseBracket);
                expr = Expression::Index {
                    object: Box::new(expr),
                    open,
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }

        expr
    }

    fn parse_primary(&mut self) -> Expression {
        match self.peek().kind {
            TokenKind::Number => {
                let token = self.advance();
                let value = match token.lexeme.parse::<i32>() {
                    Ok(value) => value,
                    Err(_) => {
                        self.diagnostics.report_error(
                            &token,
                            format!("integer literal '{}' is out of range", token.lexeme),
                        );
                        0
                    }
                };
                Expression::Literal(Literal::Number { token, value })
            }
            TokenKind::Character => {
                let token = self.advance();
                let value = token.lexeme.chars().next().map(|c| c as u8).unwrap_or(0);
                Expression::Literal(Literal::Character { token, value })
            }
            TokenKind::String => Expression::Literal(Literal::String {
                token: self.advance(),
            }),
            TokenKind::True | TokenKind::False => {
                let token = self.advance();
                let value = token.is(TokenKind::True);
                Expression::Literal(Literal::Bool { token, value })
            }
            TokenKind::Null => Expression::Literal(Literal::Null {
                token: self.advance(),
            }),
            TokenKind::Identifier => {
                if self.is_registered_type(&self.peek().lexeme)
                    && self.peek_ahead(1).is(TokenKind::OpenBrace)
                {
                    return self.parse_struct_initializer();
                }
                if self.peek_ahead(1).is(TokenKind::OpenParen) {
                    return self.parse_call();
                }
                Expression::Variable {
                    name: self.advance(),
                }
            }
            TokenKind::OpenParen => {
                let open = self.advance();
                let inner = Box::new(self.parse_expression());
                self.expect(TokenKind::CloseParen);
                Expression::Parenthesized { open, inner }
            }
            TokenKind::OpenBrace => {
                let open = self.advance();
                let items = self.parse_expression_list(TokenKind::CloseBrace);
                self.expect(TokenKind::CloseBrace);
                Expression::List { open, items }
            }
            _ => {
                let found = self.peek().clone();
                self.diagnostics
                    .report_error(&found, format!("expected an expression, found {}", found));

                // Do not swallow tokens that close an enclosing construct;
                // the surrounding parse loop needs them for recovery.
                if !matches!(
                    found.kind,
                    TokenKind::CloseParen
                        | TokenKind::CloseBrace
                        | TokenKind::CloseBracket
                        | TokenKind::Semicolon
                        | TokenKind::Comma
                        | TokenKind::EndOfFile
                ) {
                    self.advance();
                }

                Expression::Literal(Literal::Number {
                    token: crate::parser::lexer::Token::placeholder(TokenKind::Number, &found),
                    value: 0,
                })
            }
        }
    }

    fn parse_call(&mut self) -> Expression {
        let name = self.advance();
        self.expect(TokenKind::OpenParen);
        let arguments = self.parse_expression_list(TokenKind::CloseParen);
        self.expect(TokenKind::CloseParen);

        Expression::Call { name, arguments }
    }

    fn parse_struct_initializer(&mut self) -> Expression {
        let type_name = self.advance();
        self.expect(TokenKind::OpenBrace);
        let values = self.parse_expression_list(TokenKind::CloseBrace);
        self.expect(TokenKind::CloseBrace);

        Expression::StructInitializer { type_name, values }
    }

    /// Comma-separated expressions up to (not including) `close`.
    fn parse_expression_list(&mut self, close: TokenKind) -> Vec<Expression> {
        let mut items = Vec::new();
        while !self.check(close) && !self.check(TokenKind::EndOfFile) {
            items.push(self.parse_expression());
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticBag;
    use crate::parser::lexer::Lexer;

    fn parse_expr(source: &str) -> (Expression, DiagnosticBag) {
        let mut diagnostics = DiagnosticBag::new();
        let tokens = Lexer::new(source, "test.mi".into()).tokenize(&mut diagnostics);
        let mut parser = Parser::new(tokens, &mut diagnostics);
        let expr = parser.parse_expression();
        (expr, diagnostics)
    }

    /// Render the tree shape with full parenthesization.
    fn shape(expr: &Expression) -> String {
        match expr {
            Expression::Literal(Literal::Number { value, .. }) => value.to_string(),
            Expression::Variable { name } => name.lexeme.clone(),
            Expression::Binary {
                operator,
                left,
                right,
            } => format!("({} {} {})", shape(left), operator.lexeme, shape(right)),
            Expression::Unary { operator, operand } => {
                format!("({}{})", operator.lexeme, shape(operand))
            }
            Expression::Assignment {
                operator,
                target,
                value,
            } => format!("({} {} {})", shape(target), operator.lexeme, shape(value)),
            Expression::Ternary {
                condition,
                then_value,
                else_value,
                ..
            } => format!(
                "({} ? {} : {})",
                shape(condition),
                shape(then_value),
                shape(else_value)
            ),
            Expression::Parenthesized { inner, .. } => shape(inner),
            Expression::Dereference { operand, .. } => format!("(*{})", shape(operand)),
            Expression::AddressOf { operand, .. } => format!("(&{})", shape(operand)),
            Expression::Index { object, index, .. } => {
                format!("{}[{}]", shape(object), shape(index))
            }
            Expression::Field { object, field, .. } => {
                format!("{}.{}", shape(object), field.lexeme)
            }
            other => format!("{:?}", other),
        }
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        let (expr, _) = parse_expr("1 + 2 * 3");
        assert_eq!(shape(&expr), "(1 + (2 * 3))");
    }

    #[test]
    fn test_binary_left_associativity() {
        let (expr, _) = parse_expr("10 - 4 - 3");
        assert_eq!(shape(&expr), "((10 - 4) - 3)");
    }

    #[test]
    fn test_assignment_right_associativity() {
        let (expr, _) = parse_expr("a = b = c");
        assert_eq!(shape(&expr), "(a = (b = c))");
    }

    #[test]
    fn test_assignment_vs_comparison() {
        let (expr, diagnostics) = parse_expr("a == b");
        assert!(!diagnostics.has_errors());
        assert_eq!(shape(&expr), "(a == b)");

        let (expr, diagnostics) = parse_expr("a = b == c");
        assert!(!diagnostics.has_errors());
        assert_eq!(shape(&expr), "(a = (b == c))");
    }

    #[test]
    fn test_compound_assignment_through_deref() {
        let (expr, diagnostics) = parse_expr("*p += 2");
        assert!(!diagnostics.has_errors());
        assert_eq!(shape(&expr), "((*p) += 2)");
    }

    #[test]
    fn test_logical_precedence() {
        let (expr, _) = parse_expr("a || b && c");
        assert_eq!(shape(&expr), "(a || (b && c))");
    }

    #[test]
    fn test_shift_between_comparison_and_additive() {
        let (expr, _) = parse_expr("a < b << 1 + c");
        assert_eq!(shape(&expr), "(a < (b << (1 + c)))");
    }

    #[test]
    fn test_unary_binds_tighter_than_binary() {
        let (expr, _) = parse_expr("-a * b");
        // The climb consumes the unary first, then the binary loop applies.
        assert_eq!(shape(&expr), "((-a) * b)");
    }

    #[test]
    fn test_ternary_right_associativity() {
        let (expr, _) = parse_expr("a ? 1 : b ? 2 : 3");
        assert_eq!(shape(&expr), "(a ? 1 : (b ? 2 : 3))");
    }

    #[test]
    fn test_parentheses_override() {
        let (expr, _) = parse_expr("(1 + 2) * 3");
        assert_eq!(shape(&expr), "((1 + 2) * 3)");
    }

    #[test]
    fn test_postfix_chain() {
        let (expr, diagnostics) = parse_expr("points[2].x");
        assert!(!diagnostics.has_errors());
        assert_eq!(shape(&expr), "points[2].x");
    }

    #[test]
    fn test_call_arguments() {
        let (expr, diagnostics) = parse_expr("max(a, b + 1)");
        assert!(!diagnostics.has_errors());
        match expr {
            Expression::Call {
                name, arguments, ..
            } => {
                assert_eq!(name.lexeme, "max");
                assert_eq!(arguments.len(), 2);
            }
            other => panic!("expected a call, got {:?}", other),
        }
    }

    #[test]
    fn test_cast_vs_parenthesized() {
        let (expr, diagnostics) = parse_expr("(x) + 1");
        assert!(!diagnostics.has_errors());
        assert_eq!(shape(&expr), "(x + 1)");

        let (expr, diagnostics) = parse_expr("(int)c + 1");
        assert!(!diagnostics.has_errors());
        match expr {
            Expression::Binary { left, .. } => {
                assert!(matches!(*left, Expression::Cast { .. }))
            }
            other => panic!("expected a binary over a cast, got {:?}", other),
        }
    }

    #[test]
    fn test_error_recovery_produces_placeholder() {
        let (expr, diagnostics) = parse_expr("+ +");
        assert!(diagnostics.has_errors());
        // Still structurally an expression.
        assert!(matches!(
            expr,
            Expression::Unary { .. } | Expression::Literal(_)
        ));
    }
}
