//! Operator resolution tables
//!
//! A fixed, order-independent table maps `(token kind, operand type)` to a
//! unary operator and `(token kind, left type, right type)` to a binary
//! operator. The tables are built once at startup and passed by reference
//! into the binder — there is no global mutable state. A failed lookup
//! resolves to the designated error operator, whose error result type
//! propagates without producing cascading diagnostics.

use crate::binder::types::Ty;
use crate::parser::lexer::TokenKind;
use std::rc::Rc;

/// What a resolved unary operator computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Identity,
    Negate,
    LogicalNot,
    BitwiseNot,
    Error,
}

/// What a resolved binary operator computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpKind {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    LogicalAnd,
    LogicalOr,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    Error,
}

/// One `(token, operand) -> (kind, result)` table entry.
#[derive(Debug, PartialEq)]
pub struct UnaryOperator {
    pub token: TokenKind,
    pub kind: UnaryOpKind,
    pub operand: Ty,
    pub result: Ty,
}

/// One `(token, left, right) -> (kind, result)` table entry.
#[derive(Debug, PartialEq)]
pub struct BinaryOperator {
    pub token: TokenKind,
    pub kind: BinaryOpKind,
    pub left: Ty,
    pub right: Ty,
    pub result: Ty,
}

/// The immutable resolution tables plus the error operators returned on a
/// failed lookup.
#[derive(Debug)]
pub struct OperatorTables {
    unary: Vec<Rc<UnaryOperator>>,
    binary: Vec<Rc<BinaryOperator>>,
    error_unary: Rc<UnaryOperator>,
    error_binary: Rc<BinaryOperator>,
}

impl OperatorTables {
    pub fn new() -> Self {
        use BinaryOpKind as B;
        use TokenKind::*;

        let unary = vec![
            unary_op(Plus, UnaryOpKind::Identity, Ty::int(), Ty::int()),
            unary_op(Minus, UnaryOpKind::Negate, Ty::int(), Ty::int()),
            unary_op(Tilde, UnaryOpKind::BitwiseNot, Ty::int(), Ty::int()),
            unary_op(Bang, UnaryOpKind::LogicalNot, Ty::bool(), Ty::bool()),
        ];

        let binary = vec![
            binary_op(Plus, B::Add, Ty::int(), Ty::int(), Ty::int()),
            binary_op(Minus, B::Subtract, Ty::int(), Ty::int(), Ty::int()),
            binary_op(Star, B::Multiply, Ty::int(), Ty::int(), Ty::int()),
            binary_op(Slash, B::Divide, Ty::int(), Ty::int(), Ty::int()),
            binary_op(Percent, B::Modulo, Ty::int(), Ty::int(), Ty::int()),
            binary_op(EqualEqual, B::Equal, Ty::int(), Ty::int(), Ty::bool()),
            binary_op(BangEqual, B::NotEqual, Ty::int(), Ty::int(), Ty::bool()),
            binary_op(EqualEqual, B::Equal, Ty::char(), Ty::char(), Ty::bool()),
            binary_op(BangEqual, B::NotEqual, Ty::char(), Ty::char(), Ty::bool()),
            binary_op(EqualEqual, B::Equal, Ty::bool(), Ty::bool(), Ty::bool()),
            binary_op(BangEqual, B::NotEqual, Ty::bool(), Ty::bool(), Ty::bool()),
            binary_op(Less, B::Less, Ty::int(), Ty::int(), Ty::bool()),
            binary_op(LessEqual, B::LessEqual, Ty::int(), Ty::int(), Ty::bool()),
            binary_op(Greater, B::Greater, Ty::int(), Ty::int(), Ty::bool()),
            binary_op(GreaterEqual, B::GreaterEqual, Ty::int(), Ty::int(), Ty::bool()),
            binary_op(AmpAmp, B::LogicalAnd, Ty::bool(), Ty::bool(), Ty::bool()),
            binary_op(PipePipe, B::LogicalOr, Ty::bool(), Ty::bool(), Ty::bool()),
            binary_op(Amp, B::BitAnd, Ty::int(), Ty::int(), Ty::int()),
            binary_op(Pipe, B::BitOr, Ty::int(), Ty::int(), Ty::int()),
            binary_op(Caret, B::BitXor, Ty::int(), Ty::int(), Ty::int()),
            binary_op(LessLess, B::ShiftLeft, Ty::int(), Ty::int(), Ty::int()),
            binary_op(GreaterGreater, B::ShiftRight, Ty::int(), Ty::int(), Ty::int()),
        ];

        Self {
            unary,
            binary,
            error_unary: Rc::new(UnaryOperator {
                token: TokenKind::Unknown,
                kind: UnaryOpKind::Error,
                operand: Ty::error(),
                result: Ty::error(),
            }),
            error_binary: Rc::new(BinaryOperator {
                token: TokenKind::Unknown,
                kind: BinaryOpKind::Error,
                left: Ty::error(),
                right: Ty::error(),
                result: Ty::error(),
            }),
        }
    }

    /// Look up `(token, operand)`; the error operator on a miss. Error
    /// operands short-circuit so one bad subexpression resolves quietly.
    pub fn resolve_unary(&self, token: TokenKind, operand: &Ty) -> Rc<UnaryOperator> {
        if operand.is_error() {
            return Rc::clone(&self.error_unary);
        }
        self.unary
            .iter()
            .find(|op| op.token == token && operand.can_implicitly_cast_to(&op.operand))
            .cloned()
            .unwrap_or_else(|| Rc::clone(&self.error_unary))
    }

    /// Look up `(token, left, right)`; the error operator on a miss.
    pub fn resolve_binary(&self, token: TokenKind, left: &Ty, right: &Ty) -> Rc<BinaryOperator> {
        if left.is_error() || right.is_error() {
            return Rc::clone(&self.error_binary);
        }
        self.binary
            .iter()
            .find(|op| {
                op.token == token
                    && left.can_implicitly_cast_to(&op.left)
                    && right.can_implicitly_cast_to(&op.right)
            })
            .cloned()
            .unwrap_or_else(|| Rc::clone(&self.error_binary))
    }
}

impl Default for OperatorTables {
    fn default() -> Self {
        Self::new()
    }
}

fn unary_op(token: TokenKind, kind: UnaryOpKind, operand: Ty, result: Ty) -> Rc<UnaryOperator> {
    Rc::new(UnaryOperator {
        token,
        kind,
        operand,
        result,
    })
}

fn binary_op(
    token: TokenKind,
    kind: BinaryOpKind,
    left: Ty,
    right: Ty,
    result: Ty,
) -> Rc<BinaryOperator> {
    Rc::new(BinaryOperator {
        token,
        kind,
        left,
        right,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_keys_are_unique() {
        // Order independence requires that no (token, operand types) key
        // appears twice; a duplicate would make the winner depend on
        // insertion order.
        let tables = OperatorTables::new();

        for (i, a) in tables.binary.iter().enumerate() {
            for b in tables.binary.iter().skip(i + 1) {
                assert!(
                    !(a.token == b.token && a.left.same_as(&b.left) && a.right.same_as(&b.right)),
                    "duplicate binary entry for {:?}",
                    a.token
                );
            }
        }
        for (i, a) in tables.unary.iter().enumerate() {
            for b in tables.unary.iter().skip(i + 1) {
                assert!(
                    !(a.token == b.token && a.operand.same_as(&b.operand)),
                    "duplicate unary entry for {:?}",
                    a.token
                );
            }
        }
    }

    #[test]
    fn test_lookup_is_order_independent() {
        let mut reversed = OperatorTables::new();
        reversed.binary.reverse();
        reversed.unary.reverse();
        let forward = OperatorTables::new();

        let probes = [
            (TokenKind::Plus, Ty::int(), Ty::int()),
            (TokenKind::EqualEqual, Ty::char(), Ty::char()),
            (TokenKind::AmpAmp, Ty::bool(), Ty::bool()),
            (TokenKind::LessLess, Ty::int(), Ty::int()),
        ];
        for (token, left, right) in probes {
            let a = forward.resolve_binary(token, &left, &right);
            let b = reversed.resolve_binary(token, &left, &right);
            assert_eq!(a.kind, b.kind);
            assert!(a.result.same_as(&b.result));
        }
    }

    #[test]
    fn test_missing_entry_resolves_to_error_operator() {
        let tables = OperatorTables::new();
        let op = tables.resolve_binary(TokenKind::Plus, &Ty::bool(), &Ty::bool());
        assert_eq!(op.kind, BinaryOpKind::Error);
        assert!(op.result.is_error());
    }

    #[test]
    fn test_error_operand_short_circuits() {
        let tables = OperatorTables::new();
        let op = tables.resolve_binary(TokenKind::Plus, &Ty::error(), &Ty::int());
        assert_eq!(op.kind, BinaryOpKind::Error);
    }

    #[test]
    fn test_mutable_operands_match_plain_entries() {
        let tables = OperatorTables::new();
        let op = tables.resolve_binary(TokenKind::Plus, &Ty::int().mutable(), &Ty::int());
        assert_eq!(op.kind, BinaryOpKind::Add);
    }
}
