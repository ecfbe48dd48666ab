//! The binder: name resolution, operator resolution and type checking
//!
//! Binding runs in two phases per unit: first every top-level symbol is
//! declared (so forward references between functions and globals resolve),
//! then each function body is walked in its own fresh scope chain,
//! bottom-up. Unresolved names and failed operations produce error-typed
//! bound nodes plus a diagnostic — never a crash — so sibling expressions
//! keep binding and one pass reports everything.

use crate::binder::bound::{
    BoundExpression, BoundExpressionKind, BoundFunction, BoundGlobal, BoundLiteral,
    BoundStatement, BoundUnit,
};
use crate::binder::operators::{BinaryOpKind, OperatorTables, UnaryOpKind};
use crate::binder::scope::ScopeChain;
use crate::binder::symbols::{
    FieldLayout, FunctionSymbol, StructLayout, StructRegistry, VariableSymbol,
};
use crate::binder::types::{BaseTy, Ty};
use crate::diagnostics::DiagnosticBag;
use crate::parser::ast::{
    CompilationUnit, Expression, FunctionDeclaration, Literal, Member, Parameter, Statement,
    TypeSyntax, VariableDeclaration,
};
use crate::parser::lexer::TokenKind;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Bind a parsed unit against the given operator tables.
pub fn bind(
    unit: &CompilationUnit,
    operators: &OperatorTables,
    diagnostics: &mut DiagnosticBag,
) -> BoundUnit {
    let mut binder = Binder {
        operators,
        diagnostics,
        structs: StructRegistry::default(),
        functions: FxHashMap::default(),
        globals: FxHashMap::default(),
        scopes: ScopeChain::new(),
        return_ty: Ty::void(),
        loop_depth: 0,
    };

    binder.declare_members(unit);

    let mut functions = Vec::new();
    let mut globals = Vec::new();
    for member in &unit.members {
        match member {
            Member::Function(decl) => functions.push(binder.bind_function(decl)),
            Member::Global(decl) => {
                if let Some(global) = binder.bind_global(decl) {
                    globals.push(global);
                }
            }
            _ => {}
        }
    }

    BoundUnit {
        functions,
        globals,
        structs: binder.structs,
    }
}

struct Binder<'a> {
    operators: &'a OperatorTables,
    diagnostics: &'a mut DiagnosticBag,
    structs: StructRegistry,
    functions: FxHashMap<String, Rc<FunctionSymbol>>,
    globals: FxHashMap<String, Rc<VariableSymbol>>,
    scopes: ScopeChain,
    return_ty: Ty,
    loop_depth: usize,
}

/// Expressions that produce a fresh value may initialize any scalar
/// location; mutability only sticks to borrowed pointees.
fn value_of(mut ty: Ty) -> Ty {
    if ty.pointer_depth == 0 {
        ty.mutable = true;
    }
    ty
}

impl Binder<'_> {
    // ===== Phase 1: declarations =====

    fn declare_members(&mut self, unit: &CompilationUnit) {
        for member in &unit.members {
            match member {
                Member::Struct(decl) => self.declare_struct(decl),
                Member::Function(decl) => {
                    let symbol = self.function_symbol(
                        &decl.name.lexeme,
                        &decl.return_type,
                        &decl.params,
                        decl.convention,
                        decl.private,
                        decl.exported,
                        false,
                        true,
                    );
                    self.declare_function(&decl.name, symbol);
                }
                Member::Hint(decl) => {
                    let symbol = self.function_symbol(
                        &decl.name.lexeme,
                        &decl.return_type,
                        &decl.params,
                        decl.convention,
                        false,
                        false,
                        false,
                        false,
                    );
                    self.declare_function(&decl.name, symbol);
                }
                Member::Extern(decl) => {
                    let symbol = self.function_symbol(
                        &decl.name.lexeme,
                        &decl.return_type,
                        &decl.params,
                        decl.convention,
                        false,
                        false,
                        true,
                        false,
                    );
                    self.declare_function(&decl.name, symbol);
                }
                Member::Global(decl) => self.declare_global(decl),
            }
        }
    }

    fn declare_struct(&mut self, decl: &crate::parser::ast::StructDeclaration) {
        let name = decl.name.lexeme.clone();
        if self.structs.contains(&name) {
            self.diagnostics
                .report_error(&decl.name, format!("struct '{}' is already declared", name));
            return;
        }

        let mut fields: Vec<FieldLayout> = Vec::new();
        let mut offset = 0u32;
        for field in &decl.fields {
            let ty = self.resolve_type(&field.field_type, Some(&name));
            if let BaseTy::Struct(inner) = &ty.base {
                if ty.pointer_depth == 0 && **inner == *name {
                    self.diagnostics.report_error(
                        &field.name,
                        format!("struct '{}' cannot contain itself by value", name),
                    );
                    continue;
                }
            }
            if fields.iter().any(|f| f.name == field.name.lexeme) {
                self.diagnostics.report_error(
                    &field.name,
                    format!("duplicate field '{}'", field.name.lexeme),
                );
                continue;
            }

            let size = ty.size(&self.structs).max(1);
            fields.push(FieldLayout {
                name: field.name.lexeme.clone(),
                ty,
                offset,
            });
            offset += size;
        }

        self.structs.insert(StructLayout {
            name,
            fields,
            size: offset.max(1),
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn function_symbol(
        &mut self,
        name: &str,
        return_type: &TypeSyntax,
        params: &[Parameter],
        convention: crate::parser::ast::CallingConvention,
        private: bool,
        exported: bool,
        imported: bool,
        defined: bool,
    ) -> FunctionSymbol {
        let return_ty = self.resolve_type(return_type, None);
        if matches!(return_ty.base, BaseTy::Struct(_)) && return_ty.pointer_depth == 0 {
            self.diagnostics.report_error(
                &return_type.name,
                "functions cannot return a struct by value; return a pointer",
            );
        }

        let mut resolved = Vec::new();
        for param in params {
            let ty = self.resolve_type(&param.param_type, None);
            if matches!(ty.base, BaseTy::Struct(_)) && ty.pointer_depth == 0 {
                self.diagnostics.report_error(
                    &param.name,
                    "parameters cannot have a struct type; pass a pointer",
                );
            }
            if ty.is_void() {
                self.diagnostics
                    .report_error(&param.name, "parameters cannot have type 'void'");
            }
            resolved.push((param.name.lexeme.clone(), ty));
        }

        FunctionSymbol {
            name: name.to_string(),
            return_ty,
            params: resolved,
            convention,
            private,
            exported,
            imported,
            defined,
        }
    }

    fn declare_function(&mut self, name: &crate::parser::lexer::Token, symbol: FunctionSymbol) {
        let existing = self
            .functions
            .get(&symbol.name)
            .map(|f| (f.defined, f.signature_matches(&symbol)));

        match existing {
            Some((true, _)) if symbol.defined => {
                self.diagnostics.report_error(
                    name,
                    format!("function '{}' is already defined", symbol.name),
                );
                return;
            }
            Some((_, false)) => {
                self.diagnostics.report_error(
                    name,
                    format!("conflicting declarations of function '{}'", symbol.name),
                );
            }
            _ => {}
        }

        // A definition supersedes hints, even conflicting ones, so the
        // body binds against its own signature.
        if existing.is_none() || symbol.defined {
            self.functions.insert(symbol.name.clone(), Rc::new(symbol));
        }
    }

    fn declare_global(&mut self, decl: &VariableDeclaration) {
        let ty = self.resolve_type(&decl.var_type, None);
        if ty.is_void() {
            self.diagnostics
                .report_error(&decl.name, "cannot declare a variable of type 'void'");
            return;
        }
        if self.globals.contains_key(&decl.name.lexeme) {
            self.diagnostics.report_error(
                &decl.name,
                format!("global '{}' is already declared", decl.name.lexeme),
            );
            return;
        }

        let symbol = VariableSymbol::global(decl.name.lexeme.clone(), ty);
        self.globals.insert(decl.name.lexeme.clone(), symbol);
    }

    fn resolve_type(&mut self, syntax: &TypeSyntax, declaring: Option<&str>) -> Ty {
        if syntax.signed == Some(false) {
            self.diagnostics.report_warning(
                &syntax.name,
                "unsigned types are not supported; 'unsigned' is ignored",
            );
        }

        let base = match syntax.name.kind {
            TokenKind::Int => BaseTy::Int,
            TokenKind::Char => BaseTy::Char,
            TokenKind::Bool => BaseTy::Bool,
            TokenKind::Void => BaseTy::Void,
            TokenKind::Identifier => {
                let name = &syntax.name.lexeme;
                if self.structs.contains(name) || declaring == Some(name.as_str()) {
                    BaseTy::Struct(name.as_str().into())
                } else if name.is_empty() {
                    // Placeholder from parser recovery; already reported.
                    BaseTy::Error
                } else {
                    self.diagnostics.report_error(
                        &syntax.name,
                        format!("unknown type name '{}'", name),
                    );
                    BaseTy::Error
                }
            }
            _ => BaseTy::Error,
        };

        Ty {
            base,
            pointer_depth: syntax.pointer_depth,
            mutable: syntax.mutable,
        }
    }

    // ===== Phase 2: bodies =====

    fn bind_function(&mut self, decl: &FunctionDeclaration) -> BoundFunction {
        let symbol = Rc::clone(
            self.functions
                .get(&decl.name.lexeme)
                .expect("function was declared in phase one"),
        );

        self.scopes = ScopeChain::new();
        self.scopes.push();
        self.return_ty = symbol.return_ty.clone();
        self.loop_depth = 0;

        let mut params = Vec::new();
        for (name, ty) in &symbol.params {
            let param = VariableSymbol::local(name.clone(), ty.clone());
            if self.scopes.declare(Rc::clone(&param)).is_some() {
                self.diagnostics.report_error(
                    &decl.name,
                    format!("duplicate parameter '{}' in function '{}'", name, symbol.name),
                );
            }
            params.push(param);
        }

        let body = self.bind_statement(&decl.body);
        self.scopes.pop();

        BoundFunction {
            symbol,
            params,
            body,
        }
    }

    fn bind_global(&mut self, decl: &VariableDeclaration) -> Option<BoundGlobal> {
        let symbol = Rc::clone(self.globals.get(&decl.name.lexeme)?);

        let initializer = match &decl.initializer {
            None => None,
            Some(expr) => {
                if matches!(symbol.ty.base, BaseTy::Struct(_)) && symbol.ty.pointer_depth == 0 {
                    self.diagnostics.report_error(
                        &decl.name,
                        "global struct variables cannot have initializers",
                    );
                    None
                } else {
                    let bound = self.bind_expression(expr);
                    self.check_implicit_cast(&bound, &symbol.ty, &decl.name);
                    if bound.constant.is_none() && !bound.ty.is_error() {
                        self.diagnostics.report_error(
                            &decl.name,
                            "global initializer must be a constant expression",
                        );
                    }
                    Some(bound)
                }
            }
        };

        Some(BoundGlobal {
            symbol,
            initializer,
        })
    }

    fn bind_statement(&mut self, statement: &Statement) -> BoundStatement {
        match statement {
            Statement::Block { statements, .. } => {
                self.scopes.push();
                let bound = statements.iter().map(|s| self.bind_statement(s)).collect();
                self.scopes.pop();
                BoundStatement::Block(bound)
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => BoundStatement::If {
                condition: self.bind_condition(condition),
                then_branch: Box::new(self.bind_statement(then_branch)),
                else_branch: else_branch
                    .as_ref()
                    .map(|stmt| Box::new(self.bind_statement(stmt))),
            },
            Statement::While {
                condition, body, ..
            } => {
                let condition = self.bind_condition(condition);
                self.loop_depth += 1;
                let body = Box::new(self.bind_statement(body));
                self.loop_depth -= 1;
                BoundStatement::While { condition, body }
            }
            Statement::For {
                initializer,
                condition,
                increment,
                body,
                ..
            } => {
                self.scopes.push();
                let initializer = initializer
                    .as_ref()
                    .map(|stmt| Box::new(self.bind_statement(stmt)));
                let condition = condition.as_ref().map(|expr| self.bind_condition(expr));
                let increment = increment.as_ref().map(|expr| self.bind_expression(expr));
                self.loop_depth += 1;
                let body = Box::new(self.bind_statement(body));
                self.loop_depth -= 1;
                self.scopes.pop();
                BoundStatement::For {
                    initializer,
                    condition,
                    increment,
                    body,
                }
            }
            Statement::Return { keyword, value } => {
                let value = match (value, self.return_ty.is_void()) {
                    (None, true) => None,
                    (None, false) => {
                        self.diagnostics.report_error(
                            keyword,
                            format!("this function must return a value of type '{}'", self.return_ty),
                        );
                        None
                    }
                    (Some(expr), true) => {
                        self.diagnostics
                            .report_error(keyword, "cannot return a value from a 'void' function");
                        Some(self.bind_expression(expr))
                    }
                    (Some(expr), false) => {
                        let bound = self.bind_expression(expr);
                        let target = self.return_ty.clone();
                        self.check_implicit_cast(&bound, &target, keyword);
                        Some(bound)
                    }
                };
                BoundStatement::Return { value }
            }
            Statement::Break { keyword } => {
                if self.loop_depth == 0 {
                    self.diagnostics
                        .report_error(keyword, "'break' outside of a loop");
                }
                BoundStatement::Break
            }
            Statement::Declaration(decl) => self.bind_variable_declaration(decl),
            Statement::Expression { expr } => {
                BoundStatement::Expression(self.bind_expression(expr))
            }
            Statement::Empty { .. } => BoundStatement::Empty,
        }
    }

    fn bind_variable_declaration(&mut self, decl: &VariableDeclaration) -> BoundStatement {
        let ty = self.resolve_type(&decl.var_type, None);
        if ty.is_void() {
            self.diagnostics
                .report_error(&decl.name, "cannot declare a variable of type 'void'");
        }

        let initializer = match &decl.initializer {
            None => None,
            // A bare `{ ... }` list initializes a struct variable.
            Some(Expression::List { items, open }) => {
                if let (BaseTy::Struct(struct_name), 0) = (&ty.base, ty.pointer_depth) {
                    let struct_name = struct_name.clone();
                    Some(self.bind_struct_values(&struct_name, items, open, ty.clone()))
                } else {
                    self.diagnostics.report_error(
                        open,
                        "initializer lists are only allowed for struct variables",
                    );
                    None
                }
            }
            Some(expr) => {
                let bound = self.bind_expression(expr);
                if matches!(ty.base, BaseTy::Struct(_))
                    && ty.pointer_depth == 0
                    && !matches!(bound.kind, BoundExpressionKind::StructInitializer { .. })
                {
                    self.diagnostics.report_error(
                        &decl.name,
                        "struct values cannot be copied; initialize with a list or use a pointer",
                    );
                } else {
                    self.check_implicit_cast(&bound, &ty, &decl.name);
                }
                Some(bound)
            }
        };

        let symbol = VariableSymbol::local(decl.name.lexeme.clone(), ty);
        if self.scopes.declare(Rc::clone(&symbol)).is_some() {
            self.diagnostics.report_error(
                &decl.name,
                format!(
                    "variable '{}' is already declared in this scope",
                    decl.name.lexeme
                ),
            );
        }

        BoundStatement::Declaration {
            symbol,
            initializer,
        }
    }

    fn bind_condition(&mut self, expr: &Expression) -> BoundExpression {
        let bound = self.bind_expression(expr);
        if !bound.ty.can_implicitly_cast_to(&Ty::bool()) {
            self.diagnostics.report_error(
                &bound.token,
                format!("condition must be of type 'bool', found '{}'", bound.ty),
            );
        }
        bound
    }

    fn check_implicit_cast(
        &mut self,
        value: &BoundExpression,
        target: &Ty,
        at: &crate::parser::lexer::Token,
    ) {
        if !value.ty.can_implicitly_cast_to(target) {
            self.diagnostics.report_error(
                at,
                format!("cannot implicitly convert '{}' to '{}'", value.ty, target),
            );
        }
    }

    // ===== Expressions =====

    fn bind_expression(&mut self, expr: &Expression) -> BoundExpression {
        let token = expr.token().clone();
        match expr {
            Expression::Literal(literal) => self.bind_literal(literal),
            Expression::Parenthesized { inner, .. } => self.bind_expression(inner),
            Expression::Variable { name } => {
                let symbol = self
                    .scopes
                    .lookup(&name.lexeme)
                    .map(|(symbol, _)| symbol)
                    .or_else(|| self.globals.get(&name.lexeme).cloned());
                match symbol {
                    Some(symbol) => BoundExpression {
                        ty: symbol.ty.clone(),
                        kind: BoundExpressionKind::Variable(symbol),
                        constant: None,
                        token,
                    },
                    None => {
                        self.diagnostics.report_error(
                            name,
                            format!("undefined variable '{}'", name.lexeme),
                        );
                        self.error_expression(token)
                    }
                }
            }
            Expression::Unary { operator, operand } => {
                let operand = self.bind_expression(operand);
                let op = self.operators.resolve_unary(operator.kind, &operand.ty);
                if op.kind == UnaryOpKind::Error && !operand.ty.is_error() {
                    self.diagnostics.report_error(
                        operator,
                        format!(
                            "operator '{}' is not defined for type '{}'",
                            operator.lexeme, operand.ty
                        ),
                    );
                }
                BoundExpression {
                    ty: value_of(op.result.clone()),
                    constant: operand.constant.and_then(|v| fold_unary(op.kind, v)),
                    kind: BoundExpressionKind::Unary {
                        operator: op,
                        operand: Box::new(operand),
                    },
                    token,
                }
            }
            Expression::Binary {
                operator,
                left,
                right,
            } => self.bind_binary(operator, left, right),
            Expression::Assignment {
                operator,
                target,
                value,
            } => self.bind_assignment(operator, target, value),
            Expression::Call { name, arguments } => self.bind_call(name, arguments),
            Expression::Cast {
                target, operand, ..
            } => {
                let bound = self.bind_expression(operand);
                let target_ty = self.resolve_type(target, None);
                if !bound.ty.can_cast_to(&target_ty, &self.structs) {
                    self.diagnostics.report_error(
                        &token,
                        format!("cannot cast '{}' to '{}'", bound.ty, target_ty),
                    );
                }
                BoundExpression {
                    ty: value_of(target_ty),
                    constant: bound.constant,
                    kind: BoundExpressionKind::Cast {
                        operand: Box::new(bound),
                    },
                    token,
                }
            }
            Expression::Field { object, field, .. } => {
                let object = self.bind_expression(object);
                let layout = match (&object.ty.base, object.ty.pointer_depth) {
                    (BaseTy::Struct(name), 0) => self.structs.get(name).cloned(),
                    (BaseTy::Error, _) => return self.error_expression(token),
                    _ => {
                        self.diagnostics.report_error(
                            field,
                            format!("type '{}' has no fields", object.ty),
                        );
                        return self.error_expression(token);
                    }
                };
                let Some(layout) = layout else {
                    return self.error_expression(token);
                };
                match layout.field(&field.lexeme) {
                    Some(found) => {
                        // The container gates writability of its fields.
                        let mut ty = found.ty.clone();
                        ty.mutable = object.ty.mutable;
                        BoundExpression {
                            ty,
                            constant: None,
                            kind: BoundExpressionKind::Field {
                                object: Box::new(object),
                                field: found.clone(),
                            },
                            token,
                        }
                    }
                    None => {
                        self.diagnostics.report_error(
                            field,
                            format!("struct '{}' has no field '{}'", layout.name, field.lexeme),
                        );
                        self.error_expression(token)
                    }
                }
            }
            Expression::Index { object, index, .. } => {
                let object = self.bind_expression(object);
                let index = self.bind_expression(index);
                if !index.ty.can_implicitly_cast_to(&Ty::int()) {
                    self.diagnostics.report_error(
                        &index.token,
                        format!("index must be of type 'int', found '{}'", index.ty),
                    );
                }
                match object.ty.deref() {
                    Some(element) => BoundExpression {
                        ty: element,
                        constant: None,
                        kind: BoundExpressionKind::Index {
                            object: Box::new(object),
                            index: Box::new(index),
                        },
                        token,
                    },
                    None => {
                        if !object.ty.is_error() {
                            self.diagnostics.report_error(
                                &token,
                                format!("type '{}' cannot be indexed", object.ty),
                            );
                        }
                        self.error_expression(token)
                    }
                }
            }
            Expression::Dereference { operand, .. } => {
                let operand = self.bind_expression(operand);
                match operand.ty.deref() {
                    Some(pointee) => BoundExpression {
                        ty: pointee,
                        constant: None,
                        kind: BoundExpressionKind::Dereference {
                            operand: Box::new(operand),
                        },
                        token,
                    },
                    None => {
                        if !operand.ty.is_error() {
                            self.diagnostics.report_error(
                                &token,
                                format!("cannot dereference non-pointer type '{}'", operand.ty),
                            );
                        }
                        self.error_expression(token)
                    }
                }
            }
            Expression::AddressOf { operand, .. } => {
                let operand = self.bind_expression(operand);
                if !operand.is_lvalue() && !operand.ty.is_error() {
                    self.diagnostics
                        .report_error(&token, "cannot take the address of this expression");
                }
                BoundExpression {
                    ty: operand.ty.clone().pointer(),
                    constant: None,
                    kind: BoundExpressionKind::AddressOf {
                        operand: Box::new(operand),
                    },
                    token,
                }
            }
            Expression::StructInitializer { type_name, values } => {
                let name: Rc<str> = type_name.lexeme.as_str().into();
                let ty = Ty {
                    base: BaseTy::Struct(Rc::clone(&name)),
                    pointer_depth: 0,
                    mutable: true,
                };
                self.bind_struct_values(&name, values, type_name, ty)
            }
            Expression::Ternary {
                condition,
                then_value,
                else_value,
                ..
            } => {
                let condition = self.bind_condition(condition);
                let then_value = self.bind_expression(then_value);
                let else_value = self.bind_expression(else_value);

                let ty = if then_value.ty.can_implicitly_cast_to(&else_value.ty) {
                    value_of(else_value.ty.clone())
                } else if else_value.ty.can_implicitly_cast_to(&then_value.ty) {
                    value_of(then_value.ty.clone())
                } else {
                    self.diagnostics.report_error(
                        &token,
                        format!(
                            "ternary branches have incompatible types '{}' and '{}'",
                            then_value.ty, else_value.ty
                        ),
                    );
                    Ty::error()
                };

                let constant = condition.constant.and_then(|c| {
                    if c != 0 {
                        then_value.constant
                    } else {
                        else_value.constant
                    }
                });

                BoundExpression {
                    ty,
                    constant,
                    kind: BoundExpressionKind::Ternary {
                        condition: Box::new(condition),
                        then_value: Box::new(then_value),
                        else_value: Box::new(else_value),
                    },
                    token,
                }
            }
            Expression::List { open, .. } => {
                self.diagnostics.report_error(
                    open,
                    "initializer lists are only allowed for struct variables",
                );
                self.error_expression(token)
            }
        }
    }

    fn bind_literal(&mut self, literal: &Literal) -> BoundExpression {
        let token = literal.token().clone();
        let (kind, ty, constant) = match literal {
            Literal::Number { value, .. } => (
                BoundLiteral::Int(*value),
                value_of(Ty::int()),
                Some(*value),
            ),
            Literal::Character { value, .. } => (
                BoundLiteral::Char(*value),
                value_of(Ty::char()),
                Some(*value as i32),
            ),
            Literal::Bool { value, .. } => (
                BoundLiteral::Bool(*value),
                value_of(Ty::bool()),
                Some(*value as i32),
            ),
            Literal::Null { .. } => (
                BoundLiteral::Null,
                Ty::void().mutable().pointer(),
                Some(0),
            ),
            Literal::String { token } => (
                BoundLiteral::String(token.lexeme.clone()),
                Ty::char().pointer(),
                None,
            ),
        };
        BoundExpression {
            kind: BoundExpressionKind::Literal(kind),
            ty,
            constant,
            token,
        }
    }

    fn bind_binary(
        &mut self,
        operator: &crate::parser::lexer::Token,
        left: &Expression,
        right: &Expression,
    ) -> BoundExpression {
        let token = operator.clone();
        let left = self.bind_expression(left);
        let right = self.bind_expression(right);

        // Pointer comparisons are structural: the fixed table cannot
        // enumerate every pointer type.
        if matches!(operator.kind, TokenKind::EqualEqual | TokenKind::BangEqual)
            && (left.ty.is_pointer() || right.ty.is_pointer())
        {
            let compatible = left.ty.can_implicitly_cast_to(&right.ty)
                || right.ty.can_implicitly_cast_to(&left.ty);
            if !compatible {
                self.diagnostics.report_error(
                    operator,
                    format!(
                        "operator '{}' is not defined for types '{}' and '{}'",
                        operator.lexeme, left.ty, right.ty
                    ),
                );
            }
            let negated = operator.kind == TokenKind::BangEqual;
            let constant = match (left.constant, right.constant) {
                (Some(l), Some(r)) => Some(((l == r) != negated) as i32),
                _ => None,
            };
            return BoundExpression {
                ty: value_of(Ty::bool()),
                constant,
                kind: BoundExpressionKind::PointerEquality {
                    negated,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                token,
            };
        }

        let op = self
            .operators
            .resolve_binary(operator.kind, &left.ty, &right.ty);
        if op.kind == BinaryOpKind::Error && !left.ty.is_error() && !right.ty.is_error() {
            self.diagnostics.report_error(
                operator,
                format!(
                    "operator '{}' is not defined for types '{}' and '{}'",
                    operator.lexeme, left.ty, right.ty
                ),
            );
        }

        BoundExpression {
            ty: value_of(op.result.clone()),
            constant: match (left.constant, right.constant) {
                (Some(l), Some(r)) => fold_binary(op.kind, l, r),
                _ => None,
            },
            kind: BoundExpressionKind::Binary {
                operator: op,
                left: Box::new(left),
                right: Box::new(right),
            },
            token,
        }
    }

    fn bind_assignment(
        &mut self,
        operator: &crate::parser::lexer::Token,
        target: &Expression,
        value: &Expression,
    ) -> BoundExpression {
        let token = operator.clone();
        let target = self.bind_expression(target);
        let value = self.bind_expression(value);

        if !target.is_lvalue() && !target.ty.is_error() {
            self.diagnostics
                .report_error(&token, "the target of an assignment must be assignable");
            return self.error_expression(token);
        }
        if !target.ty.mutable && !target.ty.is_error() {
            let what = match &target.kind {
                BoundExpressionKind::Variable(symbol) => {
                    format!("variable '{}' is not mutable", symbol.name)
                }
                _ => format!("cannot assign to immutable type '{}'", target.ty),
            };
            self.diagnostics.report_error(&token, what);
        }
        if matches!(target.ty.base, BaseTy::Struct(_)) && target.ty.pointer_depth == 0 {
            self.diagnostics
                .report_error(&token, "struct values cannot be assigned; assign their fields");
        }

        let compound = match operator.kind {
            TokenKind::Equal => None,
            TokenKind::PlusEqual => Some(TokenKind::Plus),
            TokenKind::MinusEqual => Some(TokenKind::Minus),
            TokenKind::StarEqual => Some(TokenKind::Star),
            TokenKind::SlashEqual => Some(TokenKind::Slash),
            TokenKind::PercentEqual => Some(TokenKind::Percent),
            _ => None,
        };

        let bound_op = match compound {
            None => {
                self.check_implicit_cast(&value, &target.ty, &token);
                None
            }
            Some(base_token) => {
                let op = self
                    .operators
                    .resolve_binary(base_token, &target.ty, &value.ty);
                if op.kind == BinaryOpKind::Error
                    && !target.ty.is_error()
                    && !value.ty.is_error()
                {
                    self.diagnostics.report_error(
                        operator,
                        format!(
                            "operator '{}' is not defined for types '{}' and '{}'",
                            operator.lexeme, target.ty, value.ty
                        ),
                    );
                }
                Some(op)
            }
        };

        BoundExpression {
            ty: value_of(target.ty.clone()),
            constant: None,
            kind: BoundExpressionKind::Assignment {
                target: Box::new(target),
                operator: bound_op,
                value: Box::new(value),
            },
            token,
        }
    }

    fn bind_call(
        &mut self,
        name: &crate::parser::lexer::Token,
        arguments: &[Expression],
    ) -> BoundExpression {
        let token = name.clone();
        let Some(function) = self.functions.get(&name.lexeme).cloned() else {
            self.diagnostics
                .report_error(name, format!("undefined function '{}'", name.lexeme));
            // Bind the arguments anyway so their diagnostics surface.
            for argument in arguments {
                self.bind_expression(argument);
            }
            return self.error_expression(token);
        };

        if arguments.len() < function.params.len() {
            self.diagnostics.report_error(
                name,
                format!(
                    "too few arguments in call to '{}': expected {}, found {}",
                    function.name,
                    function.params.len(),
                    arguments.len()
                ),
            );
        } else if arguments.len() > function.params.len() {
            self.diagnostics.report_error(
                name,
                format!(
                    "too many arguments in call to '{}': expected {}, found {}",
                    function.name,
                    function.params.len(),
                    arguments.len()
                ),
            );
        }

        let mut bound_args = Vec::new();
        for (index, argument) in arguments.iter().enumerate() {
            let bound = self.bind_expression(argument);
            if let Some((_, param_ty)) = function.params.get(index) {
                let target = param_ty.clone();
                self.check_implicit_cast(&bound, &target, &bound.token.clone());
            }
            bound_args.push(bound);
        }

        BoundExpression {
            ty: value_of(function.return_ty.clone()),
            constant: None,
            kind: BoundExpressionKind::Call {
                function,
                arguments: bound_args,
            },
            token,
        }
    }

    fn bind_struct_values(
        &mut self,
        struct_name: &Rc<str>,
        values: &[Expression],
        at: &crate::parser::lexer::Token,
        ty: Ty,
    ) -> BoundExpression {
        let token = at.clone();
        let Some(layout) = self.structs.get(struct_name).cloned() else {
            self.diagnostics.report_error(
                at,
                format!("unknown struct type '{}'", struct_name),
            );
            return self.error_expression(token);
        };

        if values.len() != layout.fields.len() {
            self.diagnostics.report_error(
                at,
                format!(
                    "struct '{}' has {} fields but the initializer has {} values",
                    layout.name,
                    layout.fields.len(),
                    values.len()
                ),
            );
        }

        let mut bound_values = Vec::new();
        for (index, value) in values.iter().enumerate() {
            let bound = self.bind_expression(value);
            if let Some(field) = layout.fields.get(index) {
                let target = field.ty.clone();
                self.check_implicit_cast(&bound, &target, &bound.token.clone());
            }
            bound_values.push(bound);
        }

        BoundExpression {
            ty,
            constant: None,
            kind: BoundExpressionKind::StructInitializer {
                values: bound_values,
            },
            token,
        }
    }

    fn error_expression(&self, token: crate::parser::lexer::Token) -> BoundExpression {
        BoundExpression {
            kind: BoundExpressionKind::Error,
            ty: Ty::error(),
            constant: None,
            token,
        }
    }
}

/// Fold a unary operation over a known operand.
fn fold_unary(kind: UnaryOpKind, value: i32) -> Option<i32> {
    match kind {
        UnaryOpKind::Identity => Some(value),
        UnaryOpKind::Negate => value.checked_neg(),
        UnaryOpKind::LogicalNot => Some((value == 0) as i32),
        UnaryOpKind::BitwiseNot => Some(!value),
        UnaryOpKind::Error => None,
    }
}

/// Fold a binary operation over known operands. Overflow and division by
/// zero stay runtime behavior.
fn fold_binary(kind: BinaryOpKind, left: i32, right: i32) -> Option<i32> {
    match kind {
        BinaryOpKind::Add => left.checked_add(right),
        BinaryOpKind::Subtract => left.checked_sub(right),
        BinaryOpKind::Multiply => left.checked_mul(right),
        BinaryOpKind::Divide => left.checked_div(right),
        BinaryOpKind::Modulo => left.checked_rem(right),
        BinaryOpKind::Equal => Some((left == right) as i32),
        BinaryOpKind::NotEqual => Some((left != right) as i32),
        BinaryOpKind::Less => Some((left < right) as i32),
        BinaryOpKind::LessEqual => Some((left <= right) as i32),
        BinaryOpKind::Greater => Some((left > right) as i32),
        BinaryOpKind::GreaterEqual => Some((left >= right) as i32),
        BinaryOpKind::LogicalAnd => Some((left != 0 && right != 0) as i32),
        BinaryOpKind::LogicalOr => Some((left != 0 || right != 0) as i32),
        BinaryOpKind::BitAnd => Some(left & right),
        BinaryOpKind::BitOr => Some(left | right),
        BinaryOpKind::BitXor => Some(left ^ right),
        BinaryOpKind::ShiftLeft => Some(left.wrapping_shl(right as u32 & 31)),
        BinaryOpKind::ShiftRight => Some(left.wrapping_shr(right as u32 & 31)),
        BinaryOpKind::Error => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::Lexer;
    use crate::parser::parse::Parser;

    fn bind_source(source: &str) -> (BoundUnit, DiagnosticBag) {
        let mut diagnostics = DiagnosticBag::new();
        let tokens = Lexer::new(source, "test.mi".into()).tokenize(&mut diagnostics);
        let unit = Parser::new(tokens, &mut diagnostics).parse_compilation_unit();
        let operators = OperatorTables::new();
        let bound = bind(&unit, &operators, &mut diagnostics);
        (bound, diagnostics)
    }

    fn first_body(bound: &BoundUnit) -> &[BoundStatement] {
        match &bound.functions[0].body {
            BoundStatement::Block(statements) => statements,
            other => panic!("function body must be a block, got {:?}", other),
        }
    }

    #[test]
    fn test_constant_folding() {
        let (bound, diagnostics) = bind_source("int main() { return 2 + 3 * 4; }");
        assert!(!diagnostics.has_errors());

        match &first_body(&bound)[0] {
            BoundStatement::Return { value: Some(value) } => {
                assert_eq!(value.constant, Some(14));
            }
            other => panic!("expected a return, got {:?}", other),
        }
    }

    #[test]
    fn test_unresolved_identifier_reports_and_continues() {
        let (bound, diagnostics) =
            bind_source("int main() { return missing + also_missing; }");
        assert_eq!(diagnostics.error_count(), 2);
        // A structurally complete tree still comes back.
        assert_eq!(bound.functions.len(), 1);
    }

    #[test]
    fn test_shadowing_resolves_innermost() {
        let source = "\
int main() {
    int x = 1;
    {
        int x = 2;
        int inner = x;
    }
    return x;
}
";
        let (bound, diagnostics) = bind_source(source);
        assert!(!diagnostics.has_errors());

        let body = first_body(&bound);
        let outer = match &body[0] {
            BoundStatement::Declaration { symbol, .. } => Rc::clone(symbol),
            other => panic!("expected a declaration, got {:?}", other),
        };
        let (inner_decl, inner_use) = match &body[1] {
            BoundStatement::Block(inner) => {
                let decl = match &inner[0] {
                    BoundStatement::Declaration { symbol, .. } => Rc::clone(symbol),
                    other => panic!("expected a declaration, got {:?}", other),
                };
                let used = match &inner[1] {
                    BoundStatement::Declaration {
                        initializer: Some(init),
                        ..
                    } => match &init.kind {
                        BoundExpressionKind::Variable(symbol) => Rc::clone(symbol),
                        other => panic!("expected a variable reference, got {:?}", other),
                    },
                    other => panic!("expected a declaration, got {:?}", other),
                };
                (decl, used)
            }
            other => panic!("expected a block, got {:?}", other),
        };
        let returned = match &body[2] {
            BoundStatement::Return { value: Some(value) } => match &value.kind {
                BoundExpressionKind::Variable(symbol) => Rc::clone(symbol),
                other => panic!("expected a variable reference, got {:?}", other),
            },
            other => panic!("expected a return, got {:?}", other),
        };

        // Inner reference binds to the inner symbol, outer to the outer.
        assert!(Rc::ptr_eq(&inner_use, &inner_decl));
        assert!(Rc::ptr_eq(&returned, &outer));
        assert!(!Rc::ptr_eq(&inner_decl, &outer));
    }

    #[test]
    fn test_binding_is_idempotent() {
        let source = "\
int counter = 3;
int twice(int x) { return x + x; }
int main() { mutable int y = twice(counter); y += 1; return y; }
";
        let mut diagnostics = DiagnosticBag::new();
        let tokens = Lexer::new(source, "test.mi".into()).tokenize(&mut diagnostics);
        let unit = Parser::new(tokens, &mut diagnostics).parse_compilation_unit();
        let operators = OperatorTables::new();

        let mut first_diags = DiagnosticBag::new();
        let first = bind(&unit, &operators, &mut first_diags);
        let mut second_diags = DiagnosticBag::new();
        let second = bind(&unit, &operators, &mut second_diags);

        assert_eq!(format!("{:?}", first), format!("{:?}", second));
        assert_eq!(first_diags.error_count(), second_diags.error_count());
        assert_eq!(first_diags.warning_count(), second_diags.warning_count());
    }

    #[test]
    fn test_assignment_requires_mutable() {
        let (_, diagnostics) = bind_source("int main() { int x = 1; x = 2; return x; }");
        assert_eq!(diagnostics.error_count(), 1);

        let (_, diagnostics) =
            bind_source("int main() { mutable int x = 1; x = 2; return x; }");
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn test_mutability_cast_asymmetry() {
        // Dropping pointee mutability is implicit; adding it is an error.
        let ok = "void take(int* p) {}\nint main() { mutable int x = 1; take(&x); return 0; }";
        let (_, diagnostics) = bind_source(ok);
        assert!(!diagnostics.has_errors());

        let bad = "void take(mutable int* p) {}\nint main() { int x = 1; take(&x); return 0; }";
        let (_, diagnostics) = bind_source(bad);
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn test_forward_reference_between_functions() {
        let source = "int first() { return second(); }\nint second() { return 2; }";
        let (_, diagnostics) = bind_source(source);
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn test_hint_then_definition() {
        let source = "hint int helper(int x);\nint main() { return helper(1); }\nint helper(int x) { return x; }";
        let (bound, diagnostics) = bind_source(source);
        assert!(!diagnostics.has_errors());
        // The call resolved to the defined symbol.
        assert!(bound.functions.iter().any(|f| f.symbol.defined));
    }

    #[test]
    fn test_conflicting_hint_signature() {
        let source = "hint int helper(int x);\nchar helper(int x) { return 'a'; }";
        let (_, diagnostics) = bind_source(source);
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn test_call_arity_errors() {
        let source = "int add(int a, int b) { return a + b; }\nint main() { return add(1); }";
        let (_, diagnostics) = bind_source(source);
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn test_condition_must_be_bool() {
        let (_, diagnostics) = bind_source("int main() { if (1) { return 1; } return 0; }");
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn test_break_outside_loop() {
        let (_, diagnostics) = bind_source("int main() { break; return 0; }");
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn test_struct_field_access_and_mutability() {
        let source = "\
struct Point { int x; int y; };
int main() {
    mutable Point p = { 1, 2 };
    p.x = 3;
    return p.x + p.y;
}
";
        let (_, diagnostics) = bind_source(source);
        assert!(!diagnostics.has_errors());

        let immutable = "\
struct Point { int x; int y; };
int main() {
    Point p = { 1, 2 };
    p.x = 3;
    return 0;
}
";
        let (_, diagnostics) = bind_source(immutable);
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn test_null_compares_against_pointers() {
        let source = "bool is_null(int* p) { return p == null; }";
        let (_, diagnostics) = bind_source(source);
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn test_global_initializer_must_be_constant() {
        let (_, diagnostics) = bind_source("int side() { return 1; }\nint g = side();");
        assert_eq!(diagnostics.error_count(), 1);

        let (_, diagnostics) = bind_source("int g = 4 * 4;");
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn test_explicit_cast_legality() {
        let (_, diagnostics) = bind_source("int main() { char c = 'a'; bool b = (bool)c; return 0; }");
        assert!(!diagnostics.has_errors());

        // Narrowing int to char has no size match and no implicit path.
        let (_, diagnostics) = bind_source("int main() { char c = (char)65; return 0; }");
        assert_eq!(diagnostics.error_count(), 1);
    }
}
