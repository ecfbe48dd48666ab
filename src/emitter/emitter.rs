//! Assembly emission for the bound tree
//!
//! Walks a [`BoundUnit`] and produces i686 assembly in AT&T syntax,
//! function by function. Expressions evaluate into registers allocated
//! from the [`RegisterFile`]; each function's body is buffered so the
//! prologue can subtract the final stack high-water mark. Locals and
//! parameters are addressed through `_name$depth` assembler equates, which
//! keeps shadowed names unique per scope depth.
//!
//! Output sections are assembled in order: `.text`, `.data`, `.bss`, then
//! the export directive section.

use crate::binder::bound::{
    BoundExpression, BoundExpressionKind, BoundFunction, BoundGlobal, BoundLiteral,
    BoundStatement, BoundUnit,
};
use crate::binder::operators::BinaryOpKind;
use crate::binder::operators::UnaryOpKind;
use crate::binder::scope::ScopeChain;
use crate::binder::symbols::{FunctionSymbol, StructRegistry, VariableSymbol};
use crate::binder::types::{BaseTy, Ty};
use crate::emitter::registers::{Reg, RegisterFile};
use crate::parser::ast::CallingConvention;
use std::fmt::Write;
use std::rc::Rc;

/// Emit a bound unit as assembly text.
pub fn emit(unit: &BoundUnit) -> String {
    let mut emitter = Emitter::new(&unit.structs);
    for global in &unit.globals {
        emitter.emit_global(global);
    }
    for function in &unit.functions {
        emitter.emit_function(function);
    }
    emitter.finish()
}

/// The decorated assembly-level name of a function.
fn asm_name(function: &FunctionSymbol) -> String {
    match function.convention {
        CallingConvention::CCall => format!("_{}", function.name),
        CallingConvention::StdCall => format!("_{}@{}", function.name, function.param_bytes()),
    }
}

/// Human-readable signature used as a comment next to the function label.
fn signature(function: &FunctionSymbol) -> String {
    let params: Vec<String> = function
        .params
        .iter()
        .map(|(name, ty)| format!("{} {}", ty, name))
        .collect();
    format!("{} {}({})", function.return_ty, function.name, params.join(", "))
}

struct Emitter<'a> {
    structs: &'a StructRegistry,
    text: String,
    data: String,
    bss: String,
    export: String,
    /// Buffered body of the function currently being emitted.
    body: String,
    registers: RegisterFile,
    scopes: ScopeChain,
    stack_usage: u32,
    allocated_stack: u32,
    /// Monotone across the whole unit: anonymous data and control-flow
    /// label ids.
    label_count: u32,
    loop_ends: Vec<String>,
    return_label: Option<String>,
    /// Interned string literals: content → data label id.
    strings: Vec<(String, u32)>,
}

impl<'a> Emitter<'a> {
    fn new(structs: &'a StructRegistry) -> Self {
        Self {
            structs,
            text: ".text\n".to_string(),
            data: ".data\n".to_string(),
            bss: ".bss\n".to_string(),
            export: "\t.section .drectve,\"yn\"\n".to_string(),
            body: String::new(),
            registers: RegisterFile::new(),
            scopes: ScopeChain::new(),
            stack_usage: 0,
            allocated_stack: 0,
            label_count: 0,
            loop_ends: Vec::new(),
            return_label: None,
            strings: Vec::new(),
        }
    }

    fn finish(self) -> String {
        let mut output = self.text;
        output.push_str(&self.data);
        output.push_str(&self.bss);
        output.push_str(&self.export);
        output.push_str("\t.addrsig\n");
        output
    }

    // ===== Output helpers =====

    fn ins(&mut self, mnemonic: &str, operands: &str) {
        let _ = writeln!(self.body, "\t{:<7} {}", mnemonic, operands);
    }

    fn ins0(&mut self, mnemonic: &str) {
        let _ = writeln!(self.body, "\t{}", mnemonic);
    }

    fn label(&mut self, name: &str) {
        let _ = writeln!(self.body, "{}:", name);
    }

    fn next_label(&mut self) -> u32 {
        let id = self.label_count;
        self.label_count += 1;
        id
    }

    /// Allocate a register, emitting the spill push when one is needed.
    fn allocate(&mut self) -> Reg {
        let allocation = self.registers.allocate();
        if let Some(spilled) = allocation.spilled {
            self.ins("push", spilled.name());
        }
        allocation.register
    }

    /// Release a register, emitting the restore pop when one is due.
    fn release(&mut self, register: Reg) {
        let release = self.registers.release(register);
        if let Some(restored) = release.restored {
            self.ins("pop", restored.name());
        }
    }

    /// Reserve stack bytes for a local, tracking the high-water mark that
    /// becomes the prologue's frame size.
    fn stack_alloc(&mut self, size: u32) {
        self.stack_usage += size;
        if self.stack_usage > self.allocated_stack {
            self.allocated_stack = self.stack_usage;
        }
    }

    // ===== Globals =====

    fn emit_global(&mut self, global: &BoundGlobal) {
        let symbol = &global.symbol;
        let size = symbol.ty.size(self.structs).max(1);

        let constant = global.initializer.as_ref().and_then(|init| init.constant);
        match constant {
            Some(value) => {
                let _ = writeln!(self.data, "_{}:", symbol.name);
                if size == 1 {
                    let _ = writeln!(self.data, "\t.byte {}", value as u8);
                } else {
                    let _ = writeln!(self.data, "\t.long {}", value);
                }
            }
            None => {
                let _ = writeln!(self.bss, "\t.comm _{}, {}", symbol.name, size);
            }
        }
    }

    // ===== Functions =====

    fn emit_function(&mut self, function: &BoundFunction) {
        let symbol = &function.symbol;
        let name = asm_name(symbol);

        self.body.clear();
        self.registers = RegisterFile::new();
        self.scopes = ScopeChain::new();
        self.stack_usage = 0;
        self.allocated_stack = 0;
        self.loop_ends.clear();
        self.return_label = if needs_return_label(&function.body) {
            Some(format!("..{}.return", name))
        } else {
            None
        };

        // Parameters: positive offsets from the frame pointer in
        // declaration order, one stack word each.
        self.scopes.push();
        let mut offset = 4u32;
        for param in &function.params {
            offset += 4;
            let depth = self.scopes.depth();
            let _ = writeln!(self.body, "_{}${} = {}", param.name, depth, offset);
            self.scopes.declare(Rc::clone(param));
        }

        self.emit_statement(&function.body);
        self.scopes.pop();

        // Header and prologue, now that the frame size is known.
        if !symbol.private {
            let _ = writeln!(self.text, ".global {}", name);
        }
        let _ = writeln!(self.text, "{}: # {}", name, signature(symbol));
        let _ = writeln!(self.text, "\tpush    %ebp");
        let _ = writeln!(self.text, "\tmov     %esp, %ebp");
        if self.allocated_stack > 0 {
            let _ = writeln!(self.text, "\tsub     ${}, %esp", self.allocated_stack);
        }

        let body = std::mem::take(&mut self.body);
        self.text.push_str(&body);

        if let Some(label) = self.return_label.take() {
            let _ = writeln!(self.text, "{}:", label);
        }
        let _ = writeln!(self.text, "\tmov     %ebp, %esp");
        let _ = writeln!(self.text, "\tpop     %ebp");
        match symbol.convention {
            CallingConvention::StdCall if symbol.param_bytes() > 0 => {
                let _ = writeln!(self.text, "\tret     ${}", symbol.param_bytes());
            }
            _ => {
                let _ = writeln!(self.text, "\tret");
            }
        }

        if symbol.exported {
            let _ = writeln!(self.export, "\t.ascii \" /EXPORT:{}\"", name);
        }
    }

    // ===== Statements =====

    fn emit_statement(&mut self, statement: &BoundStatement) {
        match statement {
            BoundStatement::Block(statements) => {
                self.scopes.push();
                let saved_usage = self.stack_usage;
                for statement in statements {
                    self.emit_statement(statement);
                }
                // Sibling blocks reuse this block's stack space; the frame
                // is sized by the high-water mark, not the sum.
                self.stack_usage = saved_usage;
                self.scopes.pop();
            }
            BoundStatement::Declaration {
                symbol,
                initializer,
            } => self.emit_declaration(symbol, initializer.as_ref()),
            BoundStatement::Expression(expr) => {
                let register = self.emit_expression(expr);
                self.release(register);
            }
            BoundStatement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let id = self.next_label();
                let register = self.emit_expression(condition);
                self.ins("test", &format!("{}, {}", register, register));
                self.release(register);
                self.ins("je", &format!("..else.{}", id));

                self.emit_statement(then_branch);
                self.ins("jmp", &format!("..end.{}", id));

                self.label(&format!("..else.{}", id));
                if let Some(else_branch) = else_branch {
                    self.emit_statement(else_branch);
                }
                self.label(&format!("..end.{}", id));
            }
            BoundStatement::While { condition, body } => {
                let id = self.next_label();
                self.label(&format!("..loop.{}", id));

                let register = self.emit_expression(condition);
                self.ins("test", &format!("{}, {}", register, register));
                self.release(register);
                self.ins("je", &format!("..end.{}", id));

                self.loop_ends.push(format!("..end.{}", id));
                self.emit_statement(body);
                self.loop_ends.pop();

                self.ins("jmp", &format!("..loop.{}", id));
                self.label(&format!("..end.{}", id));
            }
            BoundStatement::For {
                initializer,
                condition,
                increment,
                body,
            } => {
                self.scopes.push();
                let saved_usage = self.stack_usage;

                if let Some(initializer) = initializer {
                    self.emit_statement(initializer);
                }

                let id = self.next_label();
                self.label(&format!("..loop.{}", id));
                if let Some(condition) = condition {
                    let register = self.emit_expression(condition);
                    self.ins("test", &format!("{}, {}", register, register));
                    self.release(register);
                    self.ins("je", &format!("..end.{}", id));
                }

                self.loop_ends.push(format!("..end.{}", id));
                self.emit_statement(body);
                self.loop_ends.pop();

                if let Some(increment) = increment {
                    let register = self.emit_expression(increment);
                    self.release(register);
                }
                self.ins("jmp", &format!("..loop.{}", id));
                self.label(&format!("..end.{}", id));

                self.stack_usage = saved_usage;
                self.scopes.pop();
            }
            BoundStatement::Break => {
                let target = self
                    .loop_ends
                    .last()
                    .cloned()
                    .expect("break statement survived binding outside a loop");
                self.ins("jmp", &target);
            }
            BoundStatement::Return { value } => {
                if let Some(value) = value {
                    let register = self.emit_expression(value);
                    if register != Reg::EAX {
                        self.ins("mov", &format!("{}, %eax", register));
                    }
                    self.release(register);
                }
                if let Some(label) = self.return_label.clone() {
                    self.ins("jmp", &label);
                }
            }
            BoundStatement::Empty => {}
        }
    }

    fn emit_declaration(
        &mut self,
        symbol: &Rc<VariableSymbol>,
        initializer: Option<&BoundExpression>,
    ) {
        let size = symbol.ty.size(self.structs).max(1);
        self.stack_alloc(size);

        let depth = self.scopes.depth();
        let _ = writeln!(self.body, "_{}${} = -{}", symbol.name, depth, self.stack_usage);
        self.scopes.declare(Rc::clone(symbol));

        let Some(initializer) = initializer else {
            return;
        };

        match &initializer.kind {
            BoundExpressionKind::StructInitializer { values } => {
                let layout = match &symbol.ty.base {
                    BaseTy::Struct(name) => self
                        .structs
                        .get(name)
                        .expect("struct layout resolved during binding"),
                    other => panic!("struct initializer for non-struct type {:?}", other),
                };
                let fields = layout.fields.clone();
                for (value, field) in values.iter().zip(fields) {
                    let register = self.emit_expression(value);
                    let slot =
                        format!("_{}${}+{}(%ebp)", symbol.name, depth, field.offset);
                    self.store_sized(register, &slot, &field.ty);
                    self.release(register);
                }
            }
            _ => {
                let register = self.emit_expression(initializer);
                let slot = self.variable_slot(symbol);
                self.store_sized(register, &slot, &symbol.ty);
                self.release(register);
            }
        }
    }

    // ===== Expressions =====

    /// Evaluate an expression into a freshly allocated register.
    fn emit_expression(&mut self, expr: &BoundExpression) -> Reg {
        // Folded expressions load their constant directly.
        if let Some(constant) = expr.constant {
            let register = self.allocate();
            self.ins("mov", &format!("${}, {}", constant, register));
            return register;
        }

        match &expr.kind {
            BoundExpressionKind::Literal(BoundLiteral::String(text)) => {
                let id = self.intern_string(text);
                let register = self.allocate();
                self.ins("lea", &format!("..{}, {}", id, register));
                register
            }
            BoundExpressionKind::Literal(_) => {
                unreachable!("non-string literals always carry a constant")
            }
            BoundExpressionKind::Variable(symbol) => {
                let slot = self.variable_slot(symbol);
                let register = self.allocate();
                self.load_sized(register, &slot, &symbol.ty.clone());
                register
            }
            BoundExpressionKind::Unary { operator, operand } => {
                let register = self.emit_expression(operand);
                match operator.kind {
                    UnaryOpKind::Identity => {}
                    UnaryOpKind::Negate => self.ins("neg", register.name()),
                    UnaryOpKind::BitwiseNot => self.ins("not", register.name()),
                    UnaryOpKind::LogicalNot => {
                        self.ins("test", &format!("{}, {}", register, register));
                        self.ins("sete", register.byte_name());
                        self.ins(
                            "movzbl",
                            &format!("{}, {}", register.byte_name(), register),
                        );
                    }
                    UnaryOpKind::Error => {
                        unreachable!("error operator survived to emission")
                    }
                }
                register
            }
            BoundExpressionKind::Binary {
                operator,
                left,
                right,
            } => match operator.kind {
                BinaryOpKind::LogicalAnd => self.emit_short_circuit(left, right, true),
                BinaryOpKind::LogicalOr => self.emit_short_circuit(left, right, false),
                kind => {
                    let lhs = self.emit_expression(left);
                    let rhs = self.emit_expression(right);
                    self.apply_binary(kind, lhs, rhs);
                    self.release(rhs);
                    lhs
                }
            },
            BoundExpressionKind::PointerEquality {
                negated,
                left,
                right,
            } => {
                let lhs = self.emit_expression(left);
                let rhs = self.emit_expression(right);
                self.ins("cmp", &format!("{}, {}", rhs, lhs));
                self.ins(if *negated { "setne" } else { "sete" }, lhs.byte_name());
                self.ins("movzbl", &format!("{}, {}", lhs.byte_name(), lhs));
                self.release(rhs);
                lhs
            }
            BoundExpressionKind::Assignment {
                target,
                operator,
                value,
            } => self.emit_assignment(target, operator.as_deref(), value),
            BoundExpressionKind::Call {
                function,
                arguments,
            } => self.emit_call(function, arguments),
            BoundExpressionKind::Cast { operand } => {
                // Casts are representation-preserving on this target; the
                // legality checks happened during binding.
                self.emit_expression(operand)
            }
            BoundExpressionKind::Field { object, field } => {
                let register = self.emit_address(object);
                let slot = format!("{}({})", field.offset, register);
                self.load_sized(register, &slot, &field.ty.clone());
                register
            }
            BoundExpressionKind::Index { object, index } => {
                let ty = expr.ty.clone();
                let register = self.emit_indexed_address(object, index, &ty);
                self.load_sized(register, &format!("({})", register), &ty);
                register
            }
            BoundExpressionKind::Dereference { operand } => {
                let register = self.emit_expression(operand);
                let ty = expr.ty.clone();
                self.load_sized(register, &format!("({})", register), &ty);
                register
            }
            BoundExpressionKind::AddressOf { operand } => self.emit_address(operand),
            BoundExpressionKind::StructInitializer { values } => {
                // A struct initializer outside a declaration has no
                // storage; evaluate the values for their effects.
                for value in values {
                    let register = self.emit_expression(value);
                    self.release(register);
                }
                let register = self.allocate();
                self.ins("xor", &format!("{}, {}", register, register));
                register
            }
            BoundExpressionKind::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                let id = self.next_label();
                let cond = self.emit_expression(condition);
                self.ins("test", &format!("{}, {}", cond, cond));
                self.release(cond);

                // Allocated before the branch so a spill lands on both
                // paths.
                let result = self.allocate();
                self.ins("je", &format!("..else.{}", id));

                let then_reg = self.emit_expression(then_value);
                self.ins("mov", &format!("{}, {}", then_reg, result));
                self.release(then_reg);
                self.ins("jmp", &format!("..end.{}", id));

                self.label(&format!("..else.{}", id));
                let else_reg = self.emit_expression(else_value);
                self.ins("mov", &format!("{}, {}", else_reg, result));
                self.release(else_reg);
                self.label(&format!("..end.{}", id));

                result
            }
            BoundExpressionKind::Error => {
                panic!("error expression survived to emission; the driver must gate on binder errors")
            }
        }
    }

    /// `&&`/`||` with a short-circuit jump past the right operand.
    fn emit_short_circuit(
        &mut self,
        left: &BoundExpression,
        right: &BoundExpression,
        is_and: bool,
    ) -> Reg {
        let id = self.next_label();
        let result = self.emit_expression(left);
        self.ins("test", &format!("{}, {}", result, result));
        self.ins(if is_and { "je" } else { "jne" }, &format!("..short.{}", id));

        let rhs = self.emit_expression(right);
        self.ins("mov", &format!("{}, {}", rhs, result));
        self.release(rhs);

        self.label(&format!("..short.{}", id));
        result
    }

    /// Apply a non-logical binary operation, leaving the result in `lhs`.
    fn apply_binary(&mut self, kind: BinaryOpKind, lhs: Reg, rhs: Reg) {
        match kind {
            BinaryOpKind::Add => self.ins("add", &format!("{}, {}", rhs, lhs)),
            BinaryOpKind::Subtract => self.ins("sub", &format!("{}, {}", rhs, lhs)),
            BinaryOpKind::Multiply => self.ins("imul", &format!("{}, {}", rhs, lhs)),
            BinaryOpKind::Divide => self.emit_division(lhs, rhs, false),
            BinaryOpKind::Modulo => self.emit_division(lhs, rhs, true),
            BinaryOpKind::BitAnd => self.ins("and", &format!("{}, {}", rhs, lhs)),
            BinaryOpKind::BitOr => self.ins("or", &format!("{}, {}", rhs, lhs)),
            BinaryOpKind::BitXor => self.ins("xor", &format!("{}, {}", rhs, lhs)),
            BinaryOpKind::ShiftLeft => self.emit_shift(lhs, rhs, "sal"),
            BinaryOpKind::ShiftRight => self.emit_shift(lhs, rhs, "sar"),
            BinaryOpKind::Equal
            | BinaryOpKind::NotEqual
            | BinaryOpKind::Less
            | BinaryOpKind::LessEqual
            | BinaryOpKind::Greater
            | BinaryOpKind::GreaterEqual => {
                let set = match kind {
                    BinaryOpKind::Equal => "sete",
                    BinaryOpKind::NotEqual => "setne",
                    BinaryOpKind::Less => "setl",
                    BinaryOpKind::LessEqual => "setle",
                    BinaryOpKind::Greater => "setg",
                    _ => "setge",
                };
                self.ins("cmp", &format!("{}, {}", rhs, lhs));
                self.ins(set, lhs.byte_name());
                self.ins("movzbl", &format!("{}, {}", lhs.byte_name(), lhs));
            }
            BinaryOpKind::LogicalAnd | BinaryOpKind::LogicalOr => {
                unreachable!("logical operators are emitted with short circuits")
            }
            BinaryOpKind::Error => unreachable!("error operator survived to emission"),
        }
    }

    /// `idiv` needs the dividend in `%eax:%edx`; live registers that
    /// conflict are saved around the operation and the divisor goes
    /// through the stack so it stays addressable.
    fn emit_division(&mut self, lhs: Reg, rhs: Reg, remainder: bool) {
        let mut saved = Vec::new();
        for reg in [Reg::EAX, Reg::EDX] {
            if self.registers.is_allocated(reg) && reg != lhs && reg != rhs {
                self.ins("push", reg.name());
                saved.push(reg);
            }
        }

        self.ins("push", rhs.name());
        if lhs != Reg::EAX {
            self.ins("mov", &format!("{}, %eax", lhs));
        }
        self.ins0("cltd");
        self.ins("idivl", "(%esp)");
        self.ins("add", "$4, %esp");

        let result = if remainder { Reg::EDX } else { Reg::EAX };
        if lhs != result {
            self.ins("mov", &format!("{}, {}", result, lhs));
        }

        for reg in saved.into_iter().rev() {
            self.ins("pop", reg.name());
        }
    }

    /// Shift counts live in `%cl`.
    fn emit_shift(&mut self, lhs: Reg, rhs: Reg, mnemonic: &str) {
        if rhs == Reg::ECX {
            self.ins(mnemonic, &format!("%cl, {}", lhs));
        } else if lhs == Reg::ECX {
            // The value occupies %ecx: swap it with the count and shift in
            // the other register.
            self.ins("xchg", &format!("{}, {}", rhs, lhs));
            self.ins(mnemonic, &format!("%cl, {}", rhs));
            self.ins("mov", &format!("{}, {}", rhs, lhs));
        } else {
            let save = self.registers.is_allocated(Reg::ECX);
            if save {
                self.ins("push", "%ecx");
            }
            self.ins("mov", &format!("{}, %ecx", rhs));
            self.ins(mnemonic, &format!("%cl, {}", lhs));
            if save {
                self.ins("pop", "%ecx");
            }
        }
    }

    fn emit_assignment(
        &mut self,
        target: &BoundExpression,
        operator: Option<&crate::binder::operators::BinaryOperator>,
        value: &BoundExpression,
    ) -> Reg {
        match operator {
            None => {
                let register = self.emit_expression(value);
                self.store_to(target, register);
                register
            }
            Some(op) => {
                let value_reg = self.emit_expression(value);
                match &target.kind {
                    BoundExpressionKind::Variable(symbol) => {
                        let symbol = Rc::clone(symbol);
                        let slot = self.variable_slot(&symbol);
                        let current = self.allocate();
                        self.load_sized(current, &slot, &symbol.ty.clone());
                        self.apply_binary(op.kind, current, value_reg);
                        self.release(value_reg);
                        self.store_sized(current, &slot, &symbol.ty.clone());
                        current
                    }
                    _ => {
                        let address = self.emit_address(target);
                        let current = self.allocate();
                        let ty = target.ty.clone();
                        self.load_sized(current, &format!("({})", address), &ty);
                        self.apply_binary(op.kind, current, value_reg);
                        self.release(value_reg);
                        self.store_sized(current, &format!("({})", address), &ty);
                        self.release(address);
                        current
                    }
                }
            }
        }
    }

    /// Store an evaluated value into an lvalue without consuming the
    /// value register.
    fn store_to(&mut self, target: &BoundExpression, value: Reg) {
        match &target.kind {
            BoundExpressionKind::Variable(symbol) => {
                let symbol = Rc::clone(symbol);
                let slot = self.variable_slot(&symbol);
                self.store_sized(value, &slot, &symbol.ty.clone());
            }
            _ => {
                let address = self.emit_address(target);
                let ty = target.ty.clone();
                self.store_sized(value, &format!("({})", address), &ty);
                self.release(address);
            }
        }
    }

    fn emit_call(&mut self, function: &Rc<FunctionSymbol>, arguments: &[BoundExpression]) -> Reg {
        let destination = self.allocate();

        // Preserve every live register across the call.
        let saved: Vec<Reg> = self
            .registers
            .allocated()
            .into_iter()
            .filter(|&reg| reg != destination)
            .collect();
        for reg in &saved {
            self.ins("push", reg.name());
        }

        // Arguments go on in reverse declaration order so the first
        // parameter lands at the lowest address in the callee's frame.
        for argument in arguments.iter().rev() {
            let register = self.emit_expression(argument);
            self.ins("push", register.name());
            self.release(register);
        }

        self.ins("call", &asm_name(function));
        if function.convention == CallingConvention::CCall && !arguments.is_empty() {
            self.ins("add", &format!("${}, %esp", arguments.len() * 4));
        }

        if destination != Reg::EAX {
            self.ins("mov", &format!("%eax, {}", destination));
        }
        for reg in saved.into_iter().rev() {
            self.ins("pop", reg.name());
        }

        destination
    }

    // ===== Addressing =====

    /// Evaluate an lvalue to the register holding its address.
    fn emit_address(&mut self, expr: &BoundExpression) -> Reg {
        match &expr.kind {
            BoundExpressionKind::Variable(symbol) => {
                let symbol = Rc::clone(symbol);
                let slot = self.variable_slot(&symbol);
                let register = self.allocate();
                self.ins("lea", &format!("{}, {}", slot, register));
                register
            }
            BoundExpressionKind::Dereference { operand } => self.emit_expression(operand),
            BoundExpressionKind::Index { object, index } => {
                let ty = expr.ty.clone();
                self.emit_indexed_address(object, index, &ty)
            }
            BoundExpressionKind::Field { object, field } => {
                let register = self.emit_address(object);
                if field.offset > 0 {
                    self.ins("add", &format!("${}, {}", field.offset, register));
                }
                register
            }
            other => panic!("taking the address of a non-lvalue: {:?}", other),
        }
    }

    /// `base + index * element_size`, left in the base register.
    fn emit_indexed_address(
        &mut self,
        object: &BoundExpression,
        index: &BoundExpression,
        element_ty: &Ty,
    ) -> Reg {
        let base = self.emit_expression(object);
        let index_reg = self.emit_expression(index);
        let scale = element_ty.size(self.structs).max(1);
        if scale > 1 {
            self.ins("imul", &format!("${}, {}", scale, index_reg));
        }
        self.ins("add", &format!("{}, {}", index_reg, base));
        self.release(index_reg);
        base
    }

    /// The operand naming a variable's storage: a `_name$depth(%ebp)`
    /// equate for locals, the plain symbol for globals. Locals are checked
    /// against the emission scope chain; a mismatch with the bound symbol
    /// is an internal inconsistency.
    fn variable_slot(&self, symbol: &Rc<VariableSymbol>) -> String {
        if symbol.global {
            return format!("_{}", symbol.name);
        }

        let (found, depth) = self
            .scopes
            .lookup(&symbol.name)
            .unwrap_or_else(|| panic!("local '{}' is not in the emission scope", symbol.name));
        assert!(
            Rc::ptr_eq(&found, symbol),
            "emission scope resolved '{}' to a different symbol than the binder",
            symbol.name
        );
        format!("_{}${}(%ebp)", symbol.name, depth)
    }

    /// Load through `slot` with the width of `ty`, widening sub-word
    /// values (sign-extended `char`, zero-extended `bool`).
    fn load_sized(&mut self, register: Reg, slot: &str, ty: &Ty) {
        let size = ty.size(self.structs);
        if ty.pointer_depth == 0 && matches!(ty.base, BaseTy::Struct(_)) {
            panic!("struct values have no scalar representation");
        }
        if size == 1 {
            let widen = if ty.base == BaseTy::Char { "movsbl" } else { "movzbl" };
            self.ins(widen, &format!("{}, {}", slot, register));
        } else {
            self.ins("mov", &format!("{}, {}", slot, register));
        }
    }

    /// Store `register` through `slot` with the width of `ty`.
    fn store_sized(&mut self, register: Reg, slot: &str, ty: &Ty) {
        let size = ty.size(self.structs);
        if ty.pointer_depth == 0 && matches!(ty.base, BaseTy::Struct(_)) {
            panic!("struct values have no scalar representation");
        }
        if size == 1 {
            self.ins("mov", &format!("{}, {}", register.byte_name(), slot));
        } else {
            self.ins("mov", &format!("{}, {}", register.name(), slot));
        }
    }

    /// Intern a string literal: the first occurrence emits the datum, later
    /// identical literals reuse its label.
    fn intern_string(&mut self, text: &str) -> u32 {
        if let Some((_, id)) = self.strings.iter().find(|(existing, _)| existing == text) {
            return *id;
        }

        let id = self.next_label();
        let _ = writeln!(self.data, "..{}:", id);
        let _ = writeln!(self.data, "\t.string \"{}\"", escape_asm(text));
        self.strings.push((text.to_string(), id));
        id
    }
}

/// Escape a decoded string for a `.string` directive.
fn escape_asm(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\000"),
            _ => out.push(ch),
        }
    }
    out
}

/// A function needs the shared return label unless its only return is the
/// final top-level statement of the body.
fn needs_return_label(body: &BoundStatement) -> bool {
    let statements = match body {
        BoundStatement::Block(statements) => statements,
        other => panic!("function body must be a block, got {:?}", other),
    };

    for (index, statement) in statements.iter().enumerate() {
        let is_final = index + 1 == statements.len();
        if is_final && matches!(statement, BoundStatement::Return { .. }) {
            continue;
        }
        if contains_return(statement) {
            return true;
        }
    }
    false
}

fn contains_return(statement: &BoundStatement) -> bool {
    match statement {
        BoundStatement::Return { .. } => true,
        BoundStatement::Block(statements) => statements.iter().any(contains_return),
        BoundStatement::If {
            then_branch,
            else_branch,
            ..
        } => {
            contains_return(then_branch)
                || else_branch.as_deref().map(contains_return).unwrap_or(false)
        }
        BoundStatement::While { body, .. } => contains_return(body),
        BoundStatement::For { body, .. } => contains_return(body),
        _ => false,
    }
}
