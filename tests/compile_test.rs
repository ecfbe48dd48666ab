// Integration tests driving the whole pipeline: source text in, assembly
// text (or stage-gated errors) out.

use micac::binder::binder::bind;
use micac::binder::operators::OperatorTables;
use micac::compiler::{CompileError, CompileOptions, Compiler};
use micac::diagnostics::DiagnosticBag;
use micac::parser::ast::{CompilationUnit, Expression, Member, Statement};
use micac::parser::lexer::{Lexer, TokenKind};
use micac::parser::parse::Parser;

fn compiler() -> Compiler {
    Compiler::new(CompileOptions::default())
}

fn compile(source: &str) -> String {
    compiler()
        .compile_source(source, "test.mi")
        .expect("compilation failed")
}

fn parse(source: &str) -> (CompilationUnit, usize, DiagnosticBag) {
    let mut diagnostics = DiagnosticBag::new();
    let tokens = Lexer::new(source, "test.mi".into()).tokenize(&mut diagnostics);
    let token_count = tokens.len();
    let unit = Parser::new(tokens, &mut diagnostics).parse_compilation_unit();
    (unit, token_count, diagnostics)
}

#[test]
fn test_constant_fold_to_single_load() {
    let asm = compile("int main() { return 2 + 3 * 4; }");
    assert!(asm.contains("$14"));
    assert!(!asm.contains("imul"));
}

#[test]
fn test_if_without_else_falls_through() {
    let asm = compile("int main() { mutable int x = 0; if (x == 0) { x = 1; } return x; }");
    assert!(asm.contains("je      ..else."));
    // The else label exists with an empty body before the merge label.
    let else_at = asm.find("..else.").unwrap();
    let end_at = asm.find("..end.").unwrap();
    assert!(else_at < end_at);
}

#[test]
fn test_identical_string_literals_share_one_datum() {
    let source = r#"
extern void puts(char* s);

void greet() {
    puts("hi");
    puts("hi");
}
"#;
    let asm = compile(source);
    assert_eq!(asm.matches(".string \"hi\"").count(), 1);

    // Two references to the one label, which sits on the line above the
    // datum.
    let lines: Vec<&str> = asm.lines().collect();
    let datum = lines
        .iter()
        .position(|l| l.contains(".string \"hi\""))
        .unwrap();
    let label = lines[datum - 1].trim_end_matches(':');
    assert_eq!(asm.matches(&format!("lea     {},", label)).count(), 2);
}

#[test]
fn test_shadowing_uses_depth_unique_slots() {
    let source = r#"
int main() {
    mutable int value = 1;
    {
        mutable int value = 2;
        value = 3;
    }
    value = 4;
    return value;
}
"#;
    let asm = compile(source);
    assert!(asm.contains("_value$2 = "));
    assert!(asm.contains("_value$3 = "));
}

#[test]
fn test_mutability_cast_asymmetry() {
    // Dropping pointee mutability is implicit.
    let ok = r#"
int read(int* p) { return *p; }
int main() { mutable int x = 5; return read(&x); }
"#;
    assert!(compiler().compile_source(ok, "test.mi").is_ok());

    // Adding it is a binding error.
    let bad = r#"
void write(mutable int* p) { *p = 1; }
int main() { int x = 5; write(&x); return x; }
"#;
    let result = compiler().compile_source(bad, "test.mi");
    assert!(matches!(result, Err(CompileError::Bind(1))));
}

#[test]
fn test_unmatched_else_is_one_diagnostic() {
    let (_, _, diagnostics) = parse("int main() { else return 1; return 0; }");
    assert_eq!(diagnostics.error_count(), 1);
}

#[test]
fn test_parser_terminates_on_malformed_input() {
    let sources = [
        "int main( { return 0; }",
        "{{{{",
        "int x = ;",
        ") ) )",
        "struct { int }",
        "int f() { return (1 + ; }",
    ];
    for source in sources {
        let (unit, token_count, diagnostics) = parse(source);
        assert!(diagnostics.has_errors(), "no diagnostics for {:?}", source);
        // Structurally complete and bounded output.
        assert!(node_count(&unit) <= token_count * 2);
    }
}

#[test]
fn test_node_count_bounded_by_token_count() {
    let source = r#"
struct Pair { int first; int second; };
int sum(int a, int b) { return a + b; }
int main() {
    mutable Pair p = { 1, 2 };
    mutable int total = 0;
    for (mutable int i = 0; i < 10; i += 1) {
        total = sum(total, p.first * p.second + i);
    }
    return total;
}
"#;
    let (unit, token_count, diagnostics) = parse(source);
    assert!(!diagnostics.has_errors());
    assert!(node_count(&unit) <= token_count);
}

#[test]
fn test_preprocessor_end_to_end() {
    let source = r#"
# define LIMIT 3
# ifdef LIMIT
int limit() { return LIMIT; }
# else
int limit() { return 0; }
# endif
int main() { return limit(); }
"#;
    let asm = compile(source);
    assert!(asm.contains("$3"));
    assert_eq!(asm.matches("_limit:").count(), 1);
}

#[test]
fn test_disabled_branch_discards_tokens() {
    let source = r#"
# if 0
this is not even valid mica
# endif
int main() { return 0; }
"#;
    assert!(compiler().compile_source(source, "test.mi").is_ok());
}

#[test]
fn test_stage_gating_stops_at_first_failing_stage() {
    // A parse error means binding never runs, so the undefined variable
    // in the second function goes unreported.
    let source = "int broken( { return 0; }\nint other() { return missing; }";
    let result = compiler().compile_source(source, "test.mi");
    assert!(matches!(result, Err(CompileError::Parse(_))));
}

#[test]
fn test_full_program_compiles() {
    let source = r#"
# define START 1

struct Counter {
    int value;
    int step;
};

extern void print_int(int n);
hint int advance(mutable Counter* c);

int advance(mutable Counter* c) {
    (*c).value += (*c).step;
    return (*c).value;
}

private int run(int rounds) {
    mutable Counter counter = { START, 2 };
    mutable int last = 0;
    for (mutable int i = 0; i < rounds; i += 1) {
        last = advance(&counter);
        if (last > 100) {
            break;
        }
    }
    return last;
}

export int main() {
    int result = run(5);
    print_int(result);
    return result == 11 ? 0 : 1;
}
"#;
    let asm = compile(source);

    assert!(asm.contains("_advance:"));
    assert!(asm.contains("_run:"));
    assert!(!asm.contains(".global _run"));
    assert!(asm.contains(".global _main"));
    assert!(asm.contains(".ascii \" /EXPORT:_main\""));
    assert!(asm.contains("call    _print_int"));
    // No body for the extern import.
    assert!(!asm.contains("_print_int:"));
}

#[test]
fn test_void_function_and_empty_statements() {
    let asm = compile("void nop() { ; ; }\nint main() { nop(); return 0; }");
    assert!(asm.contains("_nop:"));
    assert!(asm.contains("call    _nop"));
}

#[test]
fn test_global_variables_flow_through() {
    let source = r#"
int base = 40;
mutable int counter;

int main() {
    counter = base + 2;
    return counter;
}
"#;
    let asm = compile(source);
    assert!(asm.contains("_base:"));
    assert!(asm.contains(".comm _counter, 4"));
    assert!(asm.contains("mov     _base, "));
}

#[test]
fn test_pointer_indexing() {
    let source = r#"
char first(char* s) { return s[0]; }
int pick(int* xs, int i) { return xs[i]; }
"#;
    let asm = compile(source);
    // Byte elements need no scaling; int elements scale by four.
    assert!(asm.contains("imul    $4,"));
    assert!(asm.contains("movsbl  ("));
}

// ===== helpers =====

fn node_count(unit: &CompilationUnit) -> usize {
    unit.members.iter().map(member_nodes).sum()
}

fn member_nodes(member: &Member) -> usize {
    match member {
        Member::Function(f) => 1 + statement_nodes(&f.body),
        Member::Global(g) => {
            1 + g.initializer.as_ref().map(expression_nodes).unwrap_or(0)
        }
        Member::Hint(_) | Member::Extern(_) | Member::Struct(_) => 1,
    }
}

fn statement_nodes(statement: &Statement) -> usize {
    1 + match statement {
        Statement::Block { statements, .. } => statements.iter().map(statement_nodes).sum(),
        Statement::If {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            expression_nodes(condition)
                + statement_nodes(then_branch)
                + else_branch.as_deref().map(statement_nodes).unwrap_or(0)
        }
        Statement::While {
            condition, body, ..
        } => expression_nodes(condition) + statement_nodes(body),
        Statement::For {
            initializer,
            condition,
            increment,
            body,
            ..
        } => {
            initializer.as_deref().map(statement_nodes).unwrap_or(0)
                + condition.as_ref().map(expression_nodes).unwrap_or(0)
                + increment.as_ref().map(expression_nodes).unwrap_or(0)
                + statement_nodes(body)
        }
        Statement::Return { value, .. } => value.as_ref().map(expression_nodes).unwrap_or(0),
        Statement::Declaration(decl) => {
            decl.initializer.as_ref().map(expression_nodes).unwrap_or(0)
        }
        Statement::Expression { expr } => expression_nodes(expr),
        Statement::Break { .. } | Statement::Empty { .. } => 0,
    }
}

fn expression_nodes(expr: &Expression) -> usize {
    1 + match expr {
        Expression::Binary { left, right, .. } => expression_nodes(left) + expression_nodes(right),
        Expression::Unary { operand, .. }
        | Expression::Dereference { operand, .. }
        | Expression::AddressOf { operand, .. }
        | Expression::Cast { operand, .. } => expression_nodes(operand),
        Expression::Assignment { target, value, .. } => {
            expression_nodes(target) + expression_nodes(value)
        }
        Expression::Call { arguments, .. } => arguments.iter().map(expression_nodes).sum(),
        Expression::Field { object, .. } => expression_nodes(object),
        Expression::Index { object, index, .. } => {
            expression_nodes(object) + expression_nodes(index)
        }
        Expression::Parenthesized { inner, .. } => expression_nodes(inner),
        Expression::StructInitializer { values, .. } => {
            values.iter().map(expression_nodes).sum()
        }
        Expression::Ternary {
            condition,
            then_value,
            else_value,
            ..
        } => {
            expression_nodes(condition)
                + expression_nodes(then_value)
                + expression_nodes(else_value)
        }
        Expression::List { items, .. } => items.iter().map(expression_nodes).sum(),
        Expression::Literal(_) | Expression::Variable { .. } => 0,
    }
}

#[test]
fn test_binding_twice_is_identical() {
    let source = r#"
int scale = 3;
int triple(int x) { return x * scale; }
int main() { return triple(4); }
"#;
    let mut diagnostics = DiagnosticBag::new();
    let tokens = Lexer::new(source, "test.mi".into()).tokenize(&mut diagnostics);
    let unit = Parser::new(tokens, &mut diagnostics).parse_compilation_unit();
    assert!(!diagnostics.has_errors());

    let operators = OperatorTables::new();
    let mut first_bag = DiagnosticBag::new();
    let mut second_bag = DiagnosticBag::new();
    let first = bind(&unit, &operators, &mut first_bag);
    let second = bind(&unit, &operators, &mut second_bag);

    assert_eq!(format!("{:?}", first), format!("{:?}", second));
    assert_eq!(first_bag.error_count(), second_bag.error_count());
}

#[test]
fn test_lexer_directive_routing() {
    // Directive lines never reach the parser as ordinary tokens.
    let mut diagnostics = DiagnosticBag::new();
    let tokens = Lexer::new("# define X 1\nint x;", "test.mi".into()).tokenize(&mut diagnostics);
    assert!(tokens[0].is(TokenKind::Comment));
}
