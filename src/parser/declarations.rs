//! Top-level member parsing
//!
//! Members are functions, function hints (forward declarations), extern
//! declarations, global variables and struct declarations. Functions and
//! globals both begin with a type, so dispatch speculatively parses a type
//! and a name and checks whether `(` follows; the cursor rewinds to the
//! saved checkpoint before the chosen production re-parses for real.

use crate::parser::ast::{
    CallingConvention, ExternDeclaration, FieldDeclaration, FunctionDeclaration, FunctionHint,
    Member, Parameter, StructDeclaration, VariableDeclaration,
};
use crate::parser::lexer::TokenKind;
use crate::parser::parse::Parser;

impl Parser<'_> {
    pub(crate) fn parse_member(&mut self) -> Member {
        match self.peek().kind {
            TokenKind::Struct => return Member::Struct(self.parse_struct_declaration()),
            TokenKind::Hint => return Member::Hint(self.parse_function_hint()),
            TokenKind::Extern => return Member::Extern(self.parse_extern_declaration()),
            _ => {}
        }

        // Function or global variable: both start with optional linkage
        // modifiers and a type. Peek past them speculatively and decide on
        // the token after the name.
        let start = self.checkpoint();
        while self.check(TokenKind::Private) || self.check(TokenKind::Export) {
            self.advance();
        }

        let is_function = self.try_parse_type().is_some() && {
            self.match_kind(TokenKind::CCall) || self.match_kind(TokenKind::StdCall);
            self.match_kind(TokenKind::Identifier) && self.check(TokenKind::OpenParen)
        };
        self.rewind(start);

        if is_function {
            Member::Function(self.parse_function_declaration())
        } else {
            Member::Global(self.parse_global_variable())
        }
    }

    fn parse_function_declaration(&mut self) -> FunctionDeclaration {
        let mut private = false;
        let mut exported = false;
        loop {
            if self.match_kind(TokenKind::Private) {
                private = true;
            } else if self.match_kind(TokenKind::Export) {
                exported = true;
            } else {
                break;
            }
        }

        let return_type = self.parse_type();
        let convention = self.parse_calling_convention();
        let name = self.expect_identifier();
        let params = self.parse_parameter_list();
        let body = self.parse_block();

        FunctionDeclaration {
            return_type,
            name,
            params,
            convention,
            private,
            exported,
            body,
        }
    }

    fn parse_function_hint(&mut self) -> FunctionHint {
        self.expect(TokenKind::Hint);
        let return_type = self.parse_type();
        let convention = self.parse_calling_convention();
        let name = self.expect_identifier();
        let params = self.parse_parameter_list();
        self.expect(TokenKind::Semicolon);

        FunctionHint {
            return_type,
            name,
            params,
            convention,
        }
    }

    fn parse_extern_declaration(&mut self) -> ExternDeclaration {
        self.expect(TokenKind::Extern);
        let return_type = self.parse_type();
        let convention = self.parse_calling_convention();
        let name = self.expect_identifier();
        let params = self.parse_parameter_list();
        self.expect(TokenKind::Semicolon);

        ExternDeclaration {
            return_type,
            name,
            params,
            convention,
        }
    }

    fn parse_calling_convention(&mut self) -> CallingConvention {
        if self.match_kind(TokenKind::StdCall) {
            CallingConvention::StdCall
        } else {
            // `ccall` may be written out; it is also the default.
            self.match_kind(TokenKind::CCall);
            CallingConvention::CCall
        }
    }

    fn parse_parameter_list(&mut self) -> Vec<Parameter> {
        self.expect(TokenKind::OpenParen);
        let mut params = Vec::new();

        // `(void)` declares an empty parameter list.
        if self.check(TokenKind::Void) && self.peek_ahead(1).is(TokenKind::CloseParen) {
            self.advance();
        } else if !self.check(TokenKind::CloseParen) {
            loop {
                if self.check(TokenKind::EndOfFile) {
                    let found = self.peek().clone();
                    self.diagnostics
                        .report_error(&found, "unexpected end of file in parameter list");
                    break;
                }

                let param_type = self.parse_type();
                let name = self.expect_identifier();
                params.push(Parameter { param_type, name });

                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::CloseParen);
        params
    }

    fn parse_struct_declaration(&mut self) -> StructDeclaration {
        let keyword = self.expect(TokenKind::Struct);
        let name = self.expect_identifier();

        // Register before the fields parse so members may point at the
        // struct being declared.
        self.register_type_name(name.lexeme.clone());

        self.expect(TokenKind::OpenBrace);
        let mut fields = Vec::new();
        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::EndOfFile) {
            let start = self.position;

            let field_type = self.parse_type();
            let field_name = self.expect_identifier();
            self.expect(TokenKind::Semicolon);
            fields.push(FieldDeclaration {
                field_type,
                name: field_name,
            });

            if self.position == start {
                self.advance();
            }
        }
        self.expect(TokenKind::CloseBrace);
        self.expect(TokenKind::Semicolon);

        StructDeclaration {
            keyword,
            name,
            fields,
        }
    }

    pub(crate) fn parse_global_variable(&mut self) -> VariableDeclaration {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticBag;
    use crate::parser::ast::CompilationUnit;
    use crate::parser::lexer::Lexer;

    fn parse(source: &str) -> (CompilationUnit, DiagnosticBag) {
        let mut diagnostics = DiagnosticBag::new();
        let tokens = Lexer::new(source, "test.mi".into()).tokenize(&mut diagnostics);
        let unit = Parser::new(tokens, &mut diagnostics).parse_compilation_unit();
        (unit, diagnostics)
    }

    #[test]
    fn test_function_declaration() {
        let (unit, diagnostics) = parse("int add(int a, int b) { return a + b; }");
        assert!(!diagnostics.has_errors());
        assert_eq!(unit.members.len(), 1);

        match &unit.members[0] {
            Member::Function(func) => {
                assert_eq!(func.name.lexeme, "add");
                assert_eq!(func.params.len(), 2);
                assert_eq!(func.convention, CallingConvention::CCall);
                assert!(!func.private);
            }
            other => panic!("expected a function, got {:?}", other),
        }
    }

    #[test]
    fn test_function_vs_global_dispatch() {
        let (unit, diagnostics) = parse("int counter = 0;\nint get() { return counter; }");
        assert!(!diagnostics.has_errors());
        assert!(matches!(unit.members[0], Member::Global(_)));
        assert!(matches!(unit.members[1], Member::Function(_)));
    }

    #[test]
    fn test_pointer_return_type_dispatch() {
        // The speculative type parse must skip the stars before checking
        // for the parenthesis.
        let (unit, diagnostics) = parse("char* name() { return \"mica\"; }");
        assert!(!diagnostics.has_errors());
        assert!(matches!(unit.members[0], Member::Function(_)));
    }

    #[test]
    fn test_hint_and_extern() {
        let (unit, diagnostics) = parse(
            "hint int helper(int x);\nextern void puts(char* s);\nint helper(int x) { return x; }",
        );
        assert!(!diagnostics.has_errors());
        assert!(matches!(unit.members[0], Member::Hint(_)));
        assert!(matches!(unit.members[1], Member::Extern(_)));
        assert!(matches!(unit.members[2], Member::Function(_)));
    }

    #[test]
    fn test_stdcall_and_linkage_modifiers() {
        let (unit, diagnostics) =
            parse("private export int stdcall callback(int code) { return code; }");
        assert!(!diagnostics.has_errors());
        match &unit.members[0] {
            Member::Function(func) => {
                assert_eq!(func.convention, CallingConvention::StdCall);
                assert!(func.private);
                assert!(func.exported);
            }
            other => panic!("expected a function, got {:?}", other),
        }
    }

    #[test]
    fn test_struct_declaration_registers_type() {
        let (unit, diagnostics) = parse(
            "struct Node { int value; Node* next; };\nNode* head() { return null; }",
        );
        assert!(!diagnostics.has_errors());
        match &unit.members[0] {
            Member::Struct(decl) => {
                assert_eq!(decl.name.lexeme, "Node");
                assert_eq!(decl.fields.len(), 2);
                assert_eq!(decl.fields[1].field_type.pointer_depth, 1);
            }
            other => panic!("expected a struct, got {:?}", other),
        }
        assert!(matches!(unit.members[1], Member::Function(_)));
    }

    #[test]
    fn test_void_parameter_list() {
        let (unit, diagnostics) = parse("int zero(void) { return 0; }");
        assert!(!diagnostics.has_errors());
        match &unit.members[0] {
            Member::Function(func) => assert!(func.params.is_empty()),
            other => panic!("expected a function, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_member_still_terminates() {
        let (_, diagnostics) = parse("???\nint ok() { return 1; }");
        assert!(diagnostics.has_errors());
    }
}
