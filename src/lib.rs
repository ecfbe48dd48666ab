//! # Introduction
//!
//! micac compiles Mica, a small C-like systems language, into i686
//! assembly text (AT&T syntax) suitable for a standard assembler.
//!
//! ## Compilation pipeline
//!
//! ```text
//! Source → Lexer → Preprocessor → Parser → Binder → Emitter → Assembly
//! ```
//!
//! 1. [`parser`] — tokenises the source, expands preprocessor directives
//!    and builds a syntax tree with full error recovery.
//! 2. [`binder`] — resolves names against a lexical scope chain, resolves
//!    operators against fixed tables, checks cast legality and produces a
//!    bound tree with folded constants.
//! 3. [`emitter`] — lowers the bound tree to assembly: register
//!    allocation with spilling, frame layout with a stack high-water
//!    mark, control-flow labels and interned string data.
//! 4. [`compiler`] — the driver tying the stages together, gating each
//!    stage on the previous one's error count.
//!
//! Diagnostics are collected, not thrown: every stage reports all the
//! problems it finds into a [`diagnostics::DiagnosticBag`] and still
//! returns a structurally complete result.
//!
//! ## Supported language
//!
//! Types: `int`, `char`, `bool`, `void`, structs, pointers, with the
//! `mutable` qualifier. Members: functions (with `ccall`/`stdcall`
//! conventions and `private`/`export` linkage), forward-declaration
//! hints, `extern` imports, globals and struct declarations. Control
//! flow: `if`/`else`, `while`, `for`, `break`, `return`. Preprocessor:
//! `include`, `define`, `if`/`ifdef`/`ifndef`/`else`/`endif` in `#`
//! directive lines.

pub mod binder;
pub mod compiler;
pub mod diagnostics;
pub mod emitter;
pub mod parser;
