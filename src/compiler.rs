//! Compilation driver
//!
//! Runs the pipeline — lex, preprocess, parse, bind, emit — with a gate
//! between stages: a stage that produced error diagnostics still returns a
//! structurally complete result, but the driver refuses to feed it to the
//! next stage. Diagnostics are rendered through the `log` facade as they
//! are discovered, stage by stage, together with a per-stage summary.

use crate::binder::binder::bind;
use crate::binder::operators::OperatorTables;
use crate::diagnostics::{DiagnosticBag, Severity};
use crate::emitter::emitter::emit;
use crate::parser::lexer::Lexer;
use crate::parser::parse::Parser;
use crate::parser::preprocessor::Preprocessor;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;
use thiserror::Error;

/// Why a compilation did not produce assembly.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("lexing produced {0} errors")]
    Lex(usize),
    #[error("parsing produced {0} errors")]
    Parse(usize),
    #[error("binding produced {0} errors")]
    Bind(usize),
    #[error("assembler failed with {0}")]
    Assembler(std::process::ExitStatus),
    #[error("failed to run the assembler: {0}")]
    AssemblerSpawn(#[source] std::io::Error),
}

/// Driver configuration.
#[derive(Debug, Default)]
pub struct CompileOptions {
    /// Directories searched by `include` directives, in order.
    pub include_paths: Vec<PathBuf>,
}

pub struct Compiler {
    options: CompileOptions,
    operators: OperatorTables,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            operators: OperatorTables::new(),
        }
    }

    /// Compile one source file to assembly text.
    pub fn compile_file(&self, path: &Path) -> Result<String, CompileError> {
        let source = std::fs::read_to_string(path).map_err(|source| CompileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.compile_source(&source, &path.to_string_lossy())
    }

    /// Compile source text to assembly text. `file` labels diagnostics.
    pub fn compile_source(&self, source: &str, file: &str) -> Result<String, CompileError> {
        let file: Rc<str> = file.into();
        let mut diagnostics = DiagnosticBag::new();

        log::debug!("lexing {}", file);
        let tokens = Lexer::new(source, Rc::clone(&file)).tokenize(&mut diagnostics);
        let mut include_paths = self.options.include_paths.clone();
        if let Some(parent) = Path::new(file.as_ref()).parent() {
            include_paths.insert(0, parent.to_path_buf());
        }
        let tokens = Preprocessor::new(include_paths).process(tokens, &mut diagnostics);
        if let Some(errors) = render_stage(&diagnostics, "lexing", 0) {
            return Err(CompileError::Lex(errors));
        }

        log::debug!("parsing {}", file);
        let rendered = diagnostics.diagnostics().len();
        let unit = Parser::new(tokens, &mut diagnostics).parse_compilation_unit();
        if let Some(errors) = render_stage(&diagnostics, "parsing", rendered) {
            return Err(CompileError::Parse(errors));
        }

        log::debug!("binding {}", file);
        let rendered = diagnostics.diagnostics().len();
        let bound = bind(&unit, &self.operators, &mut diagnostics);
        if let Some(errors) = render_stage(&diagnostics, "binding", rendered) {
            return Err(CompileError::Bind(errors));
        }

        log::debug!("emitting {}", file);
        Ok(emit(&bound))
    }
}

/// Render the diagnostics a stage appended and log its summary. Returns
/// the stage's error count when it must block the next stage.
fn render_stage(diagnostics: &DiagnosticBag, stage: &str, already_rendered: usize) -> Option<usize> {
    let new = &diagnostics.diagnostics()[already_rendered..];
    let mut errors = 0usize;
    let mut warnings = 0usize;
    let mut messages = 0usize;

    for diagnostic in new {
        match diagnostic.severity {
            Severity::Message => {
                messages += 1;
                log::info!("{}", diagnostic);
            }
            Severity::Warning => {
                warnings += 1;
                log::warn!("{}", diagnostic);
            }
            Severity::Error => {
                errors += 1;
                log::error!("{}", diagnostic);
            }
        }
    }

    if errors > 0 {
        log::info!(
            "{} failed with {} errors, {} warnings, {} messages",
            stage,
            errors,
            warnings,
            messages
        );
        Some(errors)
    } else {
        log::debug!(
            "{} completed with 0 errors, {} warnings, {} messages",
            stage,
            warnings,
            messages
        );
        None
    }
}

/// Hand the emitted assembly to the system toolchain.
pub fn assemble(assembly_path: &Path, object_path: &Path) -> Result<(), CompileError> {
    let status = Command::new("cc")
        .arg("-m32")
        .arg("-c")
        .arg(assembly_path)
        .arg("-o")
        .arg(object_path)
        .status()
        .map_err(CompileError::AssemblerSpawn)?;

    if status.success() {
        Ok(())
    } else {
        Err(CompileError::Assembler(status))
    }
}
