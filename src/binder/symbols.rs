//! Symbols: the named entities declarations introduce
//!
//! Variables carry a resolved type; functions additionally carry their
//! parameter list, calling convention and linkage flags. Stack offsets are
//! deliberately absent — they are assigned during emission, which is the
//! only stage that knows emission order and frame layout.

use crate::binder::types::Ty;
use crate::parser::ast::CallingConvention;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// A named storage location: local, parameter or global.
#[derive(Debug, PartialEq)]
pub struct VariableSymbol {
    pub name: String,
    pub ty: Ty,
    /// Globals are addressed by name; everything else through the frame
    /// pointer.
    pub global: bool,
}

impl VariableSymbol {
    pub fn local(name: impl Into<String>, ty: Ty) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            ty,
            global: false,
        })
    }

    pub fn global(name: impl Into<String>, ty: Ty) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            ty,
            global: true,
        })
    }
}

/// A function's declared shape, shared by hints, externs and definitions.
#[derive(Debug, PartialEq)]
pub struct FunctionSymbol {
    pub name: String,
    pub return_ty: Ty,
    pub params: Vec<(String, Ty)>,
    pub convention: CallingConvention,
    /// Not `.global` in the emitted assembly.
    pub private: bool,
    /// Listed in the export directive section.
    pub exported: bool,
    /// Declared `extern`: defined outside this unit, no body emitted.
    pub imported: bool,
    /// A body exists in this unit (false for hints and externs).
    pub defined: bool,
}

impl FunctionSymbol {
    /// Total parameter bytes, as used by stdcall name decoration and
    /// callee cleanup. Every parameter occupies a full stack word.
    pub fn param_bytes(&self) -> u32 {
        self.params.len() as u32 * 4
    }

    /// Do two declarations of the same name agree?
    pub fn signature_matches(&self, other: &FunctionSymbol) -> bool {
        self.return_ty.same_as(&other.return_ty)
            && self.convention == other.convention
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|((_, a), (_, b))| a.same_as(b))
    }
}

/// One field of a struct layout, with its byte offset from the start.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    pub name: String,
    pub ty: Ty,
    pub offset: u32,
}

/// A declared struct: ordered fields with assigned offsets.
#[derive(Debug, PartialEq)]
pub struct StructLayout {
    pub name: String,
    pub fields: Vec<FieldLayout>,
    pub size: u32,
}

impl StructLayout {
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// All struct layouts of one compilation unit, by name.
#[derive(Debug, Default)]
pub struct StructRegistry {
    layouts: FxHashMap<String, Rc<StructLayout>>,
}

impl StructRegistry {
    pub fn get(&self, name: &str) -> Option<&Rc<StructLayout>> {
        self.layouts.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layouts.contains_key(name)
    }

    pub fn insert(&mut self, layout: StructLayout) -> Rc<StructLayout> {
        let rc = Rc::new(layout);
        self.layouts.insert(rc.name.clone(), Rc::clone(&rc));
        rc
    }
}
