//! Resolved types and the compatibility relations between them
//!
//! A [`Ty`] is a base type plus a pointer depth and a mutability flag. For
//! depth zero the flag says whether the described location may be written;
//! for pointers it describes the pointee. Three relations cover every
//! check the binder performs: [`Ty::same_as`] (identity),
//! [`Ty::can_implicitly_cast_to`] (assignment and argument passing) and
//! [`Ty::can_cast_to`] (explicit cast expressions).

use crate::binder::symbols::StructRegistry;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseTy {
    Void,
    Bool,
    Char,
    Int,
    /// A declared struct, by name; layouts live in the [`StructRegistry`].
    Struct(Rc<str>),
    /// Produced for unresolvable names and failed operations; compatible
    /// with everything so one error does not cascade.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ty {
    pub base: BaseTy,
    pub pointer_depth: usize,
    pub mutable: bool,
}

impl Ty {
    pub fn new(base: BaseTy) -> Self {
        Self {
            base,
            pointer_depth: 0,
            mutable: false,
        }
    }

    pub fn int() -> Self {
        Ty::new(BaseTy::Int)
    }

    pub fn bool() -> Self {
        Ty::new(BaseTy::Bool)
    }

    pub fn char() -> Self {
        Ty::new(BaseTy::Char)
    }

    pub fn void() -> Self {
        Ty::new(BaseTy::Void)
    }

    pub fn error() -> Self {
        Ty::new(BaseTy::Error)
    }

    pub fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }

    pub fn pointer(mut self) -> Self {
        self.pointer_depth += 1;
        self
    }

    pub fn is_error(&self) -> bool {
        self.base == BaseTy::Error
    }

    pub fn is_pointer(&self) -> bool {
        self.pointer_depth > 0
    }

    pub fn is_void(&self) -> bool {
        self.base == BaseTy::Void && self.pointer_depth == 0
    }

    /// The pointee type; `None` for non-pointers. Mutability carries over
    /// since it describes the pointee.
    pub fn deref(&self) -> Option<Ty> {
        if self.pointer_depth == 0 {
            return None;
        }
        let mut ty = self.clone();
        ty.pointer_depth -= 1;
        Some(ty)
    }

    /// Byte size on the 32-bit target.
    pub fn size(&self, structs: &StructRegistry) -> u32 {
        if self.pointer_depth > 0 {
            return 4;
        }
        match &self.base {
            BaseTy::Void => 0,
            BaseTy::Bool | BaseTy::Char => 1,
            BaseTy::Int => 4,
            BaseTy::Struct(name) => structs.get(name).map(|layout| layout.size).unwrap_or(0),
            BaseTy::Error => 4,
        }
    }

    /// Identical base, pointer depth and mutability.
    pub fn same_as(&self, other: &Ty) -> bool {
        if self.is_error() || other.is_error() {
            return true;
        }
        self.base == other.base
            && self.pointer_depth == other.pointer_depth
            && self.mutable == other.mutable
    }

    /// The relation used for assignment and argument compatibility:
    /// mutability may be dropped but never added, and a `void` pointer
    /// converts to and from any pointer of the same depth.
    pub fn can_implicitly_cast_to(&self, target: &Ty) -> bool {
        if self.is_error() || target.is_error() {
            return true;
        }
        if self.pointer_depth != target.pointer_depth {
            return false;
        }

        let base_ok = self.base == target.base
            || (self.pointer_depth > 0
                && (self.base == BaseTy::Void || target.base == BaseTy::Void));
        base_ok && (self.mutable || !target.mutable)
    }

    /// The relation used for explicit casts: anything the implicit
    /// relation allows, plus any two types of equal byte size.
    pub fn can_cast_to(&self, target: &Ty, structs: &StructRegistry) -> bool {
        if self.can_implicitly_cast_to(target) {
            return true;
        }
        let size = self.size(structs);
        size > 0 && size == target.size(structs)
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mutable {
            write!(f, "mutable ")?;
        }
        match &self.base {
            BaseTy::Void => write!(f, "void")?,
            BaseTy::Bool => write!(f, "bool")?,
            BaseTy::Char => write!(f, "char")?,
            BaseTy::Int => write!(f, "int")?,
            BaseTy::Struct(name) => write!(f, "{}", name)?,
            BaseTy::Error => write!(f, "<error>")?,
        }
        for _ in 0..self.pointer_depth {
            write!(f, "*")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StructRegistry {
        StructRegistry::default()
    }

    #[test]
    fn test_same_as_requires_identical_mutability() {
        assert!(Ty::int().same_as(&Ty::int()));
        assert!(!Ty::int().same_as(&Ty::int().mutable()));
        assert!(!Ty::int().same_as(&Ty::int().pointer()));
    }

    #[test]
    fn test_implicit_cast_drops_mutability() {
        // mutable int* -> int* is fine; the reverse is not.
        let mutable_ptr = Ty::int().mutable().pointer();
        let const_ptr = Ty::int().pointer();

        assert!(mutable_ptr.can_implicitly_cast_to(&const_ptr));
        assert!(!const_ptr.can_implicitly_cast_to(&mutable_ptr));
    }

    #[test]
    fn test_implicit_cast_rejects_base_mismatch() {
        assert!(!Ty::char().can_implicitly_cast_to(&Ty::int()));
        assert!(!Ty::int().pointer().can_implicitly_cast_to(&Ty::int()));
    }

    #[test]
    fn test_void_pointer_converts_both_ways() {
        let null_ty = Ty::void().mutable().pointer();
        let node_ptr = Ty::new(BaseTy::Struct("Node".into())).pointer();

        assert!(null_ty.can_implicitly_cast_to(&node_ptr));
        assert!(node_ptr.can_implicitly_cast_to(&Ty::void().pointer()));
    }

    #[test]
    fn test_explicit_cast_by_size() {
        let structs = registry();
        // int and pointers share a size on this target.
        assert!(Ty::int().can_cast_to(&Ty::char().pointer(), &structs));
        assert!(Ty::char().can_cast_to(&Ty::bool(), &structs));
        // Narrowing has no size match and no implicit relation.
        assert!(!Ty::int().can_cast_to(&Ty::char(), &structs));
    }

    #[test]
    fn test_error_type_is_compatible_with_everything() {
        let structs = registry();
        assert!(Ty::error().same_as(&Ty::int()));
        assert!(Ty::error().can_implicitly_cast_to(&Ty::bool()));
        assert!(Ty::char().can_cast_to(&Ty::error(), &structs));
    }

    #[test]
    fn test_sizes() {
        let structs = registry();
        assert_eq!(Ty::int().size(&structs), 4);
        assert_eq!(Ty::char().size(&structs), 1);
        assert_eq!(Ty::bool().size(&structs), 1);
        assert_eq!(Ty::void().size(&structs), 0);
        assert_eq!(Ty::char().pointer().size(&structs), 4);
    }
}
