//! Method bodies as seen by the linker.
//!
//! The linker never interprets instructions. A body is reduced to the symbols it touches
//! ([`BodyReference`]), each with the IL offset of the referencing instruction so diagnostics
//! can be mapped back to source through [`SequencePoint`]s. A reference may be *guarded* by a
//! constant condition (a feature switch property or field); when that condition becomes a
//! known constant, the branch that can never execute is dropped by
//! [`crate::linker::steps::RemoveUnreachableBlocksStep`].

use strum::{Display, EnumString};

use crate::graph::SymbolRef;

/// How an instruction refers to its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BodyReferenceKind {
    /// `call` / `callvirt` / `ldftn` of a method.
    Call,
    /// `newobj` of a constructor; instantiates the declaring type.
    NewObject,
    /// `ldfld` / `stfld` / `ldsfld` / ... of a field.
    Field,
    /// `ldtoken` / `castclass` / `box` / ... of a type.
    Type,
}

/// A constant condition controlling whether a body reference is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchGuard {
    /// The method (returning a boolean) or field the branch tests.
    pub condition: SymbolRef,
    /// The value of the condition for which the guarded reference executes.
    pub taken_when: bool,
}

/// A symbol referenced from a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyReference {
    /// The operand kind.
    pub kind: BodyReferenceKind,
    /// The referenced symbol.
    pub target: SymbolRef,
    /// IL offset of the referencing instruction.
    pub il_offset: u32,
    /// Optional constant guard around the instruction.
    pub guard: Option<BranchGuard>,
}

impl BodyReference {
    /// Creates an unguarded reference at offset 0.
    pub fn new(kind: BodyReferenceKind, target: SymbolRef) -> Self {
        BodyReference {
            kind,
            target,
            il_offset: 0,
            guard: None,
        }
    }

    /// Sets the IL offset of the referencing instruction.
    #[must_use]
    pub fn at(mut self, il_offset: u32) -> Self {
        self.il_offset = il_offset;
        self
    }

    /// Guards the reference behind a constant condition.
    #[must_use]
    pub fn guarded_by(mut self, condition: SymbolRef, taken_when: bool) -> Self {
        self.guard = Some(BranchGuard {
            condition,
            taken_when,
        });
        self
    }
}

/// What the body currently does.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BodyKind {
    /// The original IL.
    #[default]
    Il,
    /// A substituted body returning a constant (or nothing / default when `None`).
    Stub(Option<String>),
    /// A body that only throws (removed or unreachable code).
    Throw,
}

/// The linker view of a method body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodBody {
    /// The body kind.
    pub kind: BodyKind,
    /// Symbols referenced by the body, in IL order.
    pub references: Vec<BodyReference>,
    /// Whether locals are zero-initialized (`.locals init`).
    pub init_locals: bool,
}

impl MethodBody {
    /// Creates an empty IL body with `init_locals` set, as compilers emit by default.
    #[must_use]
    pub fn new() -> Self {
        MethodBody {
            kind: BodyKind::Il,
            references: Vec::new(),
            init_locals: true,
        }
    }

    /// Appends a reference.
    pub fn push(&mut self, reference: BodyReference) -> &mut Self {
        self.references.push(reference);
        self
    }

    /// Appends a call to `target`.
    pub fn call(&mut self, target: SymbolRef) -> &mut Self {
        self.push(BodyReference::new(BodyReferenceKind::Call, target))
    }

    /// Appends a `newobj` of constructor `target`.
    pub fn new_object(&mut self, target: SymbolRef) -> &mut Self {
        self.push(BodyReference::new(BodyReferenceKind::NewObject, target))
    }

    /// Appends a field access.
    pub fn field(&mut self, target: SymbolRef) -> &mut Self {
        self.push(BodyReference::new(BodyReferenceKind::Field, target))
    }

    /// Appends a type token.
    pub fn type_token(&mut self, target: SymbolRef) -> &mut Self {
        self.push(BodyReference::new(BodyReferenceKind::Type, target))
    }

    /// Replaces the body with a stub; the original references are gone.
    pub fn stub(&mut self, value: Option<String>) {
        self.kind = BodyKind::Stub(value);
        self.references.clear();
    }

    /// Replaces the body with a throwing stub; the original references are gone.
    pub fn throw(&mut self) {
        self.kind = BodyKind::Throw;
        self.references.clear();
    }
}

/// Maps an IL offset to a source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePoint {
    /// Offset in the method's IL stream.
    pub il_offset: u32,
    /// Source document path or URL.
    pub document: String,
    /// Starting line in the source file.
    pub start_line: u32,
    /// Starting column in the source file.
    pub start_column: u32,
}

/// Debug information of a method.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodDebugInformation {
    /// Sequence points ordered by IL offset.
    pub sequence_points: Vec<SequencePoint>,
}

impl MethodDebugInformation {
    /// Returns the sequence point covering `il_offset`: the last one at or before it.
    #[must_use]
    pub fn find_by_il_offset(&self, il_offset: u32) -> Option<&SequencePoint> {
        self.sequence_points
            .iter()
            .filter(|sp| sp.il_offset <= il_offset)
            .max_by_key(|sp| sp.il_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(il_offset: u32, line: u32) -> SequencePoint {
        SequencePoint {
            il_offset,
            document: "Program.cs".to_string(),
            start_line: line,
            start_column: 5,
        }
    }

    #[test]
    fn nearest_preceding_sequence_point() {
        let info = MethodDebugInformation {
            sequence_points: vec![point(0, 10), point(8, 11), point(20, 14)],
        };

        assert_eq!(info.find_by_il_offset(0).unwrap().start_line, 10);
        assert_eq!(info.find_by_il_offset(7).unwrap().start_line, 10);
        assert_eq!(info.find_by_il_offset(8).unwrap().start_line, 11);
        assert_eq!(info.find_by_il_offset(100).unwrap().start_line, 14);
    }

    #[test]
    fn no_sequence_point_before_offset() {
        let info = MethodDebugInformation {
            sequence_points: vec![point(4, 10)],
        };
        assert!(info.find_by_il_offset(2).is_none());
    }

    #[test]
    fn stub_drops_references() {
        let mut body = MethodBody::new();
        body.call(SymbolRef::new("App", "A::B"));
        body.stub(Some("true".to_string()));
        assert!(body.references.is_empty());
        assert_eq!(body.kind, BodyKind::Stub(Some("true".to_string())));
    }
}
