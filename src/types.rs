//! # Type Registry
//!
//! A small reflective type system for composite records.
//!
//! Records are declared by name, then given fields and methods. A field may
//! be *embedded* (anonymously composed): it carries no name of its own, is
//! named after its type, and promotes the embedded record's methods to the
//! enclosing record (see [`method_set`](crate::method_set)).
//!
//! ## Identity
//!
//! - Every type is an arena entry addressed by a [`TypeId`].
//! - Reference types are interned: `pointer_to(t)` always yields the same id,
//!   so `*T == *T` is plain id equality.
//! - Builtins (`bool`, `int`, `float64`, `string`, `error`) sit at fixed ids.
//!
//! ## Lifecycle
//!
//! The table is built mutably and then shared behind an `Arc`. Records may be
//! forward-declared, which is how mutually composing records are expressed:
//!
//! ```
//! use embed_reflect::types::{Field, TypeTable};
//!
//! let mut types = TypeTable::new();
//! let a = types.declare_record("pkg", "A");
//! let b = types.declare_record("pkg", "B");
//! let (pa, pb) = (types.pointer_to(a), types.pointer_to(b));
//! types.set_fields(a, [Field::embedded(pb)]).unwrap();
//! types.set_fields(b, [Field::embedded(pa)]).unwrap();
//! assert_eq!(types.type_name(pa), "*pkg.A");
//! ```

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::arena::{Arena, Id, Interner, Symbol};
use crate::error::{DefineError, ValueError};
use crate::value::{Layout, Receiver, RecordValue, Ref, Slot, Value};

pub type TypeId = Id<TypeDesc>;

pub const BOOL: TypeId = Id::from_raw(0);
pub const INT: TypeId = Id::from_raw(1);
pub const FLOAT: TypeId = Id::from_raw(2);
pub const STRING: TypeId = Id::from_raw(3);
/// The builtin `error` interface.
pub const ERROR: TypeId = Id::from_raw(4);

// =============================================================================
// Descriptors
// =============================================================================

#[derive(Debug)]
pub struct TypeDesc {
    pub pkg: Option<Symbol>,
    pub name: Symbol,
    pub kind: TypeKind,
}

#[derive(Debug)]
pub enum TypeKind {
    Bool,
    Int,
    Float,
    String,
    /// Opaque capability type. Never expanded by the tree builder.
    Interface,
    Record(RecordDef),
    /// Reference to the element type (`*T`).
    Ref(TypeId),
}

/// Coarse classification used for assignability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Bool,
    Int,
    Float,
    String,
    Error,
    Interface,
    Record,
    Ref,
}

impl TypeClass {
    /// Whether `value` may be stored in a slot of type `ty` of this class.
    pub fn accepts(self, ty: TypeId, value: &Value) -> bool {
        match (self, value) {
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::String, Value::Str(_))
            | (Self::Error, Value::Error(_) | Value::Nil) => true,
            // Interfaces are opaque; no method-set check is possible.
            (Self::Interface, _) => true,
            (Self::Record, Value::Record(r)) => r.ty() == ty,
            (Self::Ref, Value::Ref(r)) => r.ty() == ty,
            _ => false,
        }
    }
}

/// How a method receives its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverKind {
    /// Shared access; mutations are not observable by the caller.
    Value,
    /// Exclusive access to the record in place.
    Ref,
}

pub type MethodFn = Arc<dyn Fn(Receiver<'_>, &[Value]) -> Vec<Value> + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: Symbol,
    pub ty: TypeId,
    pub embedded: bool,
}

pub struct MethodDef {
    pub name: Symbol,
    pub receiver: ReceiverKind,
    /// Parameters, receiver excluded.
    pub inputs: SmallVec<[TypeId; 4]>,
    pub outputs: SmallVec<[TypeId; 2]>,
    pub(crate) body: MethodFn,
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("receiver", &self.receiver)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct RecordDef {
    fields: Vec<FieldDef>,
    fields_set: bool,
    methods: Vec<MethodDef>,
    layout: Arc<Layout>,
}

impl RecordDef {
    /// Fields in declaration order.
    #[inline]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Methods declared directly on this record, in declaration order.
    #[inline]
    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }
}

// =============================================================================
// Declaration builders
// =============================================================================

/// Field declaration passed to [`TypeTable::set_fields`].
#[derive(Debug, Clone)]
pub struct Field {
    name: Option<String>,
    ty: TypeId,
}

impl Field {
    pub fn named(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }

    /// Anonymous composition; the field takes its type's base name.
    pub fn embedded(ty: TypeId) -> Self {
        Self { name: None, ty }
    }
}

/// Method declaration passed to [`TypeTable::add_method`].
pub struct MethodDecl {
    name: String,
    receiver: ReceiverKind,
    inputs: SmallVec<[TypeId; 4]>,
    outputs: SmallVec<[TypeId; 2]>,
    body: MethodFn,
}

impl MethodDecl {
    pub fn new<F>(name: impl Into<String>, receiver: ReceiverKind, body: F) -> Self
    where
        F: Fn(Receiver<'_>, &[Value]) -> Vec<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            receiver,
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
            body: Arc::new(body),
        }
    }

    pub fn input(mut self, ty: TypeId) -> Self {
        self.inputs.push(ty);
        self
    }

    pub fn output(mut self, ty: TypeId) -> Self {
        self.outputs.push(ty);
        self
    }
}

// =============================================================================
// Table
// =============================================================================

#[derive(Debug)]
pub struct TypeTable {
    types: Arena<TypeDesc>,
    names: Interner,
    refs: FxHashMap<TypeId, TypeId>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    /// Creates a table holding only the builtin types.
    pub fn new() -> Self {
        let mut table = Self {
            types: Arena::new(),
            names: Interner::new(),
            refs: FxHashMap::default(),
        };
        for (name, kind) in [
            ("bool", TypeKind::Bool),
            ("int", TypeKind::Int),
            ("float64", TypeKind::Float),
            ("string", TypeKind::String),
            ("error", TypeKind::Interface),
        ] {
            let name = table.names.intern(name);
            table.types.alloc(TypeDesc {
                pkg: None,
                name,
                kind,
            });
        }
        debug_assert_eq!(table.types.len(), ERROR.to_usize() + 1);
        table
    }

    /// Declares a record with no fields and no methods yet.
    ///
    /// Its reference type is interned immediately.
    pub fn declare_record(&mut self, pkg: &str, name: &str) -> TypeId {
        let pkg_sym = self.names.intern(pkg);
        let name_sym = self.names.intern(name);
        let record = self.types.next_id();
        let ref_ty = Id::from_raw(record.raw() + 1);
        let layout = Arc::new(Layout::new(record, ref_ty, format!("{pkg}.{name}"), Vec::new()));
        self.types.alloc(TypeDesc {
            pkg: Some(pkg_sym),
            name: name_sym,
            kind: TypeKind::Record(RecordDef {
                fields: Vec::new(),
                fields_set: false,
                methods: Vec::new(),
                layout,
            }),
        });
        let interned = self.pointer_to(record);
        debug_assert_eq!(interned, ref_ty);
        record
    }

    /// Declares an opaque interface type.
    pub fn declare_interface(&mut self, pkg: &str, name: &str) -> TypeId {
        let pkg = self.names.intern(pkg);
        let name = self.names.intern(name);
        self.types.alloc(TypeDesc {
            pkg: Some(pkg),
            name,
            kind: TypeKind::Interface,
        })
    }

    /// Returns the interned reference type `*ty`.
    pub fn pointer_to(&mut self, ty: TypeId) -> TypeId {
        if let Some(&existing) = self.refs.get(&ty) {
            return existing;
        }
        let name = self.types[ty].name;
        let id = self.types.alloc(TypeDesc {
            pkg: None,
            name,
            kind: TypeKind::Ref(ty),
        });
        self.refs.insert(ty, id);
        id
    }

    /// Looks up `*ty` without creating it. Always `Some` for records.
    #[inline]
    pub fn ref_of(&self, ty: TypeId) -> Option<TypeId> {
        self.refs.get(&ty).copied()
    }

    /// Sets the fields of `record`, in declaration order. Allowed once.
    pub fn set_fields(
        &mut self,
        record: TypeId,
        fields: impl IntoIterator<Item = Field>,
    ) -> Result<(), DefineError> {
        let ty_name = self.type_name(record);
        match self.record(record) {
            None => return Err(DefineError::NotARecord { ty: ty_name }),
            Some(def) if def.fields_set => {
                return Err(DefineError::FieldsAlreadySet { ty: ty_name });
            }
            Some(_) => {}
        }

        let mut defs: Vec<FieldDef> = Vec::new();
        for field in fields {
            let embedded = field.name.is_none();
            if embedded {
                let ok = match self.kind(field.ty) {
                    TypeKind::Record(_) | TypeKind::Interface => true,
                    TypeKind::Ref(elem) => matches!(self.kind(*elem), TypeKind::Record(_)),
                    _ => false,
                };
                if !ok {
                    return Err(DefineError::InvalidEmbedding {
                        ty: ty_name,
                        field: self.type_name(field.ty),
                    });
                }
            }
            let name = match field.name {
                Some(name) => self.names.intern(&name),
                None => self.types[self.deref(field.ty)].name,
            };
            if defs.iter().any(|d| d.name == name) || self.has_method(record, name) {
                return Err(DefineError::DuplicateMember {
                    ty: ty_name,
                    name: self.names.resolve(name).to_owned(),
                });
            }
            if field.ty == record || self.contains_by_value(field.ty, record) {
                return Err(DefineError::RecursiveValue { ty: ty_name });
            }
            defs.push(FieldDef {
                name,
                ty: field.ty,
                embedded,
            });
        }

        let slots: Vec<Slot> = defs
            .iter()
            .map(|d| Slot {
                name: self.names.resolve(d.name).into(),
                ty: d.ty,
                ty_name: self.type_name(d.ty).into(),
                class: self.class(d.ty),
            })
            .collect();
        let ref_ty = self.ref_of(record).unwrap_or(record);
        let layout = Arc::new(Layout::new(record, ref_ty, ty_name, slots));

        if let TypeKind::Record(def) = &mut self.types[record].kind {
            def.fields = defs;
            def.fields_set = true;
            def.layout = layout;
        }
        Ok(())
    }

    /// Declares a method on `record`.
    pub fn add_method(&mut self, record: TypeId, decl: MethodDecl) -> Result<(), DefineError> {
        let ty_name = self.type_name(record);
        let name = self.names.intern(&decl.name);
        let Some(def) = self.record(record) else {
            return Err(DefineError::NotARecord { ty: ty_name });
        };
        let taken = def.fields.iter().any(|f| f.name == name) || self.has_method(record, name);
        if taken {
            return Err(DefineError::DuplicateMember {
                ty: ty_name,
                name: decl.name,
            });
        }
        if let TypeKind::Record(def) = &mut self.types[record].kind {
            def.methods.push(MethodDef {
                name,
                receiver: decl.receiver,
                inputs: decl.inputs,
                outputs: decl.outputs,
                body: decl.body,
            });
        }
        Ok(())
    }

    fn has_method(&self, record: TypeId, name: Symbol) -> bool {
        self.record(record)
            .is_some_and(|def| def.methods.iter().any(|m| m.name == name))
    }

    /// Whether `outer` holds `needle` inline, at any depth.
    ///
    /// Terminates because value containment is kept acyclic by `set_fields`.
    fn contains_by_value(&self, outer: TypeId, needle: TypeId) -> bool {
        let Some(def) = self.record(outer) else {
            return false;
        };
        def.fields
            .iter()
            .any(|f| f.ty == needle || self.contains_by_value(f.ty, needle))
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    #[inline]
    pub fn desc(&self, ty: TypeId) -> &TypeDesc {
        &self.types[ty]
    }

    #[inline]
    pub fn kind(&self, ty: TypeId) -> &TypeKind {
        &self.types[ty].kind
    }

    /// Record definition of `ty`, if `ty` is a record (not a reference).
    #[inline]
    pub fn record(&self, ty: TypeId) -> Option<&RecordDef> {
        match self.kind(ty) {
            TypeKind::Record(def) => Some(def),
            _ => None,
        }
    }

    /// Element type of a reference type.
    #[inline]
    pub fn elem(&self, ty: TypeId) -> Option<TypeId> {
        match self.kind(ty) {
            TypeKind::Ref(elem) => Some(*elem),
            _ => None,
        }
    }

    /// Strips one level of reference.
    #[inline]
    pub fn deref(&self, ty: TypeId) -> TypeId {
        self.elem(ty).unwrap_or(ty)
    }

    /// The record behind `ty` when `ty` is a record or a reference to one.
    pub fn deref_record(&self, ty: TypeId) -> Option<TypeId> {
        let base = self.deref(ty);
        self.record(base).map(|_| base)
    }

    pub fn class(&self, ty: TypeId) -> TypeClass {
        match self.kind(ty) {
            TypeKind::Bool => TypeClass::Bool,
            TypeKind::Int => TypeClass::Int,
            TypeKind::Float => TypeClass::Float,
            TypeKind::String => TypeClass::String,
            TypeKind::Interface if ty == ERROR => TypeClass::Error,
            TypeKind::Interface => TypeClass::Interface,
            TypeKind::Record(_) => TypeClass::Record,
            TypeKind::Ref(_) => TypeClass::Ref,
        }
    }

    #[inline]
    pub fn assignable(&self, value: &Value, ty: TypeId) -> bool {
        self.class(ty).accepts(ty, value)
    }

    /// Qualified display name: `int`, `pkg.T`, `*pkg.T`.
    pub fn type_name(&self, ty: TypeId) -> String {
        let desc = &self.types[ty];
        match (&desc.kind, desc.pkg) {
            (TypeKind::Ref(elem), _) => format!("*{}", self.type_name(*elem)),
            (_, Some(pkg)) => format!(
                "{}.{}",
                self.names.resolve(pkg),
                self.names.resolve(desc.name)
            ),
            (_, None) => self.names.resolve(desc.name).to_owned(),
        }
    }

    /// Display name of the dynamic type of `value`.
    pub fn value_type_name(&self, value: &Value) -> String {
        match value {
            Value::Bool(_) => self.type_name(BOOL),
            Value::Int(_) => self.type_name(INT),
            Value::Float(_) => self.type_name(FLOAT),
            Value::Str(_) => self.type_name(STRING),
            Value::Error(_) => self.type_name(ERROR),
            Value::Nil => "nil".to_owned(),
            Value::Record(r) => self.type_name(r.ty()),
            Value::Ref(r) => self.type_name(r.ty()),
        }
    }

    #[inline]
    pub fn resolve(&self, sym: Symbol) -> &str {
        self.names.resolve(sym)
    }

    /// Symbol of an already interned name.
    #[inline]
    pub fn symbol(&self, name: &str) -> Option<Symbol> {
        self.names.get(name)
    }

    // -------------------------------------------------------------------------
    // Values
    // -------------------------------------------------------------------------

    /// Zero value of `ty`: records are zeroed recursively, references are nil.
    pub fn zero(&self, ty: TypeId) -> Value {
        match self.kind(ty) {
            TypeKind::Bool => Value::Bool(false),
            TypeKind::Int => Value::Int(0),
            TypeKind::Float => Value::Float(0.0),
            TypeKind::String => Value::Str(String::new()),
            TypeKind::Interface => Value::Nil,
            TypeKind::Record(def) => Value::Record(self.zero_of(def)),
            TypeKind::Ref(_) => Value::Ref(Ref::nil(ty)),
        }
    }

    fn zero_of(&self, def: &RecordDef) -> RecordValue {
        let fields = def.fields.iter().map(|f| self.zero(f.ty)).collect();
        RecordValue::from_parts(Arc::clone(&def.layout), fields)
    }

    /// Zero record of type `record`.
    pub fn zero_record(&self, record: TypeId) -> Result<RecordValue, ValueError> {
        self.record(record)
            .map(|def| self.zero_of(def))
            .ok_or_else(|| ValueError::NotARecord {
                ty: self.type_name(record),
            })
    }

    /// A fresh zero record behind a new reference.
    pub fn instance(&self, record: TypeId) -> Result<Value, ValueError> {
        Ok(self.zero_record(record)?.into_ref())
    }

    /// A nil reference to `record`.
    pub fn nil_ref(&self, record: TypeId) -> Result<Value, ValueError> {
        match self.ref_of(record) {
            Some(ref_ty) if self.record(record).is_some() => Ok(Value::Ref(Ref::nil(ref_ty))),
            _ => Err(ValueError::NotARecord {
                ty: self.type_name(record),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> MethodDecl {
        MethodDecl::new("Noop", ReceiverKind::Value, |_, _| Vec::new())
    }

    #[test]
    fn builtins_have_fixed_ids_and_names() {
        let t = TypeTable::new();
        assert_eq!(t.type_name(BOOL), "bool");
        assert_eq!(t.type_name(INT), "int");
        assert_eq!(t.type_name(FLOAT), "float64");
        assert_eq!(t.type_name(STRING), "string");
        assert_eq!(t.type_name(ERROR), "error");
        assert_eq!(t.class(ERROR), TypeClass::Error);
    }

    #[test]
    fn reference_types_are_interned() {
        let mut t = TypeTable::new();
        let a = t.declare_record("pkg", "A");
        let pa = t.pointer_to(a);
        assert_eq!(t.pointer_to(a), pa);
        assert_eq!(t.ref_of(a), Some(pa));
        assert_eq!(t.elem(pa), Some(a));
        assert_eq!(t.type_name(pa), "*pkg.A");
        assert_eq!(t.deref_record(pa), Some(a));
        assert_eq!(t.deref_record(INT), None);
    }

    #[test]
    fn embedded_fields_are_named_after_their_type() {
        let mut t = TypeTable::new();
        let outer = t.declare_record("pkg", "Outer");
        let inner = t.declare_record("pkg", "Inner");
        let p_inner = t.pointer_to(inner);
        t.set_fields(outer, [Field::named("Name", STRING), Field::embedded(p_inner)])
            .unwrap();
        let def = t.record(outer).unwrap();
        assert_eq!(t.resolve(def.fields()[1].name), "Inner");
        assert!(def.fields()[1].embedded);
        assert!(!def.fields()[0].embedded);
    }

    #[test]
    fn rejects_value_recursion() {
        let mut t = TypeTable::new();
        let a = t.declare_record("pkg", "A");
        let b = t.declare_record("pkg", "B");
        t.set_fields(a, [Field::embedded(b)]).unwrap();
        let err = t.set_fields(b, [Field::embedded(a)]).unwrap_err();
        assert_eq!(err, DefineError::RecursiveValue { ty: "pkg.B".into() });

        let c = t.declare_record("pkg", "C");
        let err = t.set_fields(c, [Field::named("Me", c)]).unwrap_err();
        assert!(matches!(err, DefineError::RecursiveValue { .. }));
    }

    #[test]
    fn rejects_duplicate_members_and_double_definition() {
        let mut t = TypeTable::new();
        let a = t.declare_record("pkg", "A");
        t.add_method(a, noop()).unwrap();
        assert!(matches!(
            t.add_method(a, noop()),
            Err(DefineError::DuplicateMember { .. })
        ));
        assert!(matches!(
            t.set_fields(a, [Field::named("Noop", INT)]),
            Err(DefineError::DuplicateMember { .. })
        ));
        t.set_fields(a, [Field::named("X", INT)]).unwrap();
        assert!(matches!(
            t.set_fields(a, [Field::named("Y", INT)]),
            Err(DefineError::FieldsAlreadySet { .. })
        ));
        assert!(matches!(
            t.add_method(INT, noop()),
            Err(DefineError::NotARecord { .. })
        ));
    }

    #[test]
    fn rejects_scalar_embedding() {
        let mut t = TypeTable::new();
        let a = t.declare_record("pkg", "A");
        assert_eq!(
            t.set_fields(a, [Field::embedded(INT)]),
            Err(DefineError::InvalidEmbedding {
                ty: "pkg.A".into(),
                field: "int".into()
            })
        );
    }

    #[test]
    fn zero_values_nest_records_and_nil_references() {
        let mut t = TypeTable::new();
        let outer = t.declare_record("pkg", "Outer");
        let inner = t.declare_record("pkg", "Inner");
        let p_inner = t.pointer_to(inner);
        t.set_fields(inner, [Field::named("N", INT)]).unwrap();
        t.set_fields(
            outer,
            [
                Field::named("Label", STRING),
                Field::embedded(inner),
                Field::named("Next", p_inner),
            ],
        )
        .unwrap();

        let zero = t.zero_record(outer).unwrap();
        assert_eq!(zero.get("Label"), Some(&Value::Str(String::new())));
        let nested = zero.get("Inner").and_then(Value::as_record).unwrap();
        assert_eq!(nested.get("N"), Some(&Value::Int(0)));
        assert!(zero.get("Next").and_then(Value::as_reference).unwrap().is_nil());
        assert!(t.zero_record(INT).is_err());
    }
}
