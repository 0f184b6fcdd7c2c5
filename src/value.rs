//! Live values of registered types.
//!
//! Records hold their fields inline. A reference is a type tag plus an
//! optional shared [`Instance`]; a nil reference is simply `None`, so reaching
//! through one is an ordinary, checked outcome.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::ValueError;
use crate::types::{TypeClass, TypeId};

/// Shared, lockable record storage behind a reference.
pub type Instance = Arc<RwLock<RecordValue>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A value of the builtin `error` interface.
    Error(String),
    /// A nil interface value.
    Nil,
    Record(RecordValue),
    Ref(Ref),
}

impl Value {
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text of a string or an error value.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::Error(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_record(&self) -> Option<&RecordValue> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    #[inline]
    pub fn as_reference(&self) -> Option<&Ref> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<RecordValue> for Value {
    fn from(v: RecordValue) -> Self {
        Self::Record(v)
    }
}

impl From<Ref> for Value {
    fn from(v: Ref) -> Self {
        Self::Ref(v)
    }
}

// =============================================================================
// Records
// =============================================================================

/// Field slot of a record layout.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) name: Box<str>,
    pub(crate) ty: TypeId,
    pub(crate) ty_name: Box<str>,
    pub(crate) class: TypeClass,
}

/// Field layout shared by every value of one record type.
#[derive(Debug)]
pub(crate) struct Layout {
    record: TypeId,
    ref_ty: TypeId,
    name: Box<str>,
    slots: Box<[Slot]>,
}

impl Layout {
    pub(crate) fn new(record: TypeId, ref_ty: TypeId, name: String, slots: Vec<Slot>) -> Self {
        Self {
            record,
            ref_ty,
            name: name.into(),
            slots: slots.into(),
        }
    }
}

#[derive(Clone)]
pub struct RecordValue {
    layout: Arc<Layout>,
    fields: Vec<Value>,
}

impl RecordValue {
    pub(crate) fn from_parts(layout: Arc<Layout>, fields: Vec<Value>) -> Self {
        debug_assert_eq!(layout.slots.len(), fields.len());
        Self { layout, fields }
    }

    /// Record type of this value.
    #[inline]
    pub fn ty(&self) -> TypeId {
        self.layout.record
    }

    /// Qualified record name, e.g. `pkg.T`.
    #[inline]
    pub fn type_name(&self) -> &str {
        &self.layout.name
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.layout.slots.iter().map(|s| &*s.name)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.layout.slots.iter().position(|s| &*s.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    /// Mutable access to a field. Assigning a value of another type through
    /// this reference is not checked; prefer [`set`](Self::set).
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.index_of(name).map(|i| &mut self.fields[i])
    }

    /// Field by declaration index.
    #[inline]
    pub fn field(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    #[inline]
    pub(crate) fn field_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.fields.get_mut(index)
    }

    /// Type-checked field assignment.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ValueError> {
        let value = value.into();
        let Some(index) = self.index_of(name) else {
            return Err(ValueError::UnknownField {
                record: self.layout.name.to_string(),
                field: name.to_owned(),
            });
        };
        let slot = &self.layout.slots[index];
        if !slot.class.accepts(slot.ty, &value) {
            return Err(ValueError::TypeMismatch {
                field: name.to_owned(),
                expected: slot.ty_name.to_string(),
                found: describe(&value),
            });
        }
        self.fields[index] = value;
        Ok(())
    }

    /// Moves this record behind a fresh reference.
    pub fn into_ref(self) -> Value {
        Value::Ref(Ref {
            ty: self.layout.ref_ty,
            target: Some(Arc::new(RwLock::new(self))),
        })
    }
}

impl PartialEq for RecordValue {
    fn eq(&self, other: &Self) -> bool {
        self.layout.record == other.layout.record && self.fields == other.fields
    }
}

impl fmt::Debug for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(&self.layout.name);
        for (slot, value) in self.layout.slots.iter().zip(&self.fields) {
            s.field(&slot.name, value);
        }
        s.finish()
    }
}

/// Short description of a value for mismatch diagnostics.
fn describe(value: &Value) -> String {
    match value {
        Value::Bool(_) => "bool".into(),
        Value::Int(_) => "int".into(),
        Value::Float(_) => "float64".into(),
        Value::Str(_) => "string".into(),
        Value::Error(_) => "error".into(),
        Value::Nil => "nil".into(),
        Value::Record(r) => r.type_name().to_owned(),
        // Not dereferenced: the target may be locked by the caller.
        Value::Ref(_) => "reference".into(),
    }
}

// =============================================================================
// References
// =============================================================================

/// A possibly-nil reference to a record.
#[derive(Clone)]
pub struct Ref {
    ty: TypeId,
    target: Option<Instance>,
}

impl Ref {
    pub(crate) fn nil(ty: TypeId) -> Self {
        Self { ty, target: None }
    }

    /// Reference type (`*T`), not the record type.
    #[inline]
    pub fn ty(&self) -> TypeId {
        self.ty
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        self.target.is_none()
    }

    #[inline]
    pub fn target(&self) -> Option<&Instance> {
        self.target.as_ref()
    }

    /// Shared access to the referenced record. A poisoned lock is recovered:
    /// records carry no invariants a panicking method could break.
    pub fn read(&self) -> Option<RwLockReadGuard<'_, RecordValue>> {
        self.target
            .as_ref()
            .map(|t| t.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Exclusive access to the referenced record.
    pub fn write(&self) -> Option<RwLockWriteGuard<'_, RecordValue>> {
        self.target
            .as_ref()
            .map(|t| t.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether both references point at the same instance.
    pub fn same_instance(&self, other: &Ref) -> bool {
        match (&self.target, &other.target) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Ref {
    /// Identity, not contents: references may form cycles.
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty
            && match (&self.target, &other.target) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(t) => write!(f, "Ref({:?} @ {:p})", self.ty, Arc::as_ptr(t)),
            None => write!(f, "Ref({:?} nil)", self.ty),
        }
    }
}

/// Receiver handed to a method body.
pub enum Receiver<'a> {
    Value(&'a RecordValue),
    Ref(&'a mut RecordValue),
}

impl Receiver<'_> {
    #[inline]
    pub fn record(&self) -> &RecordValue {
        match self {
            Self::Value(r) => *r,
            Self::Ref(r) => &**r,
        }
    }

    /// `None` for value receivers.
    #[inline]
    pub fn record_mut(&mut self) -> Option<&mut RecordValue> {
        match self {
            Self::Value(_) => None,
            Self::Ref(r) => Some(&mut **r),
        }
    }

    /// Shorthand for reading a field of the receiver.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.record().get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, INT, STRING, TypeTable};

    fn point() -> (TypeTable, TypeId) {
        let mut t = TypeTable::new();
        let p = t.declare_record("geo", "Point");
        t.set_fields(p, [Field::named("X", INT), Field::named("Label", STRING)])
            .unwrap();
        (t, p)
    }

    #[test]
    fn set_checks_field_types() {
        let (t, p) = point();
        let mut rec = t.zero_record(p).unwrap();
        rec.set("X", 3i64).unwrap();
        assert_eq!(rec.get("X"), Some(&Value::Int(3)));

        let err = rec.set("X", "three").unwrap_err();
        assert_eq!(
            err,
            ValueError::TypeMismatch {
                field: "X".into(),
                expected: "int".into(),
                found: "string".into(),
            }
        );
        assert!(matches!(
            rec.set("Y", 1i64),
            Err(ValueError::UnknownField { .. })
        ));
        assert_eq!(rec.field_names().collect::<Vec<_>>(), ["X", "Label"]);
    }

    #[test]
    fn references_compare_by_identity() {
        let (t, p) = point();
        let a = t.instance(p).unwrap();
        let b = t.instance(p).unwrap();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);

        let a_ref = a.as_reference().unwrap();
        a_ref.write().unwrap().set("X", 9i64).unwrap();
        assert_eq!(a_ref.read().unwrap().get("X"), Some(&Value::Int(9)));
        assert!(a_ref.same_instance(a.clone().as_reference().unwrap()));

        let nil = t.nil_ref(p).unwrap();
        assert!(nil.as_reference().unwrap().is_nil());
        assert!(nil.as_reference().unwrap().read().is_none());
    }
}
