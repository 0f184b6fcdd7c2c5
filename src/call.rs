//! Dependency-injected method invocation.
//!
//! [`TypeTree::call`] finds the receiver of a cataloged method inside a live
//! instance, asks a [`Resolver`] for every argument, and runs the method.
//!
//! The receiver path is the chain of embedded fields from the root to the
//! method's owner node, followed by the promotion path from the owner to the
//! record that declares the method. Every reference crossed on the way must
//! be non-nil; the check happens before the resolver is consulted.
//!
//! The path is walked one reference at a time, each under its own short read
//! lock. The method then runs under a single lock on the last reference
//! crossed, so a path that passes through the same instance twice (mutually
//! composed records) never locks it twice.

use std::sync::{Arc, PoisonError};

use smallvec::SmallVec;

use crate::error::{CallError, ResolveError};
use crate::tree::{MethodId, TypeTree};
use crate::types::{MethodDef, ReceiverKind, TypeId, TypeTable};
use crate::value::{Instance, Receiver, RecordValue, Value};

/// Supplies one argument value per requested type.
pub trait Resolver {
    fn resolve(&mut self, ty: TypeId) -> Result<Value, ResolveError>;
}

impl<F> Resolver for F
where
    F: FnMut(TypeId) -> Result<Value, ResolveError>,
{
    fn resolve(&mut self, ty: TypeId) -> Result<Value, ResolveError> {
        self(ty)
    }
}

/// One embedded field crossed on the way to the receiver.
#[derive(Debug, Clone, Copy)]
struct Step {
    field: u32,
    /// Record expected after stepping in.
    record: TypeId,
}

type Steps = SmallVec<[Step; 8]>;

/// The last reference crossed on the receiver path and the value fields
/// below it.
struct Target {
    instance: Instance,
    record: TypeId,
    inline: Steps,
}

impl TypeTree {
    /// Calls method `id` on `instance`, a reference to a record of the root type.
    ///
    /// Returns exactly as many values as the method declares outputs.
    #[tracing::instrument(level = "debug", skip_all, fields(method = tracing::field::Empty))]
    pub fn call<R>(
        &self,
        instance: &Value,
        id: MethodId,
        resolver: &mut R,
    ) -> Result<Vec<Value>, CallError>
    where
        R: Resolver + ?Sized,
    {
        let types: &TypeTable = self.types();
        let Some(entry) = self.get_method(id) else {
            return Err(CallError::UnknownMethod {
                index: id.to_usize(),
                root: types.type_name(self.root_type()),
            });
        };
        let method_name = || self.method_name(id);
        tracing::Span::current().record("method", tracing::field::display(method_name()));

        let root = match instance {
            Value::Ref(r) if r.ty() == self.root_type() => r,
            other => {
                return Err(CallError::IncompatibleInstance {
                    expected: types.type_name(self.root_type()),
                    found: types.value_type_name(other),
                });
            }
        };
        let Some(root_instance) = root.target() else {
            return Err(CallError::MissingComponent {
                ty: types.type_name(root.ty()),
            });
        };

        let Some(set_entry) = self.method_set_of(entry) else {
            return Err(CallError::IncompatibleInstance {
                expected: method_name(),
                found: types.type_name(self.node(entry.owner).ty),
            });
        };
        let Some(decl) = set_entry.decl(types) else {
            return Err(CallError::IncompatibleInstance {
                expected: method_name(),
                found: types.type_name(set_entry.declared_on),
            });
        };

        let steps = self.receiver_steps(id);
        let target = locate(types, root_instance, types.deref(root.ty()), &steps)?;

        let mut args: Vec<Value> = Vec::with_capacity(entry.inputs.len());
        for &ty in &entry.inputs {
            let value = resolver
                .resolve(ty)
                .map_err(|source| CallError::UnresolvableArgument {
                    method: method_name(),
                    ty: types.type_name(ty),
                    source,
                })?;
            if !types.assignable(&value, ty) {
                return Err(CallError::ArgumentMismatch {
                    method: method_name(),
                    ty: types.type_name(ty),
                    found: types.value_type_name(&value),
                });
            }
            args.push(value);
        }

        tracing::trace!(
            steps = steps.len(),
            inline = target.inline.len(),
            args = args.len(),
            "invoking"
        );
        let results = match decl.receiver {
            ReceiverKind::Value => {
                let guard = target.instance.read().unwrap_or_else(PoisonError::into_inner);
                with_shared(types, target.record, &guard, &target.inline, |rec| {
                    invoke(decl, Receiver::Value(rec), &args)
                })?
            }
            ReceiverKind::Ref => {
                let mut guard = target.instance.write().unwrap_or_else(PoisonError::into_inner);
                with_exclusive(types, target.record, &mut guard, &target.inline, |rec| {
                    invoke(decl, Receiver::Ref(rec), &args)
                })?
            }
        };

        if results.len() != entry.outputs.len() {
            return Err(CallError::ResultArity {
                method: method_name(),
                expected: entry.outputs.len(),
                found: results.len(),
            });
        }
        Ok(results)
    }

    /// Tree path to the owner, then the promotion path to the declaring record.
    fn receiver_steps(&self, id: MethodId) -> Steps {
        let types: &TypeTable = self.types();
        let entry = self.method(id);
        let promoted = self
            .method_set_of(entry)
            .map(|e| e.path.as_slice())
            .unwrap_or_default();

        let mut steps = Steps::new();
        let mut record = types.deref(self.root_type());
        for &field in self.field_path(entry.owner).iter().chain(promoted) {
            let Some(f) = types.record(record).and_then(|d| d.fields().get(field as usize)) else {
                break;
            };
            record = types.deref(f.ty);
            steps.push(Step { field, record });
        }
        steps
    }
}

/// Follows `steps` from `root`, one reference at a time.
///
/// No lock is held on return, and none is held while the next one is taken.
fn locate(
    types: &TypeTable,
    root: &Instance,
    root_record: TypeId,
    steps: &[Step],
) -> Result<Target, CallError> {
    let mut target = Target {
        instance: Arc::clone(root),
        record: root_record,
        inline: Steps::new(),
    };
    for step in steps {
        let next = {
            let guard = target.instance.read().unwrap_or_else(PoisonError::into_inner);
            with_shared(types, target.record, &guard, &target.inline, |rec| {
                match rec.field(step.field as usize) {
                    Some(Value::Record(_)) => Ok(None),
                    Some(Value::Ref(r)) => match r.target() {
                        Some(instance) => Ok(Some(Arc::clone(instance))),
                        None => Err(CallError::MissingComponent {
                            ty: types.type_name(r.ty()),
                        }),
                    },
                    _ => Err(incompatible(types, step.record, rec)),
                }
            })??
        };
        tracing::trace!(
            field = step.field,
            through_ref = next.is_some(),
            "stepping into composed field"
        );
        match next {
            Some(instance) => {
                target.instance = instance;
                target.record = step.record;
                target.inline.clear();
            }
            None => target.inline.push(*step),
        }
    }
    Ok(target)
}

#[inline]
fn invoke(decl: &MethodDef, receiver: Receiver<'_>, args: &[Value]) -> Vec<Value> {
    (decl.body)(receiver, args)
}

fn incompatible(types: &TypeTable, expected: TypeId, found: &RecordValue) -> CallError {
    CallError::IncompatibleInstance {
        expected: types.type_name(expected),
        found: found.type_name().to_owned(),
    }
}

/// Follows inline record fields from `rec` and applies `f` to the target.
fn with_shared<T>(
    types: &TypeTable,
    expected: TypeId,
    rec: &RecordValue,
    steps: &[Step],
    f: impl FnOnce(&RecordValue) -> T,
) -> Result<T, CallError> {
    if rec.ty() != expected {
        return Err(incompatible(types, expected, rec));
    }
    let Some((step, rest)) = steps.split_first() else {
        return Ok(f(rec));
    };
    match rec.field(step.field as usize) {
        Some(Value::Record(inner)) => with_shared(types, step.record, inner, rest, f),
        _ => Err(incompatible(types, expected, rec)),
    }
}

/// Like [`with_shared`], handing out `&mut`.
fn with_exclusive<T>(
    types: &TypeTable,
    expected: TypeId,
    rec: &mut RecordValue,
    steps: &[Step],
    f: impl FnOnce(&mut RecordValue) -> T,
) -> Result<T, CallError> {
    if rec.ty() != expected {
        return Err(incompatible(types, expected, rec));
    }
    let Some((step, rest)) = steps.split_first() else {
        return Ok(f(rec));
    };
    match rec.field_mut(step.field as usize) {
        Some(Value::Record(inner)) => with_exclusive(types, step.record, inner, rest, f),
        _ => Err(incompatible(types, expected, rec)),
    }
}
