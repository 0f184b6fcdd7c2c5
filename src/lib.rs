//! Composition-graph introspection for records with anonymous embedding.
//!
//! - [`types`] is a small reflective type registry: records, references,
//!   interfaces, fields (named or embedded) and methods with closure bodies.
//! - [`tree`] builds the composition tree of a root instance and catalogs the
//!   promoted method set of every node.
//! - [`call`] invokes a cataloged method on a live instance, locating the
//!   receiver deep inside the composition and resolving arguments by type.
//!
//! ```
//! use std::sync::Arc;
//! use embed_reflect::{build, Field, MethodDecl, ReceiverKind, ResolveError, TypeId, TypeTable, Value};
//! use embed_reflect::types::{INT, STRING};
//!
//! let mut types = TypeTable::new();
//! let r = types.declare_record("app", "R");
//! let s = types.declare_record("app", "S");
//! types.set_fields(r, [Field::named("Name", STRING), Field::embedded(s)]).unwrap();
//! types.set_fields(s, [Field::named("Value", STRING)]).unwrap();
//! types
//!     .add_method(
//!         s,
//!         MethodDecl::new("Method", ReceiverKind::Value, |recv, args| {
//!             let value = recv.get("Value").and_then(Value::as_str).unwrap_or_default();
//!             let n = args[0].as_int().unwrap_or_default();
//!             vec![Value::from(format!("{value} {n}"))]
//!         })
//!         .input(INT)
//!         .output(STRING),
//!     )
//!     .unwrap();
//!
//! let types = Arc::new(types);
//! let instance = types.instance(r).unwrap();
//! {
//!     let mut root = instance.as_reference().unwrap().write().unwrap();
//!     let Some(Value::Record(inner)) = root.get_mut("S") else { unreachable!() };
//!     inner.set("Value", "world").unwrap();
//! }
//!
//! let tree = build(Arc::clone(&types), &instance).unwrap();
//! let method = tree.find_method("*app.R.Method").unwrap();
//! let mut resolver = |_: TypeId| Ok::<_, ResolveError>(Value::Int(42));
//! let out = tree.call(&instance, method, &mut resolver).unwrap();
//! assert_eq!(out, [Value::from("world 42")]);
//! ```

pub mod arena;
pub mod call;
pub mod error;
pub mod method_set;
pub mod tree;
pub mod types;
pub mod value;
pub mod walk;

// Re-exports for convenience
pub use call::Resolver;
pub use error::{BuildError, CallError, DefineError, ResolveError, ValueError};
pub use tree::{build, MethodEntry, MethodId, NodeId, TypeNode, TypeTree};
pub use types::{Field, MethodDecl, ReceiverKind, TypeId, TypeTable};
pub use value::{Receiver, RecordValue, Ref, Value};
