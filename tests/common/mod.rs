#![allow(dead_code)]

use std::sync::Once;

use embed_reflect::types::{ERROR, INT, STRING};
use embed_reflect::{ResolveError, TypeId, Value};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a test subscriber when `EMBED_REFLECT_LOG` is set.
pub fn init_tracing() {
    INIT.call_once(|| {
        if let Ok(filter) = EnvFilter::try_from_env("EMBED_REFLECT_LOG") {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_test_writer()
                .try_init();
        }
    });
}

/// Resolver that counts its invocations.
#[derive(Default)]
pub struct Counting {
    pub calls: usize,
}

impl embed_reflect::Resolver for Counting {
    fn resolve(&mut self, ty: TypeId) -> Result<Value, ResolveError> {
        self.calls += 1;
        by_kind(ty)
    }
}

/// `string` -> "potatos", `int` -> 42, `error` -> "noooo".
pub fn by_kind(ty: TypeId) -> Result<Value, ResolveError> {
    if ty == STRING {
        Ok(Value::from("potatos"))
    } else if ty == INT {
        Ok(Value::Int(42))
    } else if ty == ERROR {
        Ok(Value::Error("noooo".into()))
    } else {
        Err(ResolveError::new(format!("type {ty:?} not found")))
    }
}
