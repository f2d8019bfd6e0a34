//! Shared test doubles: an in-memory context subsystem (which owns the
//! snapshot wire format), a validator that recomputes context commits, and a
//! builder producing fully-populated source nodes.

#![allow(dead_code)]

pub mod context;
pub mod fixture;
pub mod validator;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Route engine logs through a test subscriber; `RUST_LOG` filters apply.
pub fn init_test_logging() {
	INIT_TRACING.call_once(|| {
		let _ = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_test_writer()
			.try_init();
	});
}
