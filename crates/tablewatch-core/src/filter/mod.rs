//! Server-side filter predicates.
//!
//! Two capabilities, one seam:
//! - [`SqlFilter`] compiles a typed [`FilterExpr`] predicate through the
//!   expression compiler, memoizing the result.
//! - Any caller-supplied [`FilterTranslator`] bypasses the compiler with a
//!   hand-written boolean expression; the engine only ever consumes the seam.

pub mod ast;
pub mod compiler;

pub use ast::{col, lit, BinaryOp, FilterExpr};
pub use compiler::compile;

use once_cell::sync::OnceCell;

use crate::catalog::ColumnMapping;
use crate::error::Result;

/// Anything that can produce a server-side boolean expression.
pub trait FilterTranslator: Send + Sync {
    /// Produce the boolean expression string. Implementations should be
    /// idempotent; callers may invoke this more than once.
    fn translate(&self) -> Result<String>;
}

/// A compiled-expression filter with memoized translation.
///
/// The first `translate()` call compiles and caches; later calls return the
/// cached string unchanged. Nothing is computed eagerly at construction.
pub struct SqlFilter {
    expr: FilterExpr,
    mapping: ColumnMapping,
    cache: OnceCell<String>,
}

impl SqlFilter {
    pub fn new(expr: FilterExpr, mapping: ColumnMapping) -> Self {
        Self {
            expr,
            mapping,
            cache: OnceCell::new(),
        }
    }
}

impl FilterTranslator for SqlFilter {
    fn translate(&self) -> Result<String> {
        self.cache
            .get_or_try_init(|| compile(&self.expr, &self.mapping))
            .cloned()
    }
}

/// The filter capability a dependency is configured with.
pub enum TableFilter {
    /// A typed predicate, compiled against the resolved column mapping.
    Expression(FilterExpr),
    /// An opaque, caller-translated predicate.
    Custom(Box<dyn FilterTranslator>),
}
