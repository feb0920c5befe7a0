//! Typed predicate AST and its builder API.
//!
//! Predicates are built with [`col`] / [`lit`] and combinators:
//!
//! ```rust,ignore
//! let predicate = col("CategoryId")
//!     .in_list([1, 2])
//!     .and(col("Quantity").le(lit(10)));
//! ```
//!
//! The AST is a closed tagged union; anything it cannot represent is not a
//! valid predicate. The two deliberate escape hatches — dotted property paths
//! and [`FilterExpr::call`] with an arbitrary method name — exist so the
//! compiler can reject them with its closed error set instead of a panic.

use tablewatch_commons::SqlValue;

/// Binary operators in predicate position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// One node of a typed predicate over the model.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// Reference to a model property (mapped to a column at compile time).
    Column(String),
    /// A constant value.
    Literal(SqlValue),
    Not(Box<FilterExpr>),
    Binary {
        op: BinaryOp,
        left: Box<FilterExpr>,
        right: Box<FilterExpr>,
    },
    /// Method call on a target expression, e.g. `trim`, `starts_with`.
    Call {
        method: String,
        target: Box<FilterExpr>,
        args: Vec<SqlValue>,
    },
    /// Set membership: `member IN (v1, v2, ...)`.
    InList {
        member: Box<FilterExpr>,
        values: Vec<SqlValue>,
    },
}

/// Reference a model property.
pub fn col(name: impl Into<String>) -> FilterExpr {
    FilterExpr::Column(name.into())
}

/// A constant value.
pub fn lit(value: impl Into<SqlValue>) -> FilterExpr {
    FilterExpr::Literal(value.into())
}

impl FilterExpr {
    fn binary(self, op: BinaryOp, other: FilterExpr) -> FilterExpr {
        FilterExpr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn and(self, other: FilterExpr) -> FilterExpr {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: FilterExpr) -> FilterExpr {
        self.binary(BinaryOp::Or, other)
    }

    pub fn eq(self, other: FilterExpr) -> FilterExpr {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn ne(self, other: FilterExpr) -> FilterExpr {
        self.binary(BinaryOp::NotEq, other)
    }

    pub fn lt(self, other: FilterExpr) -> FilterExpr {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn le(self, other: FilterExpr) -> FilterExpr {
        self.binary(BinaryOp::LtEq, other)
    }

    pub fn gt(self, other: FilterExpr) -> FilterExpr {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn ge(self, other: FilterExpr) -> FilterExpr {
        self.binary(BinaryOp::GtEq, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> FilterExpr {
        FilterExpr::Not(Box::new(self))
    }

    /// Arbitrary method call; unknown names are rejected at compile time.
    pub fn call(self, method: impl Into<String>, args: Vec<SqlValue>) -> FilterExpr {
        FilterExpr::Call {
            method: method.into(),
            target: Box::new(self),
            args,
        }
    }

    pub fn trim(self) -> FilterExpr {
        self.call("trim", Vec::new())
    }

    pub fn trim_start(self) -> FilterExpr {
        self.call("trim_start", Vec::new())
    }

    pub fn trim_end(self) -> FilterExpr {
        self.call("trim_end", Vec::new())
    }

    pub fn to_upper(self) -> FilterExpr {
        self.call("to_upper", Vec::new())
    }

    pub fn to_lower(self) -> FilterExpr {
        self.call("to_lower", Vec::new())
    }

    /// `SUBSTRING(x, start, length)` — arguments pass through literally.
    pub fn substring(self, start: i64, length: i64) -> FilterExpr {
        self.call(
            "substring",
            vec![SqlValue::BigInt(start), SqlValue::BigInt(length)],
        )
    }

    pub fn starts_with(self, prefix: impl Into<String>) -> FilterExpr {
        self.call("starts_with", vec![SqlValue::Text(prefix.into())])
    }

    pub fn ends_with(self, suffix: impl Into<String>) -> FilterExpr {
        self.call("ends_with", vec![SqlValue::Text(suffix.into())])
    }

    pub fn contains(self, needle: impl Into<String>) -> FilterExpr {
        self.call("contains", vec![SqlValue::Text(needle.into())])
    }

    pub fn equals(self, value: impl Into<SqlValue>) -> FilterExpr {
        self.call("equals", vec![value.into()])
    }

    /// `member IN (v1, v2, ...)`.
    pub fn in_list<V: Into<SqlValue>>(self, values: impl IntoIterator<Item = V>) -> FilterExpr {
        FilterExpr::InList {
            member: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether any node below references the predicate parameter.
    pub fn has_column_ref(&self) -> bool {
        match self {
            FilterExpr::Column(_) => true,
            FilterExpr::Literal(_) => false,
            FilterExpr::Not(inner) => inner.has_column_ref(),
            FilterExpr::Binary { left, right, .. } => {
                left.has_column_ref() || right.has_column_ref()
            }
            FilterExpr::Call { target, .. } => target.has_column_ref(),
            FilterExpr::InList { member, .. } => member.has_column_ref(),
        }
    }
}
