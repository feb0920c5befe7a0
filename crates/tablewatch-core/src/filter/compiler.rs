//! Predicate-to-SQL compilation.
//!
//! Single recursive pass, no backtracking. Before rendering, a
//! partial-evaluation pass folds every subtree that does not reference the
//! predicate parameter into a literal, so expressions like
//! `lit("abc").to_upper().eq(col("Code"))` embed the evaluated constant.
//!
//! Unsupported constructs form a closed error set:
//! [`TableWatchError::UnsupportedExpression`] for node shapes the target
//! language cannot express (nested member access, boolean method in value
//! position, comparisons against constants of incomparable types) and
//! [`TableWatchError::UnsupportedMethod`] for method names outside the
//! supported set.

use tablewatch_commons::SqlValue;

use crate::catalog::ColumnMapping;
use crate::error::{Result, TableWatchError};
use crate::filter::ast::{BinaryOp, FilterExpr};

/// Compile a predicate into a parenthesized boolean expression over server
/// column names.
pub fn compile(expr: &FilterExpr, mapping: &ColumnMapping) -> Result<String> {
    let folded = fold(expr.clone())?;
    render_bool(&folded, mapping)
}

// ---------------------------------------------------------------------------
// Constant folding
// ---------------------------------------------------------------------------

fn fold(expr: FilterExpr) -> Result<FilterExpr> {
    if !expr.has_column_ref() {
        return eval(expr).map(FilterExpr::Literal);
    }
    Ok(match expr {
        FilterExpr::Binary { op, left, right } => FilterExpr::Binary {
            op,
            left: Box::new(fold(*left)?),
            right: Box::new(fold(*right)?),
        },
        FilterExpr::Not(inner) => FilterExpr::Not(Box::new(fold(*inner)?)),
        FilterExpr::Call {
            method,
            target,
            args,
        } => FilterExpr::Call {
            method,
            target: Box::new(fold(*target)?),
            args,
        },
        FilterExpr::InList { member, values } => FilterExpr::InList {
            member: Box::new(fold(*member)?),
            values,
        },
        other => other,
    })
}

/// Evaluate a parameter-free subtree to a single value.
fn eval(expr: FilterExpr) -> Result<SqlValue> {
    match expr {
        FilterExpr::Literal(v) => Ok(v),
        FilterExpr::Not(inner) => match eval(*inner)? {
            SqlValue::Bit(b) => Ok(SqlValue::Bit(!b)),
            other => Err(TableWatchError::UnsupportedExpression(format!(
                "NOT over non-boolean constant {other:?}"
            ))),
        },
        FilterExpr::Binary { op, left, right } => {
            let lv = eval(*left)?;
            let rv = eval(*right)?;
            eval_binary(op, &lv, &rv)
        }
        FilterExpr::Call {
            method,
            target,
            args,
        } => {
            let tv = eval(*target)?;
            eval_call(&method, &tv, &args)
        }
        FilterExpr::InList { member, values } => {
            let mv = eval(*member)?;
            Ok(SqlValue::Bit(values.iter().any(|v| v.coercive_eq(&mv))))
        }
        FilterExpr::Column(name) => Err(TableWatchError::UnsupportedExpression(format!(
            "column '{name}' inside a constant subtree"
        ))),
    }
}

fn eval_binary(op: BinaryOp, left: &SqlValue, right: &SqlValue) -> Result<SqlValue> {
    match op {
        BinaryOp::And | BinaryOp::Or => match (left, right) {
            (SqlValue::Bit(a), SqlValue::Bit(b)) => Ok(SqlValue::Bit(if op == BinaryOp::And {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(TableWatchError::UnsupportedExpression(
                "logical operator over non-boolean constants".to_string(),
            )),
        },
        BinaryOp::Eq | BinaryOp::NotEq => {
            // Constant comparison against NULL is three-valued; it never
            // holds, matching server semantics.
            if left.is_null() || right.is_null() {
                return Ok(SqlValue::Bit(false));
            }
            let equal = left.coercive_eq(right);
            Ok(SqlValue::Bit(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = if let (Some(a), Some(b)) = (left.numeric_value(), right.numeric_value())
            {
                a.partial_cmp(&b)
            } else if let (Some(a), Some(b)) = (left.as_text(), right.as_text()) {
                Some(a.cmp(b))
            } else {
                None
            };
            let ordering = ordering.ok_or_else(|| {
                TableWatchError::UnsupportedExpression(format!(
                    "cannot order constants {left:?} and {right:?}"
                ))
            })?;
            Ok(SqlValue::Bit(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::GtEq => ordering.is_ge(),
                _ => unreachable!(),
            }))
        }
    }
}

fn eval_call(method: &str, target: &SqlValue, args: &[SqlValue]) -> Result<SqlValue> {
    let text = || {
        target.as_text().map(str::to_string).ok_or_else(|| {
            TableWatchError::UnsupportedExpression(format!(
                "string method '{method}' over non-string constant"
            ))
        })
    };
    match method {
        "trim" => Ok(SqlValue::Text(text()?.trim().to_string())),
        "trim_start" => Ok(SqlValue::Text(text()?.trim_start().to_string())),
        "trim_end" => Ok(SqlValue::Text(text()?.trim_end().to_string())),
        "to_upper" => Ok(SqlValue::Text(text()?.to_uppercase())),
        "to_lower" => Ok(SqlValue::Text(text()?.to_lowercase())),
        "substring" => {
            let (start, length) = substring_args(args)?;
            let s = text()?;
            // SUBSTRING is 1-based, like the rendered SQL.
            let skip = (start.max(1) - 1) as usize;
            Ok(SqlValue::Text(
                s.chars().skip(skip).take(length.max(0) as usize).collect(),
            ))
        }
        "starts_with" => Ok(SqlValue::Bit(text()?.starts_with(str_arg(method, args)?))),
        "ends_with" => Ok(SqlValue::Bit(text()?.ends_with(str_arg(method, args)?))),
        "contains" => Ok(SqlValue::Bit(text()?.contains(str_arg(method, args)?))),
        "equals" => {
            let other = args.first().ok_or_else(|| {
                TableWatchError::UnsupportedExpression("equals without an argument".to_string())
            })?;
            Ok(SqlValue::Bit(target.coercive_eq(other)))
        }
        other => Err(TableWatchError::UnsupportedMethod(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_bool(expr: &FilterExpr, mapping: &ColumnMapping) -> Result<String> {
    match expr {
        FilterExpr::Binary { op, left, right } => match op {
            BinaryOp::And | BinaryOp::Or => {
                let keyword = if *op == BinaryOp::And { "AND" } else { "OR" };
                Ok(format!(
                    "({} {} {})",
                    render_bool(left, mapping)?,
                    keyword,
                    render_bool(right, mapping)?
                ))
            }
            BinaryOp::Eq | BinaryOp::NotEq => {
                // Equality against a NULL literal renders as IS [NOT] NULL.
                let null_side = match (left.as_ref(), right.as_ref()) {
                    (FilterExpr::Literal(v), other) if v.is_null() => Some(other),
                    (other, FilterExpr::Literal(v)) if v.is_null() => Some(other),
                    _ => None,
                };
                if let Some(side) = null_side {
                    let keyword = if *op == BinaryOp::Eq { "IS NULL" } else { "IS NOT NULL" };
                    return Ok(format!("({} {})", render_value(side, mapping)?, keyword));
                }
                let operator = if *op == BinaryOp::Eq { "=" } else { "<>" };
                Ok(format!(
                    "({} {} {})",
                    render_value(left, mapping)?,
                    operator,
                    render_value(right, mapping)?
                ))
            }
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                let operator = match op {
                    BinaryOp::Lt => "<",
                    BinaryOp::LtEq => "<=",
                    BinaryOp::Gt => ">",
                    BinaryOp::GtEq => ">=",
                    _ => unreachable!(),
                };
                Ok(format!(
                    "({} {} {})",
                    render_value(left, mapping)?,
                    operator,
                    render_value(right, mapping)?
                ))
            }
        },
        FilterExpr::Not(inner) => Ok(format!("(NOT {})", render_bool(inner, mapping)?)),
        FilterExpr::InList { member, values } => {
            if values.is_empty() {
                return Err(TableWatchError::UnsupportedExpression(
                    "IN over an empty collection".to_string(),
                ));
            }
            let rendered: Vec<String> = values.iter().map(render_literal).collect();
            Ok(format!(
                "({} IN ({}))",
                render_value(member, mapping)?,
                rendered.join(", ")
            ))
        }
        FilterExpr::Call {
            method,
            target,
            args,
        } => match method.as_str() {
            "starts_with" => like_pattern(target, args, mapping, method, |s| format!("{s}%")),
            "ends_with" => like_pattern(target, args, mapping, method, |s| format!("%{s}")),
            "contains" => like_pattern(target, args, mapping, method, |s| format!("%{s}%")),
            "equals" => {
                let other = args.first().ok_or_else(|| {
                    TableWatchError::UnsupportedExpression(
                        "equals without an argument".to_string(),
                    )
                })?;
                if other.is_null() {
                    return Ok(format!("({} IS NULL)", render_value(target, mapping)?));
                }
                Ok(format!(
                    "({} = {})",
                    render_value(target, mapping)?,
                    render_literal(other)
                ))
            }
            "trim" | "trim_start" | "trim_end" | "to_upper" | "to_lower" | "substring" => {
                Err(TableWatchError::UnsupportedExpression(format!(
                    "string-valued method '{method}' in boolean position"
                )))
            }
            other => Err(TableWatchError::UnsupportedMethod(other.to_string())),
        },
        FilterExpr::Literal(SqlValue::Bit(b)) => {
            Ok(if *b { "(1 = 1)" } else { "(1 = 0)" }.to_string())
        }
        // A bare boolean column in predicate position.
        FilterExpr::Column(_) => Ok(format!("({} = 1)", render_value(expr, mapping)?)),
        other => Err(TableWatchError::UnsupportedExpression(format!(
            "{other:?} in boolean position"
        ))),
    }
}

fn render_value(expr: &FilterExpr, mapping: &ColumnMapping) -> Result<String> {
    match expr {
        FilterExpr::Column(name) => {
            if name.contains('.') {
                return Err(TableWatchError::UnsupportedExpression(format!(
                    "nested member access '{name}'; only flat scalar properties are supported"
                )));
            }
            let mapped = mapping.column_for(name).ok_or_else(|| {
                TableWatchError::ModelMapper(format!(
                    "filter references unmapped property '{name}'"
                ))
            })?;
            Ok(format!("[{}]", mapped.column))
        }
        FilterExpr::Literal(v) => Ok(render_literal(v)),
        FilterExpr::Call {
            method,
            target,
            args,
        } => {
            let inner = render_value(target, mapping)?;
            match method.as_str() {
                "trim" => Ok(format!("LTRIM(RTRIM({inner}))")),
                "trim_start" => Ok(format!("LTRIM({inner})")),
                "trim_end" => Ok(format!("RTRIM({inner})")),
                "to_upper" => Ok(format!("UPPER({inner})")),
                "to_lower" => Ok(format!("LOWER({inner})")),
                "substring" => {
                    let (start, length) = substring_args(args)?;
                    Ok(format!("SUBSTRING({inner}, {start}, {length})"))
                }
                "starts_with" | "ends_with" | "contains" | "equals" => {
                    Err(TableWatchError::UnsupportedExpression(format!(
                        "boolean method '{method}' in value position"
                    )))
                }
                other => Err(TableWatchError::UnsupportedMethod(other.to_string())),
            }
        }
        other => Err(TableWatchError::UnsupportedExpression(format!(
            "{other:?} in value position"
        ))),
    }
}

fn like_pattern(
    target: &FilterExpr,
    args: &[SqlValue],
    mapping: &ColumnMapping,
    method: &str,
    shape: impl Fn(&str) -> String,
) -> Result<String> {
    let needle = str_arg(method, args)?;
    Ok(format!(
        "({} LIKE '{}')",
        render_value(target, mapping)?,
        shape(&needle.replace('\'', "''"))
    ))
}

fn str_arg<'a>(method: &str, args: &'a [SqlValue]) -> Result<&'a str> {
    match args.first() {
        Some(SqlValue::Text(s)) => Ok(s),
        _ => Err(TableWatchError::UnsupportedExpression(format!(
            "'{method}' requires one string argument"
        ))),
    }
}

fn substring_args(args: &[SqlValue]) -> Result<(i64, i64)> {
    match args {
        [SqlValue::BigInt(start), SqlValue::BigInt(length)] => Ok((*start, *length)),
        _ => Err(TableWatchError::UnsupportedExpression(
            "'substring' requires two integer arguments".to_string(),
        )),
    }
}

/// Literal formatting: strings single-quoted, booleans as `1`/`0`,
/// floating point in round-trippable invariant form, temporal values
/// single-quoted ISO-8601.
fn render_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bit(b) => if *b { "1" } else { "0" }.to_string(),
        SqlValue::TinyInt(v) => v.to_string(),
        SqlValue::SmallInt(v) => v.to_string(),
        SqlValue::Int(v) => v.to_string(),
        SqlValue::BigInt(v) => v.to_string(),
        SqlValue::Real(v) => v.to_string(),
        SqlValue::Float(v) => v.to_string(),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        SqlValue::Binary(bytes) => format!("0x{}", hex::encode(bytes)),
        temporal_or_guid => match temporal_or_guid.to_json() {
            serde_json::Value::String(s) => format!("'{s}'"),
            other => other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnDescriptor;
    use crate::filter::ast::{col, lit};
    use tablewatch_commons::SqlDataType;

    fn mapping() -> ColumnMapping {
        let catalog: Vec<ColumnDescriptor> = [
            ("CategoryId", "int"),
            ("Quantity", "int"),
            ("Name", "nvarchar"),
            ("Discontinued", "bit"),
        ]
        .into_iter()
        .map(|(name, server_type)| ColumnDescriptor {
            name: name.to_string(),
            server_type: server_type.to_string(),
            size: None,
            data_type: SqlDataType::parse(server_type),
        })
        .collect();
        let props: Vec<String> = catalog.iter().map(|c| c.name.clone()).collect();
        ColumnMapping::resolve(&props, &[], None, &catalog).unwrap()
    }

    #[test]
    fn test_comparison_and_logic() {
        let expr = col("CategoryId").eq(lit(1)).and(col("Quantity").le(lit(10)));
        assert_eq!(
            compile(&expr, &mapping()).unwrap(),
            "(([CategoryId] = 1) AND ([Quantity] <= 10))"
        );
    }

    #[test]
    fn test_null_equality_renders_is_null() {
        let expr = col("Name").eq(lit(SqlValue::Null));
        assert_eq!(compile(&expr, &mapping()).unwrap(), "([Name] IS NULL)");

        let expr = col("Name").ne(lit(SqlValue::Null));
        assert_eq!(compile(&expr, &mapping()).unwrap(), "([Name] IS NOT NULL)");
    }

    #[test]
    fn test_string_methods() {
        let expr = col("Name").trim().to_upper().eq(lit("WIDGET"));
        assert_eq!(
            compile(&expr, &mapping()).unwrap(),
            "(UPPER(LTRIM(RTRIM([Name]))) = 'WIDGET')"
        );

        let expr = col("Name").substring(1, 3).eq(lit("WID"));
        assert_eq!(
            compile(&expr, &mapping()).unwrap(),
            "(SUBSTRING([Name], 1, 3) = 'WID')"
        );
    }

    #[test]
    fn test_like_methods() {
        let m = mapping();
        assert_eq!(
            compile(&col("Name").starts_with("Wi"), &m).unwrap(),
            "([Name] LIKE 'Wi%')"
        );
        assert_eq!(
            compile(&col("Name").ends_with("et"), &m).unwrap(),
            "([Name] LIKE '%et')"
        );
        assert_eq!(
            compile(&col("Name").contains("dg"), &m).unwrap(),
            "([Name] LIKE '%dg%')"
        );
    }

    #[test]
    fn test_like_escapes_quotes() {
        assert_eq!(
            compile(&col("Name").contains("O'Neil"), &mapping()).unwrap(),
            "([Name] LIKE '%O''Neil%')"
        );
    }

    #[test]
    fn test_in_list() {
        let expr = col("CategoryId").in_list([1, 2]).and(col("Quantity").le(lit(10)));
        assert_eq!(
            compile(&expr, &mapping()).unwrap(),
            "(([CategoryId] IN (1, 2)) AND ([Quantity] <= 10))"
        );
    }

    #[test]
    fn test_constant_folding_embeds_evaluated_literal() {
        // The whole right-hand side has no parameter reference; it folds.
        let expr = col("Name").eq(lit(" widget ").trim().to_upper());
        assert_eq!(compile(&expr, &mapping()).unwrap(), "([Name] = 'WIDGET')");
    }

    #[test]
    fn test_constant_boolean_subtree_folds_to_anchor() {
        let expr = lit("abc").to_upper().eq(lit("ABC")).and(col("Quantity").gt(lit(0)));
        assert_eq!(
            compile(&expr, &mapping()).unwrap(),
            "((1 = 1) AND ([Quantity] > 0))"
        );
    }

    #[test]
    fn test_bare_boolean_column() {
        let expr = col("Discontinued").not();
        assert_eq!(
            compile(&expr, &mapping()).unwrap(),
            "(NOT ([Discontinued] = 1))"
        );
    }

    #[test]
    fn test_nested_member_access_rejected() {
        let expr = col("Category.Name").eq(lit("Beverages"));
        let err = compile(&expr, &mapping()).unwrap_err();
        assert!(matches!(err, TableWatchError::UnsupportedExpression(_)));
    }

    #[test]
    fn test_unknown_method_rejected() {
        let expr = col("Name").call("reverse", Vec::new()).eq(lit("x"));
        let err = compile(&expr, &mapping()).unwrap_err();
        assert!(matches!(err, TableWatchError::UnsupportedMethod(name) if name == "reverse"));
    }

    #[test]
    fn test_unmapped_property_rejected() {
        let expr = col("Ghost").eq(lit(1));
        let err = compile(&expr, &mapping()).unwrap_err();
        assert!(matches!(err, TableWatchError::ModelMapper(_)));
    }

    #[test]
    fn test_literal_formats() {
        assert_eq!(render_literal(&SqlValue::Bit(true)), "1");
        assert_eq!(render_literal(&SqlValue::Float(10.25)), "10.25");
        assert_eq!(render_literal(&SqlValue::Text("it's".into())), "'it''s'");
        assert_eq!(
            render_literal(&SqlValue::Decimal("123.77".parse().unwrap())),
            "123.77"
        );
    }
}
