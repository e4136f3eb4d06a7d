//! Binary comparisons for `IfElse` and `Filter`
//!
//! Both operands are resolved first. When both parse as numbers the
//! comparison is numeric, so `"10" > "9"`; otherwise only `==`, `!=` and
//! `contains` apply to the string forms and every other operator is false.

use crate::resolve::ResolveScope;
use flow_api::{Item, Value};

/// Evaluate `left op right` in the given scope
pub fn evaluate(
    left: &Value,
    op: &str,
    right: &Value,
    scope: &ResolveScope<'_>,
    item: Option<&Item>,
) -> bool {
    let left = scope.resolve(left, item);
    let right = scope.resolve(right, item);
    compare(&left, op.trim(), &right)
}

/// Compare two already-resolved values
pub fn compare(left: &Value, op: &str, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return match op {
            "==" => l == r,
            "!=" => l != r,
            ">" => l > r,
            ">=" => l >= r,
            "<" => l < r,
            "<=" => l <= r,
            _ => false,
        };
    }

    let l = left.to_text();
    let r = right.to_text();
    match op {
        "==" => l == r,
        "!=" => l != r,
        "contains" => l.contains(&r),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetTable;
    use flow_api::TriggerContext;
    use std::collections::BTreeMap;

    #[test]
    fn test_numeric_first() {
        assert!(compare(&"10".into(), ">", &"9".into()));
        assert!(compare(&Value::Number(5.0), "==", &"5".into()));
        assert!(compare(&"2.50".into(), "==", &Value::Number(2.5)));
        assert!(!compare(&Value::Number(4.0), ">=", &Value::Number(5.0)));
    }

    #[test]
    fn test_string_fallback() {
        assert!(compare(&"hello world".into(), "contains", &"world".into()));
        assert!(compare(&"a".into(), "!=", &"b".into()));
        assert!(!compare(&"b".into(), ">", &"a".into()));
        assert!(compare(&Value::Null, "==", &"".into()));
        assert!(compare(&Value::Bool(true), "==", &"true".into()));
    }

    #[test]
    fn test_evaluate_resolves_operands() {
        let mut state = BTreeMap::new();
        state.insert("x".to_string(), Value::Number(5.0));
        let ctx = TriggerContext::new();
        let assets = AssetTable::new();
        let scope = ResolveScope::new(&state, &ctx, &assets);

        assert!(evaluate(&"state.x".into(), "==", &Value::Number(5.0), &scope, None));
        assert!(!evaluate(&"state.x".into(), "<", &"3".into(), &scope, None));
        assert!(!evaluate(&"state.x".into(), "~=", &"3".into(), &scope, None));
    }
}
