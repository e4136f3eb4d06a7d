//! `{{ key }}` placeholder rendering
//!
//! Rendering is a single pass: text substituted for a placeholder is never
//! scanned again, so state values containing `{{...}}` cannot expand into
//! further lookups.

use flow_api::Value;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z0-9_.\-]+)\s*\}\}").expect("placeholder pattern compiles")
});

/// Replace every placeholder in `input` with the matching state value
///
/// A leading `state.` on the key is ignored. Missing keys render as the
/// empty string.
pub fn render(input: &str, state: &BTreeMap<String, Value>) -> String {
    if !input.contains("{{") {
        return input.to_string();
    }
    PLACEHOLDER
        .replace_all(input, |caps: &Captures<'_>| {
            let key = &caps[1];
            let key = key.strip_prefix("state.").unwrap_or(key);
            state.get(key).map(Value::to_text).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_render_basic() {
        let s = state(&[("name", "Ada".into()), ("count", Value::Number(3.0))]);
        assert_eq!(render("Hi {{name}} x{{ count }}", &s), "Hi Ada x3");
    }

    #[test]
    fn test_state_prefix_and_missing() {
        let s = state(&[("name", "Ada".into())]);
        assert_eq!(render("{{state.name}}|{{ghost}}|", &s), "Ada||");
    }

    #[test]
    fn test_single_pass() {
        let s = state(&[("a", "{{b}}".into()), ("b", "secret".into())]);
        let once = render("x{{a}}", &s);
        assert_eq!(once, "x{{b}}");
    }

    #[test]
    fn test_rerender_without_placeholders_is_noop() {
        let s = state(&[("name", "Ada".into())]);
        let once = render("Hello {{ name }}!", &s);
        assert_eq!(render(&once, &s), once);
    }

    #[test]
    fn test_invalid_keys_left_alone() {
        let s = state(&[]);
        assert_eq!(render("{{ a b }} {{}}", &s), "{{ a b }} {{}}");
    }
}
