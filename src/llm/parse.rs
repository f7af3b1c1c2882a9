//! Strict parsing of model output into terms
//!
//! Model output is expected to be JSON under a fixed grammar keyed by
//! the requested thought kind. Anything that fails to parse is wrapped
//! verbatim as an atom rather than dropped, so malformed generations
//! stay visible downstream.

use serde_json::Value;

use crate::term::Term;
use crate::types::ThoughtKind;

/// Parse raw model output for a thought of the given target kind.
///
/// - `{"name": n, "args": [...]}` → `Struct(n, args)`
/// - `{"value": v}` → the parsed value (a string becomes an atom)
/// - target `Rule`: `{"pattern": p, "action": a}` →
///   `rule_definition(p, a)` with both sides parsed recursively
/// - target `Tools`: `{"tools": [{...}]}` → a list of `tool_spec(…)`
///   structures
/// - `{"tool_call": {"name": n, "params": {...}}}` → `n(params(k(v), …))`
/// - anything unparseable → `Atom(raw)`
pub fn parse_output(raw: &str, target: ThoughtKind) -> Term {
    let trimmed = raw.trim();
    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return Term::atom(trimmed);
    };

    match target {
        ThoughtKind::Rule => {
            if let Some(term) = parse_rule_definition(&value) {
                return term;
            }
        }
        ThoughtKind::Tools => {
            if let Some(term) = parse_tool_specs(&value) {
                return term;
            }
        }
        _ => {}
    }

    parse_generic(&value)
}

fn parse_rule_definition(value: &Value) -> Option<Term> {
    let object = value.as_object()?;
    let pattern = object.get("pattern")?;
    let action = object.get("action")?;
    Some(Term::structure(
        "rule_definition",
        vec![json_to_term(pattern), json_to_term(action)],
    ))
}

fn parse_tool_specs(value: &Value) -> Option<Term> {
    let tools = value.as_object()?.get("tools")?.as_array()?;
    let specs: Vec<Term> = tools.iter().filter_map(parse_tool_spec).collect();
    Some(Term::list(specs))
}

fn parse_tool_spec(value: &Value) -> Option<Term> {
    let object = value.as_object()?;
    let name = object.get("name")?.as_str()?;
    let tool_type = object.get("type")?.as_str()?;
    let mut fields = vec![
        Term::pair("name", Term::atom(name)),
        Term::pair("type", Term::atom(tool_type)),
    ];
    if let Some(endpoint) = object.get("endpoint").and_then(Value::as_str) {
        fields.push(Term::pair("endpoint", Term::atom(endpoint)));
    }
    if let Some(description) = object.get("description").and_then(Value::as_str) {
        fields.push(Term::pair("description", Term::atom(description)));
    }
    Some(Term::structure("tool_spec", fields))
}

fn parse_generic(value: &Value) -> Term {
    if let Some(object) = value.as_object() {
        if let Some(call) = object.get("tool_call").and_then(Value::as_object) {
            if let Some(name) = call.get("name").and_then(Value::as_str) {
                let params = call
                    .get("params")
                    .and_then(Value::as_object)
                    .map(|params| {
                        params
                            .iter()
                            .map(|(k, v)| Term::pair(k.clone(), json_to_term(v)))
                            .collect()
                    })
                    .unwrap_or_default();
                return Term::structure(name, vec![Term::structure("params", params)]);
            }
        }
        if let Some(name) = object.get("name").and_then(Value::as_str) {
            let args = object
                .get("args")
                .and_then(Value::as_array)
                .map(|args| args.iter().map(json_to_term).collect())
                .unwrap_or_default();
            return Term::structure(name, args);
        }
        if let Some(inner) = object.get("value") {
            return json_to_term(inner);
        }
    }
    json_to_term(value)
}

fn json_to_term(value: &Value) -> Term {
    match value {
        Value::String(s) => Term::atom(s.clone()),
        Value::Number(n) => Term::atom(n.to_string()),
        Value::Bool(b) => Term::atom(if *b { "true" } else { "false" }),
        Value::Null => Term::atom("null"),
        Value::Array(items) => Term::list(items.iter().map(json_to_term).collect()),
        Value::Object(object) => {
            if let Some(name) = object.get("name").and_then(Value::as_str) {
                let args = object
                    .get("args")
                    .and_then(Value::as_array)
                    .map(|args| args.iter().map(json_to_term).collect())
                    .unwrap_or_default();
                return Term::structure(name, args);
            }
            if object.len() == 1 {
                if let Some((key, inner)) = object.iter().next() {
                    return Term::pair(key.clone(), json_to_term(inner));
                }
            }
            let mut pairs: Vec<(&String, &Value)> = object.iter().collect();
            pairs.sort_by_key(|(key, _)| key.as_str());
            Term::list(
                pairs
                    .into_iter()
                    .map(|(key, inner)| Term::pair(key.clone(), json_to_term(inner)))
                    .collect(),
            )
        }
    }
}
