//! Seed rule set defining the default reasoning flow
//!
//! These rules cover the strategies the engine itself spawns
//! (failure-rule synthesis, goal proposal, tool discovery) and the
//! clarification pattern; everything else falls through to the workers'
//! kind-default actions.

use serde_json::Value;

use crate::term::Term;
use crate::types::Rule;

fn seed(pattern: Term, action: Term, description: &str) -> Rule {
    let mut rule = Rule::new(pattern, action);
    rule.metadata.insert("source", Value::from("bootstrap"));
    rule.metadata.insert("description", Value::from(description));
    rule
}

fn llm_generate(input: Term, kind: &str) -> Term {
    Term::structure(
        "llm",
        vec![Term::structure(
            "params",
            vec![
                Term::pair("action", Term::atom("generate")),
                Term::pair("input", input),
                Term::pair("kind", Term::atom(kind)),
                Term::pair("format", Term::atom("json")),
            ],
        )],
    )
}

/// The rules installed into an empty rule store on startup.
pub fn bootstrap_rules() -> Vec<Rule> {
    vec![
        seed(
            Term::structure(
                "synthesize_failure_rule",
                vec![Term::var("FailedId"), Term::var("Hint")],
            ),
            llm_generate(Term::var("Hint"), "RULE"),
            "synthesize a corrective rule for an abandoned thought",
        ),
        seed(
            Term::structure("propose_related_goal", vec![Term::var("Goal")]),
            Term::structure(
                "goal_proposal",
                vec![Term::structure(
                    "params",
                    vec![Term::pair("context", Term::var("Goal"))],
                )],
            ),
            "suggest a follow-up goal from recent memory",
        ),
        seed(
            Term::structure("discover_tools_for", vec![Term::var("Strategy")]),
            llm_generate(Term::var("Strategy"), "TOOLS"),
            "ask the model for tools that would help a strategy",
        ),
        seed(
            Term::structure("needs_clarification", vec![Term::var("Question")]),
            Term::structure(
                "user_interaction",
                vec![Term::structure(
                    "params",
                    vec![Term::pair("prompt", Term::var("Question"))],
                )],
            ),
            "route ambiguous work to the user",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::unify;

    #[test]
    fn test_seed_rules_unify_with_their_triggers() {
        let rules = bootstrap_rules();
        let triggers = [
            Term::structure(
                "synthesize_failure_rule",
                vec![Term::atom("some-id"), Term::atom("timeout")],
            ),
            Term::structure("propose_related_goal", vec![Term::atom("trip")]),
            Term::structure("discover_tools_for", vec![Term::atom("research")]),
            Term::structure("needs_clarification", vec![Term::atom("which one?")]),
        ];
        for trigger in &triggers {
            assert!(
                rules.iter().any(|rule| unify(&rule.pattern, trigger).is_some()),
                "no seed rule matches {}",
                trigger
            );
        }
    }

    #[test]
    fn test_seed_rules_have_structured_actions() {
        for rule in bootstrap_rules() {
            assert!(rule.action.as_struct().is_some());
            assert_eq!(
                rule.metadata.get("source"),
                Some(&Value::from("bootstrap"))
            );
        }
    }
}
