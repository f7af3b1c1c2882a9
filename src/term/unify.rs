//! First-order unification with an occurs check, plus rule matching
//!
//! `unify` produces a minimal substitution, `apply` resolves a term
//! through one, and `find_and_sample` is the rule-selection entry point:
//! it unifies a thought against every rule pattern and draws one match
//! with probability proportional to belief score, optionally boosted by
//! embedding similarity.

use std::collections::HashMap;

use chrono::Utc;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::embedding::similarity_boost;
use crate::types::{Rule, RuleId, Thought};

use super::Term;

/// A substitution from variable names to terms.
pub type Bindings = HashMap<String, Term>;

/// A rule selected for a thought, with the unifying substitution.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub rule: Rule,
    pub bindings: Bindings,
}

/// Unify two terms, returning the substitution that makes them equal.
///
/// Returns `None` on any mismatch: differing atom names, differing
/// structure heads or arities, differing list lengths, or an occurs-check
/// violation (binding a variable to a term containing itself).
pub fn unify(t1: &Term, t2: &Term) -> Option<Bindings> {
    let mut bindings = Bindings::new();
    if unify_into(t1, t2, &mut bindings) {
        Some(bindings)
    } else {
        None
    }
}

fn unify_into(t1: &Term, t2: &Term, bindings: &mut Bindings) -> bool {
    let t1 = resolve(t1, bindings);
    let t2 = resolve(t2, bindings);
    match (&t1, &t2) {
        (Term::Var(a), Term::Var(b)) if a == b => true,
        (Term::Var(name), other) | (other, Term::Var(name)) => {
            if occurs(name, other, bindings) {
                return false;
            }
            bindings.insert(name.clone(), other.clone());
            true
        }
        (Term::Atom(a), Term::Atom(b)) => a == b,
        (Term::Struct(n1, args1), Term::Struct(n2, args2)) => {
            n1 == n2
                && args1.len() == args2.len()
                && args1
                    .iter()
                    .zip(args2)
                    .all(|(a, b)| unify_into(a, b, bindings))
        }
        (Term::List(e1), Term::List(e2)) => {
            e1.len() == e2.len()
                && e1
                    .iter()
                    .zip(e2)
                    .all(|(a, b)| unify_into(a, b, bindings))
        }
        _ => false,
    }
}

/// Chase a variable through the binding union until it hits a non-variable
/// term or an unbound variable.
fn resolve(term: &Term, bindings: &Bindings) -> Term {
    let mut current = term;
    while let Term::Var(name) = current {
        match bindings.get(name) {
            Some(next) => current = next,
            None => break,
        }
    }
    current.clone()
}

/// Occurs check: does `name` appear anywhere in `term`, chasing bound
/// variables through the substitution?
fn occurs(name: &str, term: &Term, bindings: &Bindings) -> bool {
    match term {
        Term::Var(v) => {
            v == name
                || bindings
                    .get(v)
                    .is_some_and(|bound| occurs(name, bound, bindings))
        }
        Term::Struct(_, args) | Term::List(args) => {
            args.iter().any(|arg| occurs(name, arg, bindings))
        }
        Term::Atom(_) => false,
    }
}

/// Capture-free substitution, fully resolving chains of
/// variable-to-variable bindings. Unbound variables are left in place.
pub fn apply(term: &Term, bindings: &Bindings) -> Term {
    match term {
        Term::Var(name) => match bindings.get(name) {
            Some(bound) => apply(bound, bindings),
            None => term.clone(),
        },
        Term::Atom(_) => term.clone(),
        Term::Struct(name, args) => Term::Struct(
            name.clone(),
            args.iter().map(|arg| apply(arg, bindings)).collect(),
        ),
        Term::List(elements) => Term::List(
            elements.iter().map(|e| apply(e, bindings)).collect(),
        ),
    }
}

/// Unify a thought against every rule pattern and sample one match.
///
/// Each unifying rule is weighted by its belief score (decayed at read
/// time when `decay_rate_per_milli > 0`). When the thought carries an
/// embedding and `boost_factor > 0`, a rule with a cached embedding has
/// its weight multiplied by `1 + clamp01(cos) * boost_factor`. One
/// candidate is drawn with probability proportional to weight; returns
/// `None` when no rule unifies or every weight is non-positive.
pub fn find_and_sample<R: Rng + ?Sized>(
    thought: &Thought,
    rules: &[Rule],
    boost_factor: f64,
    rule_embeddings: &HashMap<RuleId, Vec<f32>>,
    decay_rate_per_milli: f64,
    rng: &mut R,
) -> Option<RuleMatch> {
    let now = Utc::now();
    let thought_embedding = thought.metadata.embedding();

    let mut candidates = Vec::new();
    let mut weights = Vec::new();
    for rule in rules {
        let Some(bindings) = unify(&rule.pattern, &thought.content) else {
            continue;
        };
        let base = rule.belief.decayed_score(decay_rate_per_milli, now);
        let boost = similarity_boost(
            thought_embedding.as_deref(),
            rule_embeddings.get(&rule.id).map(Vec::as_slice),
            boost_factor,
        );
        let weight = base * boost;
        if weight.is_finite() && weight > 0.0 {
            candidates.push(RuleMatch {
                rule: rule.clone(),
                bindings,
            });
            weights.push(weight);
        }
    }

    let dist = WeightedIndex::new(&weights).ok()?;
    let index = dist.sample(rng);
    candidates.into_iter().nth(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metadata, Thought, ThoughtKind};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn atom(name: &str) -> Term {
        Term::atom(name)
    }

    fn var(name: &str) -> Term {
        Term::var(name)
    }

    #[test]
    fn test_unify_atoms() {
        assert!(unify(&atom("a"), &atom("a")).is_some());
        assert!(unify(&atom("a"), &atom("b")).is_none());
    }

    #[test]
    fn test_unify_binds_variable() {
        let bindings = unify(&var("X"), &atom("a")).unwrap();
        assert_eq!(bindings.get("X"), Some(&atom("a")));
    }

    #[test]
    fn test_unify_structs() {
        let pattern = Term::structure("f", vec![var("X"), atom("b")]);
        let value = Term::structure("f", vec![atom("a"), atom("b")]);
        let bindings = unify(&pattern, &value).unwrap();
        assert_eq!(bindings.get("X"), Some(&atom("a")));
    }

    #[test]
    fn test_unify_arity_mismatch_fails() {
        let a = Term::structure("f", vec![atom("a")]);
        let b = Term::structure("f", vec![atom("a"), atom("b")]);
        assert!(unify(&a, &b).is_none());
    }

    #[test]
    fn test_unify_head_mismatch_fails() {
        let a = Term::structure("f", vec![atom("a")]);
        let b = Term::structure("g", vec![atom("a")]);
        assert!(unify(&a, &b).is_none());
    }

    #[test]
    fn test_unify_list_length_mismatch_fails() {
        let a = Term::list(vec![atom("a")]);
        let b = Term::list(vec![atom("a"), atom("b")]);
        assert!(unify(&a, &b).is_none());
    }

    #[test]
    fn test_occurs_check() {
        // X against f(X) must fail rather than build an infinite term.
        let x = var("X");
        let fx = Term::structure("f", vec![var("X")]);
        assert!(unify(&x, &fx).is_none());
    }

    #[test]
    fn test_occurs_check_through_chain() {
        // X = Y, then Y against f(X) must still fail.
        let lhs = Term::structure("p", vec![var("X"), var("Y")]);
        let rhs = Term::structure("p", vec![var("Y"), Term::structure("f", vec![var("X")])]);
        assert!(unify(&lhs, &rhs).is_none());
    }

    #[test]
    fn test_variable_chain_resolution() {
        // X = Y and Y = a: applying either variable yields a.
        let lhs = Term::structure("p", vec![var("X"), var("Y")]);
        let rhs = Term::structure("p", vec![var("Y"), atom("a")]);
        let bindings = unify(&lhs, &rhs).unwrap();
        assert_eq!(apply(&var("X"), &bindings), atom("a"));
        assert_eq!(apply(&var("Y"), &bindings), atom("a"));
    }

    #[test]
    fn test_apply_leaves_unbound_vars() {
        let bindings = Bindings::new();
        assert_eq!(apply(&var("X"), &bindings), var("X"));
    }

    #[test]
    fn test_apply_substitutes_nested() {
        let mut bindings = Bindings::new();
        bindings.insert("X".to_string(), atom("a"));
        let term = Term::structure("f", vec![Term::list(vec![var("X"), atom("b")])]);
        let expected = Term::structure("f", vec![Term::list(vec![atom("a"), atom("b")])]);
        assert_eq!(apply(&term, &bindings), expected);
    }

    #[test]
    fn test_find_and_sample_requires_unification() {
        let thought = Thought::new(
            ThoughtKind::Input,
            Term::structure("f", vec![atom("a")]),
            Metadata::new(),
        );
        let matching = Rule::new(Term::structure("f", vec![var("X")]), atom("act1"));
        let other = Rule::new(Term::structure("g", vec![var("X")]), atom("act2"));
        let rules = vec![matching.clone(), other];

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let selected = find_and_sample(&thought, &rules, 0.0, &HashMap::new(), 0.0, &mut rng)
                .expect("one rule unifies");
            assert_eq!(selected.rule.id, matching.id);
            assert_eq!(selected.bindings.get("X"), Some(&atom("a")));
        }
    }

    #[test]
    fn test_find_and_sample_none_when_nothing_unifies() {
        let thought = Thought::new(ThoughtKind::Input, atom("x"), Metadata::new());
        let rules = vec![Rule::new(Term::structure("f", vec![var("X")]), atom("a"))];
        let mut rng = StdRng::seed_from_u64(7);
        assert!(find_and_sample(&thought, &rules, 0.0, &HashMap::new(), 0.0, &mut rng).is_none());
    }

    #[test]
    fn test_find_and_sample_weights_follow_belief() {
        let thought = Thought::new(ThoughtKind::Input, atom("x"), Metadata::new());
        let mut strong = Rule::new(var("A"), atom("strong"));
        for _ in 0..6 {
            strong.belief.update(true);
        }
        let weak = Rule::new(var("B"), atom("weak"));
        let rules = vec![strong.clone(), weak];

        // strong: (7+1)/(7+1+2) = 0.8, weak: (1+1)/(1+1+2) = 0.5
        let mut rng = StdRng::seed_from_u64(42);
        let mut strong_hits = 0usize;
        let draws = 10_000usize;
        for _ in 0..draws {
            let selected =
                find_and_sample(&thought, &rules, 0.0, &HashMap::new(), 0.0, &mut rng).unwrap();
            if selected.rule.id == strong.id {
                strong_hits += 1;
            }
        }
        let frequency = strong_hits as f64 / draws as f64;
        let expected = 0.8 / 1.3;
        assert!(
            (frequency - expected).abs() < 0.02,
            "frequency {} too far from {}",
            frequency,
            expected
        );
    }
}
