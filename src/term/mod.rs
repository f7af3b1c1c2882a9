//! Term grammar for thought content, rule patterns, and actions
//!
//! Terms are the lingua franca of the engine: thought content, rule
//! patterns, rule actions, and workflow steps are all terms. They are
//! immutable values with structural equality.

use serde::{Deserialize, Serialize};

pub mod unify;

pub use unify::{apply, find_and_sample, unify, Bindings, RuleMatch};

/// A first-order term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// A constant symbol.
    Atom(String),
    /// A unification variable.
    Var(String),
    /// A named n-ary application.
    Struct(String, Vec<Term>),
    /// An ordered heterogeneous sequence.
    List(Vec<Term>),
}

impl Term {
    pub fn atom(name: impl Into<String>) -> Self {
        Term::Atom(name.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(name.into())
    }

    pub fn structure(name: impl Into<String>, args: Vec<Term>) -> Self {
        Term::Struct(name.into(), args)
    }

    pub fn list(elements: Vec<Term>) -> Self {
        Term::List(elements)
    }

    /// Shorthand for the common `key(value)` pair encoding used in
    /// tool-call parameter structures.
    pub fn pair(key: impl Into<String>, value: Term) -> Self {
        Term::Struct(key.into(), vec![value])
    }

    /// The head symbol of an atom or structure, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Term::Atom(name) | Term::Struct(name, _) => Some(name),
            _ => None,
        }
    }

    /// View this term as a structure.
    pub fn as_struct(&self) -> Option<(&str, &[Term])> {
        match self {
            Term::Struct(name, args) => Some((name, args)),
            _ => None,
        }
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Term::Atom(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Term::List(elements) => Some(elements),
            _ => None,
        }
    }

    /// True if the term contains no variables.
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Atom(_) => true,
            Term::Var(_) => false,
            Term::Struct(_, args) | Term::List(args) => args.iter().all(Term::is_ground),
        }
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Atom(name) => write!(f, "{}", name),
            Term::Var(name) => write!(f, "?{}", name),
            Term::Struct(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Term::List(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
        }
    }
}
