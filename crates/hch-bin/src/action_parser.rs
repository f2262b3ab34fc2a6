//! Action text grammar: `ask <hypertext>`, `reply <hypertext>`,
//! `unlock <pointer-id>`, `scratch <hypertext>`. The scheduler and action
//! dispatcher only ever see the four [`Action`] variants, never this
//! textual encoding of them.

use crate::hypertext_parser::{self, HypertextParseError};
use hch_actions::Action;
use hch_context::{Context, ContextError};
use hch_datastore::Datastore;
use hch_hypertext::Hypertext;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionParseError {
    #[error("empty action text")]
    Empty,
    #[error("unknown action verb `{0}` (expected ask/reply/unlock/scratch)")]
    UnknownVerb(String),
    #[error("`unlock` requires a pointer-id argument")]
    MissingPointerId,
    #[error(transparent)]
    Hypertext(#[from] HypertextParseError),
    #[error(transparent)]
    Pointer(#[from] ContextError),
}

/// Parse one line of driver input into an [`Action`] against `context`.
pub fn parse(
    store: &mut Datastore<Hypertext>,
    context: &Context,
    line: &str,
) -> Result<Action, ActionParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ActionParseError::Empty);
    }
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    match verb {
        "ask" => Ok(Action::Ask(hypertext_parser::parse(store, context, rest)?)),
        "reply" => Ok(Action::Reply(hypertext_parser::parse(store, context, rest)?)),
        "scratch" => Ok(Action::Scratch(hypertext_parser::parse(store, context, rest)?)),
        "unlock" => {
            if rest.is_empty() {
                return Err(ActionParseError::MissingPointerId);
            }
            // `Action::Unlock` stores the raw token and re-resolves it at
            // apply time, but an unknown pointer should be reported here,
            // immediately, rather than after the scheduler has already
            // applied the action.
            context.resolve_pointer(store, rest)?;
            Ok(Action::Unlock(rest.trim_start_matches('$').to_string()))
        }
        other => Err(ActionParseError::UnknownVerb(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_root() -> (Datastore<Hypertext>, Context) {
        let mut store = Datastore::new();
        let q = store.allocate_filled(Hypertext::text("root"));
        let s = store.allocate_filled(Hypertext::text(""));
        let root = hch_workspace::build(&mut store, None, q, s, Vec::new());
        let ctx = Context::default_for(&store, root).unwrap();
        (store, ctx)
    }

    #[test]
    fn parses_ask() {
        let (mut store, ctx) = seeded_root();
        let action = parse(&mut store, &ctx, "ask what is 1+1?").unwrap();
        assert_eq!(action, Action::Ask(Hypertext::text("what is 1+1?")));
    }

    #[test]
    fn parses_reply() {
        let (mut store, ctx) = seeded_root();
        let action = parse(&mut store, &ctx, "reply hello").unwrap();
        assert_eq!(action, Action::Reply(Hypertext::text("hello")));
    }

    #[test]
    fn parses_scratch() {
        let (mut store, ctx) = seeded_root();
        let action = parse(&mut store, &ctx, "scratch some notes").unwrap();
        assert_eq!(action, Action::Scratch(Hypertext::text("some notes")));
    }

    #[test]
    fn parses_unlock_with_dollar_prefix() {
        let (mut store, ctx) = seeded_root();
        let action = parse(&mut store, &ctx, "unlock $s").unwrap();
        assert_eq!(action, Action::Unlock("s".to_string()));
    }

    #[test]
    fn unknown_verb_is_rejected() {
        let (mut store, ctx) = seeded_root();
        let err = parse(&mut store, &ctx, "frobnicate x").unwrap_err();
        assert!(matches!(err, ActionParseError::UnknownVerb(v) if v == "frobnicate"));
    }

    #[test]
    fn unlock_without_argument_is_rejected() {
        let (mut store, ctx) = seeded_root();
        let err = parse(&mut store, &ctx, "unlock").unwrap_err();
        assert_eq!(err, ActionParseError::MissingPointerId);
    }

    #[test]
    fn unlock_unknown_pointer_is_rejected() {
        let (mut store, ctx) = seeded_root();
        let err = parse(&mut store, &ctx, "unlock $q99").unwrap_err();
        assert!(matches!(err, ActionParseError::Pointer(_)));
    }
}
