//! User-side hypertext grammar: a string with embedded bare `[ ... ]`
//! groups for inline children and `$<id>` references to pointers already
//! visible in the current context. Parsing produces an ordinary
//! `hch_hypertext::Hypertext`, with every inline group interned bottom-up
//! through the live datastore, so a bare inline bracket group is treated
//! as filled content rather than a pointer.

use hch_context::{Context, ContextError};
use hch_datastore::Datastore;
use hch_hypertext::{Fragment, Hypertext, RawNode};
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HypertextParseError {
    #[error("unterminated `[` group")]
    UnterminatedGroup,
    #[error("unexpected `]` with no matching `[`")]
    UnmatchedCloseBracket,
    #[error("empty `$` reference")]
    EmptyReference,
    #[error(transparent)]
    UnknownPointer(#[from] ContextError),
}

/// Parse `text` against `context`'s current pointer assignment, interning
/// every inline `[...]` group as filled content along the way. Children are
/// always interned before the node that contains them, bottom-up, since
/// canonicalisation requires their addresses to already be resolved.
pub fn parse(
    store: &mut Datastore<Hypertext>,
    context: &Context,
    text: &str,
) -> Result<Hypertext, HypertextParseError> {
    let mut chars = text.chars().peekable();
    let node = parse_fragments(store, context, &mut chars, false)?;
    Ok(Hypertext::Raw(node))
}

fn parse_fragments(
    store: &mut Datastore<Hypertext>,
    context: &Context,
    chars: &mut Peekable<Chars<'_>>,
    nested: bool,
) -> Result<RawNode, HypertextParseError> {
    let mut fragments = Vec::new();
    let mut literal = String::new();
    loop {
        match chars.peek() {
            None => {
                if nested {
                    return Err(HypertextParseError::UnterminatedGroup);
                }
                break;
            }
            Some(']') => {
                if nested {
                    chars.next();
                    break;
                }
                return Err(HypertextParseError::UnmatchedCloseBracket);
            }
            Some('[') => {
                chars.next();
                flush_literal(&mut fragments, &mut literal);
                let child = parse_fragments(store, context, chars, true)?;
                let child_addr = store.allocate_filled(Hypertext::Raw(child));
                fragments.push(Fragment::Child(child_addr));
            }
            Some('$') => {
                chars.next();
                let token = take_pointer_token(chars)?;
                flush_literal(&mut fragments, &mut literal);
                let addr = context.resolve_pointer(store, &token)?;
                fragments.push(Fragment::Child(addr));
            }
            Some(_) => literal.push(chars.next().expect("peeked Some")),
        }
    }
    flush_literal(&mut fragments, &mut literal);
    Ok(RawNode::new(fragments))
}

fn flush_literal(fragments: &mut Vec<Fragment>, literal: &mut String) {
    if !literal.is_empty() {
        fragments.push(Fragment::Text(std::mem::take(literal)));
    }
}

fn take_pointer_token(chars: &mut Peekable<Chars<'_>>) -> Result<String, HypertextParseError> {
    let mut token = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() {
            token.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if token.is_empty() {
        return Err(HypertextParseError::EmptyReference);
    }
    Ok(token)
}
