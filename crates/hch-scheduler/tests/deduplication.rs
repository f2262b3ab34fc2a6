//! Two sibling sub-questions with identical text dedupe to the same
//! `sub_question` address, but their `sub_answer` promises stay distinct
//! (promises are never canonically indexed) until one is actually filled,
//! at which point an equal second reply aliases to it rather than
//! allocating a second, distinct answer.

use hch_actions::{self, Action};
use hch_context::Context;
use hch_datastore::{Datastore, Lookup};
use hch_hypertext::Hypertext;

#[test]
fn equal_sibling_questions_dedupe_but_answers_alias_only_on_equal_reply() {
    let mut store = Datastore::new();
    let q = store.allocate_filled(Hypertext::text("root question"));
    let s = store.allocate_filled(Hypertext::text(""));
    let root = hch_workspace::build(&mut store, None, q, s, Vec::new());
    let root_ctx = Context::default_for(&store, root).unwrap();

    let first = hch_actions::apply(
        Action::Ask(Hypertext::text("same question")),
        &mut store,
        &root_ctx,
        None,
    )
    .unwrap();
    let spawned1 = first.spawned.unwrap();

    let second = hch_actions::apply(
        Action::Ask(Hypertext::text("same question")),
        &mut store,
        &first.context,
        None,
    )
    .unwrap();
    let spawned2 = second.spawned.unwrap();

    let w = hch_workspace::get(&store, second.context.workspace).unwrap();
    assert_eq!(w.subentries[0].sub_question, w.subentries[1].sub_question);
    assert_ne!(spawned1.reply_target.0, spawned2.reply_target.0);

    let reply1 = hch_actions::apply(
        Action::Reply(Hypertext::text("same answer")),
        &mut store,
        &spawned1.context,
        Some(spawned1.reply_target),
    )
    .unwrap();
    assert!(reply1.terminated);
    assert!(matches!(
        store.lookup(spawned1.reply_target.0).unwrap(),
        Lookup::Filled(_)
    ));

    let reply2 = hch_actions::apply(
        Action::Reply(Hypertext::text("same answer")),
        &mut store,
        &spawned2.context,
        Some(spawned2.reply_target),
    )
    .unwrap();
    assert!(reply2.terminated);

    assert_eq!(
        store.resolve(spawned2.reply_target.0).unwrap(),
        store.resolve(spawned1.reply_target.0).unwrap()
    );
}
