//! Asking a sub-question never forces its sub-answer promise. Spawning a
//! child session just enqueues it; nothing about `Ask` itself touches the
//! child's `sub_answer` slot, and the parent is free to keep working (or
//! even reply) without ever unlocking it.

use hch_actions::Action;
use hch_context::Context;
use hch_datastore::{Datastore, Lookup};
use hch_hypertext::Hypertext;
use hch_scheduler::{Driver, Scheduler, SessionId};
use std::collections::{HashMap, VecDeque};

struct Script(VecDeque<Action>);
impl Driver for Script {
    fn prompt(&mut self, _store: &mut Datastore<Hypertext>, _context: &Context, _rendering: &str) -> Option<Action> {
        Some(self.0.pop_front().expect("script exhausted"))
    }
}

#[test]
fn ask_never_touches_the_childs_promise() {
    let mut store = Datastore::new();
    let q = store.allocate_filled(Hypertext::text("root question"));
    let s = store.allocate_filled(Hypertext::text(""));
    let root = hch_workspace::build(&mut store, None, q, s, Vec::new());
    let ctx = Context::default_for(&store, root).unwrap();

    let mut scheduler = Scheduler::new(ctx);
    let mut driver = Script(VecDeque::from([Action::Ask(Hypertext::text("a sub question nobody reads"))]));
    let mut cache = HashMap::new();

    // One step: the root session asks, spawning a child and re-enqueuing
    // itself. Stop here deliberately, at the point where laziness is
    // decided, before the scheduler's round-robin ever visits the child.
    let result = scheduler.step(&mut store, &mut driver, &mut cache).unwrap();
    assert!(result.is_none());
    assert_eq!(scheduler.ready_len(), 2);

    let root_ctx = scheduler
        .session_context(scheduler.root_id())
        .expect("root session still live")
        .clone();
    let w = hch_workspace::get(&store, root_ctx.workspace).unwrap();
    assert_eq!(w.subentries.len(), 1);
    let sub_answer = w.subentries[0].sub_answer;

    assert!(matches!(store.lookup(sub_answer).unwrap(), Lookup::Pending));
    assert!(!root_ctx.unlocked.contains(&sub_answer));

    // The child session exists, ready to run, but nothing has resolved its
    // promise merely by virtue of being spawned.
    let child = SessionId::from_raw(1);
    assert!(scheduler.session_context(child).is_some());
}
