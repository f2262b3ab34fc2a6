//! A cached automation chain that cycles back to a rendering it has
//! already revisited falls back to the driver instead of looping forever.
//! Two distinct contexts can render identically here because a locked
//! predecessor always shows as the fixed token `$p`, never the address
//! behind it, so alternating `Scratch("A")` / `Scratch("B")` from the same
//! starting point re-creates the same two rendered strings indefinitely.

use hch_actions::Action;
use hch_context::Context;
use hch_datastore::Datastore;
use hch_hypertext::{Fragment, Hypertext};
use hch_scheduler::{Driver, Scheduler};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

struct CountingDriver {
    calls: Arc<Mutex<u32>>,
    replies: VecDeque<Action>,
}

impl Driver for CountingDriver {
    fn prompt(&mut self, _store: &mut Datastore<Hypertext>, _context: &Context, _rendering: &str) -> Option<Action> {
        *self.calls.lock().unwrap() += 1;
        Some(self.replies.pop_front().expect("driver prompted more than expected"))
    }
}

#[test]
fn revisiting_a_cached_rendering_breaks_automation_and_prompts_once() {
    let mut store = Datastore::new();
    let q = store.allocate_filled(Hypertext::text("loop question"));
    let s0 = store.allocate_filled(Hypertext::text(""));
    let root_ws = hch_workspace::build(&mut store, None, q, s0, Vec::new());

    let s_a = store.allocate_filled(Hypertext::text("A"));
    let ws1 = hch_workspace::with_new_scratchpad(&mut store, root_ws, s_a).unwrap();
    let ctx1 = Context::default_for(&store, ws1).unwrap();
    let r1 = ctx1.render(&store).unwrap();

    let s_b = store.allocate_filled(Hypertext::text("B"));
    let ws2 = hch_workspace::with_new_scratchpad(&mut store, ws1, s_b).unwrap();
    let ctx2 = Context::default_for(&store, ws2).unwrap();
    let r2 = ctx2.render(&store).unwrap();

    // Scratching back to "A" from ws2 renders exactly like ctx1, even though
    // it is a different, later workspace address.
    let ws3 = hch_workspace::with_new_scratchpad(&mut store, ws2, s_a).unwrap();
    let ctx3 = Context::default_for(&store, ws3).unwrap();
    assert_eq!(ctx3.render(&store).unwrap(), r1);

    let mut cache = HashMap::new();
    cache.insert(r1.clone(), Action::Scratch(Hypertext::text("B")));
    cache.insert(r2.clone(), Action::Scratch(Hypertext::text("A")));

    let calls = Arc::new(Mutex::new(0));
    let mut driver = CountingDriver {
        calls: calls.clone(),
        replies: VecDeque::from([Action::Reply(Hypertext::text("breaking the loop"))]),
    };

    let mut scheduler = Scheduler::new(ctx1);
    let answer = scheduler.run(&mut store, &mut driver, &mut cache).unwrap();

    assert_eq!(*calls.lock().unwrap(), 1, "driver should be consulted exactly once, to break the cycle");
    match store.lookup(answer).unwrap() {
        hch_datastore::Lookup::Filled(Hypertext::Raw(r)) => {
            assert_eq!(r.fragments, vec![Fragment::Text("breaking the loop".into())]);
        }
        _ => panic!("expected filled raw answer"),
    }
    assert_eq!(cache.len(), 2, "no new rendering was introduced, just the R1 entry replaced");
}
