//! Context & Pointer Visibility.
//!
//! A context is a workspace address plus an unlocked set. This crate
//! derives the default context for a fresh workspace, produces successor
//! contexts for `Unlock`, assigns deterministic pointer-IDs, and renders
//! the presentation format shown to the driver. A context has no identity
//! beyond its rendered string, which is what makes automation replay
//! sound, so `render` is the single most load-bearing function in this
//! crate.

use hch_datastore::{Address, Datastore, Lookup};
use hch_hypertext::{Hypertext, render_locked};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("address {0} is not a filled workspace")]
    NotAWorkspace(Address),
    #[error("unknown pointer-id `{0}` in this context")]
    UnknownPointer(String),
}

/// The display identity of an address within a context: a plain number
/// for a reference embedded in ordinary text, or a tagged number for one
/// of the five reserved workspace-structural slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerId {
    Plain(u32),
    Question(u32),
    Answer(u32),
    SubWorkspace(u32),
    Scratch,
    Predecessor,
}

impl std::fmt::Display for PointerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointerId::Plain(n) => write!(f, "{n}"),
            PointerId::Question(n) => write!(f, "q{n}"),
            PointerId::Answer(n) => write!(f, "a{n}"),
            PointerId::SubWorkspace(n) => write!(f, "w{n}"),
            PointerId::Scratch => write!(f, "s"),
            PointerId::Predecessor => write!(f, "p"),
        }
    }
}

impl PointerId {
    /// Parse a pointer-id token as it appears in action/hypertext text,
    /// with or without its leading `$` (`unlock $a1`, `$3` inline).
    pub fn parse(token: &str) -> Option<PointerId> {
        let t = token.strip_prefix('$').unwrap_or(token);
        if t == "s" {
            return Some(PointerId::Scratch);
        }
        if t == "p" {
            return Some(PointerId::Predecessor);
        }
        if let Some(rest) = t.strip_prefix('q') {
            return rest.parse().ok().map(PointerId::Question);
        }
        if let Some(rest) = t.strip_prefix('a') {
            return rest.parse().ok().map(PointerId::Answer);
        }
        if let Some(rest) = t.strip_prefix('w') {
            return rest.parse().ok().map(PointerId::SubWorkspace);
        }
        t.parse().ok().map(PointerId::Plain)
    }
}

/// The deterministic pointer-ID assignment for one rendering of a context.
/// Insertion order is pre-order: predecessor, scratchpad, each sub-entry's
/// (Q, A, W) in order, then any other embedded pointer found while walking
/// the question/scratchpad/sub-question bodies, numbered 1..N. An address
/// that recurs (e.g. the same sub-question asked twice, deduped to one
/// address) keeps the id it was first assigned.
#[derive(Debug, Default)]
pub struct PointerMap {
    order: Vec<(PointerId, Address)>,
    assigned: HashMap<Address, PointerId>,
}

impl PointerMap {
    fn assign(&mut self, addr: Address, id: PointerId) {
        if self.assigned.contains_key(&addr) {
            return;
        }
        self.assigned.insert(addr, id);
        self.order.push((id, addr));
    }

    pub fn address_of(&self, id: PointerId) -> Option<Address> {
        self.order.iter().find(|(i, _)| *i == id).map(|(_, a)| *a)
    }

    pub fn id_of(&self, addr: Address) -> Option<PointerId> {
        self.assigned.get(&addr).copied()
    }

    pub fn entries(&self) -> &[(PointerId, Address)] {
        &self.order
    }
}

/// A workspace view plus a set of unlocked addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub workspace: Address,
    pub unlocked: BTreeSet<Address>,
}

impl Context {
    /// The default context for a freshly constructed workspace: question,
    /// scratchpad, and every sub-question unlocked; everything else locked.
    pub fn default_for(
        store: &Datastore<Hypertext>,
        workspace: Address,
    ) -> Result<Context, ContextError> {
        let w = hch_workspace::get(store, workspace).map_err(|_| ContextError::NotAWorkspace(workspace))?;
        let mut unlocked = BTreeSet::new();
        unlocked.insert(resolve(store, w.question));
        unlocked.insert(resolve(store, w.scratchpad));
        for e in &w.subentries {
            unlocked.insert(resolve(store, e.sub_question));
        }
        debug!(target: "hch_context", %workspace, unlocked = unlocked.len(), "default context built");
        Ok(Context { workspace, unlocked })
    }

    /// Build a successor context over the same workspace with one more
    /// address unlocked.
    pub fn unlock(&self, addr: Address) -> Context {
        let mut unlocked = self.unlocked.clone();
        unlocked.insert(addr);
        debug!(target: "hch_context", %addr, "context unlocked");
        Context {
            workspace: self.workspace,
            unlocked,
        }
    }

    /// Resolve a pointer-id token (as typed in `unlock $a1` or embedded as
    /// `$3` in new hypertext) against this context's current assignment.
    pub fn resolve_pointer(
        &self,
        store: &Datastore<Hypertext>,
        token: &str,
    ) -> Result<Address, ContextError> {
        let id = PointerId::parse(token).ok_or_else(|| ContextError::UnknownPointer(token.to_string()))?;
        let map = self.pointer_map(store)?;
        map.address_of(id)
            .ok_or_else(|| ContextError::UnknownPointer(token.to_string()))
    }

    pub fn pointer_map(&self, store: &Datastore<Hypertext>) -> Result<PointerMap, ContextError> {
        let w = hch_workspace::get(store, self.workspace).map_err(|_| ContextError::NotAWorkspace(self.workspace))?;
        let mut map = PointerMap::default();
        if let Some(p) = w.predecessor {
            map.assign(resolve(store, p), PointerId::Predecessor);
        }
        map.assign(resolve(store, w.scratchpad), PointerId::Scratch);
        for (i, e) in w.subentries.iter().enumerate() {
            let n = (i + 1) as u32;
            map.assign(resolve(store, e.sub_question), PointerId::Question(n));
            map.assign(resolve(store, e.sub_answer), PointerId::Answer(n));
            map.assign(resolve(store, e.sub_workspace), PointerId::SubWorkspace(n));
        }
        let mut plain = 1u32;
        let mut bodies = vec![w.question, w.scratchpad];
        bodies.extend(w.subentries.iter().map(|e| e.sub_question));
        for addr in bodies {
            if let Ok(Lookup::Filled(Hypertext::Raw(raw))) = store.lookup(addr) {
                for child in raw.child_addresses() {
                    let resolved = resolve(store, child);
                    if map.id_of(resolved).is_none() {
                        map.assign(resolved, PointerId::Plain(plain));
                        plain += 1;
                    }
                }
            }
        }
        Ok(map)
    }

    /// Render this context in the presentation format shown to the driver.
    pub fn render(&self, store: &Datastore<Hypertext>) -> Result<String, ContextError> {
        let w = hch_workspace::get(store, self.workspace).map_err(|_| ContextError::NotAWorkspace(self.workspace))?;
        let map = self.pointer_map(store)?;
        let mut out = String::new();
        out.push_str(&format!("Question:    {}\n", self.render_inline(store, w.question)));
        out.push_str(&format!("Scratchpad:  {}\n", self.render_inline(store, w.scratchpad)));
        for (i, e) in w.subentries.iter().enumerate() {
            let n = i + 1;
            out.push_str(&format!("Sub {}. Q: {}\n", n, self.render_inline(store, e.sub_question)));
            out.push_str(&format!(
                "       A: {}   W: {}\n",
                self.render_pointer(store, e.sub_answer, &map),
                self.render_pointer(store, e.sub_workspace, &map)
            ));
        }
        if let Some(p) = w.predecessor {
            out.push_str(&format!("Predecessor: {}\n", self.render_pointer(store, p, &map)));
        }
        Ok(out)
    }

    /// Render a field that is always unlocked by construction (question,
    /// scratchpad, sub-question): its content is shown directly, with any
    /// further embedded pointers shown locked (single-level unlock).
    fn render_inline(&self, store: &Datastore<Hypertext>, addr: Address) -> String {
        match store.lookup(addr) {
            Ok(Lookup::Filled(h)) => render_locked(h, &|a| resolve(store, a)),
            Ok(Lookup::Pending) => "…".to_string(),
            Err(_) => "?".to_string(),
        }
    }

    /// Render a field that may be locked or unlocked (predecessor, a
    /// sub-answer, a sub-workspace): `$<id>` locked, `[$<id>: <content>]`
    /// unlocked.
    fn render_pointer(&self, store: &Datastore<Hypertext>, addr: Address, map: &PointerMap) -> String {
        let resolved = resolve(store, addr);
        let id = map
            .id_of(resolved)
            .map(|i| i.to_string())
            .unwrap_or_else(|| resolved.raw().to_string());
        if self.unlocked.contains(&resolved) {
            match store.lookup(resolved) {
                Ok(Lookup::Filled(h)) => format!("[${}: {}]", id, render_locked(h, &|a| resolve(store, a))),
                Ok(Lookup::Pending) => format!("${id}"),
                Err(_) => format!("${id}"),
            }
        } else {
            format!("${id}")
        }
    }
}

fn resolve(store: &Datastore<Hypertext>, addr: Address) -> Address {
    store.resolve(addr).unwrap_or(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_root() -> (Datastore<Hypertext>, Address) {
        let mut store = Datastore::new();
        let q = store.allocate_filled(Hypertext::text("what is 1+1?"));
        let s = store.allocate_filled(Hypertext::text(""));
        let root = hch_workspace::build(&mut store, None, q, s, Vec::new());
        (store, root)
    }

    #[test]
    fn default_context_unlocks_question_and_scratchpad() {
        let (store, root) = seeded_root();
        let ctx = Context::default_for(&store, root).unwrap();
        let w = hch_workspace::get(&store, root).unwrap();
        assert!(ctx.unlocked.contains(&w.question));
        assert!(ctx.unlocked.contains(&w.scratchpad));
    }

    #[test]
    fn sub_answer_and_workspace_locked_by_default() {
        let (mut store, root) = seeded_root();
        let sub_q = store.allocate_filled(Hypertext::text("sub"));
        let sub_a = store.allocate_promise();
        let sub_w = store.allocate_promise();
        let root2 = hch_workspace::with_new_subentry(&mut store, root, sub_q, sub_a, sub_w).unwrap();

        let ctx = Context::default_for(&store, root2).unwrap();
        assert!(!ctx.unlocked.contains(&sub_a));
        assert!(!ctx.unlocked.contains(&sub_w));
        assert!(ctx.unlocked.contains(&sub_q));

        let rendered = ctx.render(&store).unwrap();
        assert!(rendered.contains("A: $a1"));
        assert!(rendered.contains("W: $w1"));
    }

    #[test]
    fn unlock_reveals_bracketed_content() {
        let (mut store, root) = seeded_root();
        let sub_q = store.allocate_filled(Hypertext::text("sub"));
        let sub_a = store.allocate_promise();
        let sub_w = store.allocate_promise();
        let root2 = hch_workspace::with_new_subentry(&mut store, root, sub_q, sub_a, sub_w).unwrap();
        store.fulfil(sub_a, Hypertext::text("2")).unwrap();

        let ctx = Context::default_for(&store, root2).unwrap();
        let unlocked = ctx.unlock(sub_a);
        let rendered = unlocked.render(&store).unwrap();
        assert!(rendered.contains("A: [$a1: 2]"));
    }

    #[test]
    fn rendering_is_a_pure_function_of_store_state() {
        let (store, root) = seeded_root();
        let ctx = Context::default_for(&store, root).unwrap();
        assert_eq!(ctx.render(&store).unwrap(), ctx.render(&store).unwrap());
    }

    #[test]
    fn pointer_id_round_trips_through_parse_and_display() {
        for id in [
            PointerId::Plain(3),
            PointerId::Question(1),
            PointerId::Answer(2),
            PointerId::SubWorkspace(4),
            PointerId::Scratch,
            PointerId::Predecessor,
        ] {
            let text = format!("${id}");
            assert_eq!(PointerId::parse(&text), Some(id));
        }
    }
}
