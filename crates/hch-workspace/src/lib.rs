//! Workspace.
//!
//! Pure constructors over [`hch_hypertext::WorkspaceNode`], interned through
//! the datastore exactly like any other hypertext. A workspace is
//! immutable: every update (new scratchpad, new sub-question, ...) builds a
//! brand new `WorkspaceNode` with the previous workspace recorded as its
//! predecessor, rather than mutating in place. This is what lets contexts
//! derived from a workspace be reproducible for automation replay.

use hch_datastore::{Address, Datastore, Lookup};
use hch_hypertext::{Hypertext, SubEntry, WorkspaceNode};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkspaceError {
    #[error("address {0} is not a filled workspace")]
    NotAWorkspace(Address),
}

/// Intern a brand new workspace record.
pub fn build(
    store: &mut Datastore<Hypertext>,
    predecessor: Option<Address>,
    question: Address,
    scratchpad: Address,
    subentries: Vec<SubEntry>,
) -> Address {
    let node = WorkspaceNode {
        predecessor,
        question,
        scratchpad,
        subentries,
    };
    let addr = store.allocate_filled(Hypertext::workspace(node));
    debug!(target: "hch_workspace", %addr, "workspace built");
    addr
}

fn fetch(store: &Datastore<Hypertext>, addr: Address) -> Result<WorkspaceNode, WorkspaceError> {
    match store.lookup(addr).map_err(|_| WorkspaceError::NotAWorkspace(addr))? {
        Lookup::Filled(Hypertext::Workspace(w)) => Ok(w.clone()),
        _ => Err(WorkspaceError::NotAWorkspace(addr)),
    }
}

/// Build a successor workspace that replaces the scratchpad. Predecessor
/// is set to `current`; question and sub-entries are carried over
/// unchanged.
pub fn with_new_scratchpad(
    store: &mut Datastore<Hypertext>,
    current: Address,
    new_scratchpad: Address,
) -> Result<Address, WorkspaceError> {
    let w = fetch(store, current)?;
    Ok(build(
        store,
        Some(current),
        w.question,
        new_scratchpad,
        w.subentries,
    ))
}

/// Build a successor workspace with one new trailing sub-entry appended.
/// `sub_answer` and `sub_workspace` are expected to be fresh promise
/// addresses; `sub_question` is the already-interned subquestion.
pub fn with_new_subentry(
    store: &mut Datastore<Hypertext>,
    current: Address,
    sub_question: Address,
    sub_answer: Address,
    sub_workspace: Address,
) -> Result<Address, WorkspaceError> {
    let mut w = fetch(store, current)?;
    w.subentries.push(SubEntry {
        sub_question,
        sub_answer,
        sub_workspace,
    });
    Ok(build(
        store,
        Some(current),
        w.question,
        w.scratchpad,
        w.subentries,
    ))
}

/// Build the fresh child workspace an `Ask` spawns: its question is the
/// subquestion just interned, its predecessor is the *current* (pre-Ask)
/// workspace, and it starts with an empty scratchpad and no sub-entries.
pub fn build_child(
    store: &mut Datastore<Hypertext>,
    current: Address,
    sub_question: Address,
    empty_scratchpad: Address,
) -> Address {
    build(store, Some(current), sub_question, empty_scratchpad, Vec::new())
}

/// Fetch a workspace's fields by address, for rendering/context derivation.
pub fn get(store: &Datastore<Hypertext>, addr: Address) -> Result<WorkspaceNode, WorkspaceError> {
    fetch(store, addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_store() -> Datastore<Hypertext> {
        Datastore::new()
    }

    #[test]
    fn identical_workspaces_dedupe() {
        let mut store = empty_store();
        let q = store.allocate_filled(Hypertext::text("question"));
        let s = store.allocate_filled(Hypertext::text("scratch"));
        let a = build(&mut store, None, q, s, Vec::new());
        let b = build(&mut store, None, q, s, Vec::new());
        assert_eq!(a, b);
    }

    #[test]
    fn scratch_produces_new_address_with_predecessor() {
        let mut store = empty_store();
        let q = store.allocate_filled(Hypertext::text("question"));
        let s0 = store.allocate_filled(Hypertext::text(""));
        let root = build(&mut store, None, q, s0, Vec::new());

        let s1 = store.allocate_filled(Hypertext::text("notes"));
        let successor = with_new_scratchpad(&mut store, root, s1).unwrap();
        assert_ne!(successor, root);

        let node = get(&store, successor).unwrap();
        assert_eq!(node.predecessor, Some(root));
        assert_eq!(node.scratchpad, s1);
    }

    #[test]
    fn ask_appends_subentry_and_spawns_child() {
        let mut store = empty_store();
        let q = store.allocate_filled(Hypertext::text("root question"));
        let s0 = store.allocate_filled(Hypertext::text(""));
        let root = build(&mut store, None, q, s0, Vec::new());

        let sub_q = store.allocate_filled(Hypertext::text("sub question"));
        let sub_a = store.allocate_promise();
        let sub_w = store.allocate_promise();
        let successor = with_new_subentry(&mut store, root, sub_q, sub_a, sub_w).unwrap();

        let child_scratch = store.allocate_filled(Hypertext::text(""));
        let child = build_child(&mut store, root, sub_q, child_scratch);

        let successor_node = get(&store, successor).unwrap();
        assert_eq!(successor_node.subentries.len(), 1);
        assert_eq!(successor_node.subentries[0].sub_question, sub_q);

        let child_node = get(&store, child).unwrap();
        assert_eq!(child_node.predecessor, Some(root));
        assert_eq!(child_node.question, sub_q);
    }
}
