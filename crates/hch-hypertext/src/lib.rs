//! Hypertext & Canonicalisation.
//!
//! Two node kinds: `Raw` (mixed text/child-address fragments) and
//! `Workspace` (the structured record `hch-workspace` builds). Both are
//! plain values; all storage, deduplication, and promise handling lives in
//! `hch-datastore`. This crate's only behaviour is canonical-form printing,
//! which doubles as both the interning key (`Canonicalize`) and the
//! single-level-unlock content shown for an unlocked pointer: rendering a
//! child with every pointer of its own locked is the same operation as
//! computing its canonical form under an empty unlocked set.

use hch_datastore::{Address, Canonicalize};
use serde::{Deserialize, Serialize};

/// One piece of a [`RawNode`]: literal text, or a pointer to another
/// datastore slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fragment {
    Text(String),
    Child(Address),
}

/// A mixed sequence of text and child pointers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawNode {
    pub fragments: Vec<Fragment>,
}

impl RawNode {
    pub fn new(fragments: Vec<Fragment>) -> Self {
        Self { fragments }
    }

    /// A node made of a single literal string, with no child pointers.
    pub fn text(s: impl Into<String>) -> Self {
        Self {
            fragments: vec![Fragment::Text(s.into())],
        }
    }

    pub fn child_addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.fragments.iter().filter_map(|f| match f {
            Fragment::Child(a) => Some(*a),
            Fragment::Text(_) => None,
        })
    }
}

/// One `(subQ, subA, subW)` triple of a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubEntry {
    pub sub_question: Address,
    pub sub_answer: Address,
    pub sub_workspace: Address,
}

/// The structured record `hch-workspace` builds and interns. Stored as
/// ordinary hypertext: a workspace's address is just a `Hypertext::Workspace`
/// slot like any other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceNode {
    pub predecessor: Option<Address>,
    pub question: Address,
    pub scratchpad: Address,
    pub subentries: Vec<SubEntry>,
}

/// A tree node in the datastore: either raw mixed content or a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hypertext {
    Raw(RawNode),
    Workspace(WorkspaceNode),
}

impl Hypertext {
    pub fn raw(fragments: Vec<Fragment>) -> Self {
        Hypertext::Raw(RawNode::new(fragments))
    }

    pub fn text(s: impl Into<String>) -> Self {
        Hypertext::Raw(RawNode::text(s))
    }

    pub fn workspace(node: WorkspaceNode) -> Self {
        Hypertext::Workspace(node)
    }

    pub fn as_raw(&self) -> Option<&RawNode> {
        match self {
            Hypertext::Raw(r) => Some(r),
            Hypertext::Workspace(_) => None,
        }
    }

    pub fn as_workspace(&self) -> Option<&WorkspaceNode> {
        match self {
            Hypertext::Workspace(w) => Some(w),
            Hypertext::Raw(_) => None,
        }
    }
}

impl Canonicalize for Hypertext {
    fn canonical_form(&self, resolve: &dyn Fn(Address) -> Address) -> String {
        render_locked(self, resolve)
    }

    fn direct_children(&self) -> Vec<Address> {
        match self {
            Hypertext::Raw(r) => r.child_addresses().collect(),
            Hypertext::Workspace(w) => {
                let mut v = Vec::with_capacity(w.subentries.len() * 3 + 2);
                v.extend(w.predecessor);
                v.push(w.question);
                v.push(w.scratchpad);
                for e in &w.subentries {
                    v.push(e.sub_question);
                    v.push(e.sub_answer);
                    v.push(e.sub_workspace);
                }
                v
            }
        }
    }
}

/// Render `h` with every embedded child shown as its currently resolved
/// address and nothing expanded past that one level. This serves double
/// duty: it is both the canonical printed form used for interning and
/// equality, and the single-level-unlock content shown for an unlocked
/// pointer in context rendering, where the child's own embedded pointers
/// all show locked.
pub fn render_locked(h: &Hypertext, resolve: &dyn Fn(Address) -> Address) -> String {
    match h {
        Hypertext::Raw(r) => {
            let mut out = String::new();
            for f in &r.fragments {
                match f {
                    Fragment::Text(t) => out.push_str(t),
                    Fragment::Child(a) => out.push_str(&format!("${}", resolve(*a).raw())),
                }
            }
            out
        }
        Hypertext::Workspace(w) => {
            let mut out = String::from("{predecessor=");
            match w.predecessor {
                Some(p) => out.push_str(&format!("${}", resolve(p).raw())),
                None => out.push_str("none"),
            }
            out.push_str(&format!(
                ",question=${},scratchpad=${}",
                resolve(w.question).raw(),
                resolve(w.scratchpad).raw()
            ));
            for e in &w.subentries {
                out.push_str(&format!(
                    ",sub(q=${},a=${},w=${})",
                    resolve(e.sub_question).raw(),
                    resolve(e.sub_answer).raw(),
                    resolve(e.sub_workspace).raw()
                ));
            }
            out.push('}');
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hch_datastore::Address;

    fn id(n: u64) -> Address {
        Address::new(n)
    }

    #[test]
    fn render_locked_is_idempotent_text_only() {
        let h = Hypertext::text("hello world");
        let resolve = |a: Address| a;
        let once = render_locked(&h, &resolve);
        let twice = render_locked(&Hypertext::text("hello world"), &resolve);
        assert_eq!(once, twice);
    }

    #[test]
    fn direct_children_collects_raw_pointers() {
        let h = Hypertext::raw(vec![
            Fragment::Text("a".into()),
            Fragment::Child(id(3)),
            Fragment::Text("b".into()),
            Fragment::Child(id(7)),
        ]);
        assert_eq!(h.direct_children(), vec![id(3), id(7)]);
    }

    #[test]
    fn direct_children_collects_workspace_fields_in_order() {
        let w = WorkspaceNode {
            predecessor: Some(id(1)),
            question: id(2),
            scratchpad: id(3),
            subentries: vec![SubEntry {
                sub_question: id(4),
                sub_answer: id(5),
                sub_workspace: id(6),
            }],
        };
        let h = Hypertext::workspace(w);
        assert_eq!(
            h.direct_children(),
            vec![id(1), id(2), id(3), id(4), id(5), id(6)]
        );
    }
}
