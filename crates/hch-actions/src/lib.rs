//! Actions.
//!
//! Four inert values a human (or an automation replay) can produce against
//! a context. `apply` is the single dispatcher, called once per turn; it
//! owns no state of its own. Everything it needs comes in as parameters
//! and everything it does is reported back in an [`ActionOutcome`] for the
//! scheduler to act on.

use hch_context::{Context, ContextError};
use hch_datastore::{Address, AwaitOutcome, Datastore, DatastoreError, Lookup, WakeToken};
use hch_hypertext::Hypertext;
use hch_workspace::WorkspaceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Datastore(#[from] DatastoreError),
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// The four action variants a session can take against its context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Ask(Hypertext),
    Reply(Hypertext),
    Unlock(String),
    Scratch(Hypertext),
}

/// A freshly spawned child session, produced only by `Ask`. The scheduler
/// pushes it onto the ready queue; when it eventually replies, the reply
/// must fulfil exactly `reply_target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedSession {
    pub context: Context,
    pub reply_target: (Address, Address),
}

/// Everything `apply` reports back, for the scheduler to fold into its
/// session table and ready/parked queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// The context the acting session continues with (unchanged workspace
    /// for `Unlock`/pending-park, a successor workspace for `Ask`/`Scratch`).
    pub context: Context,
    /// Present only for `Ask`.
    pub spawned: Option<SpawnedSession>,
    /// Wake tokens now ready to fire, from a `fulfil` during `Reply`.
    pub woken: Vec<WakeToken>,
    /// Present only when this very action must itself suspend (`Unlock` of
    /// a still-pending pointer). The scheduler parks the session on this
    /// token and retries the same action when it fires.
    pub parked_on: Option<WakeToken>,
    /// True for `Reply`: the acting session is finished.
    pub terminated: bool,
    /// The interned answer address, set only by `Reply` (including the root
    /// session's own final reply, which has no `reply_target` to fulfil).
    pub answer: Option<Address>,
}

impl ActionOutcome {
    fn continuing(context: Context) -> Self {
        Self {
            context,
            spawned: None,
            woken: Vec::new(),
            parked_on: None,
            terminated: false,
            answer: None,
        }
    }
}

/// Apply one action against `context`. `reply_target` is
/// `Some((sub_answer, sub_workspace))` for every session except the root
/// one, which has no parent sub-entry to fulfil.
pub fn apply(
    action: Action,
    store: &mut Datastore<Hypertext>,
    context: &Context,
    reply_target: Option<(Address, Address)>,
) -> Result<ActionOutcome, ActionError> {
    match action {
        Action::Ask(question) => apply_ask(store, context, question),
        Action::Reply(answer) => apply_reply(store, context, reply_target, answer),
        Action::Unlock(token) => apply_unlock(store, context, &token),
        Action::Scratch(content) => apply_scratch(store, context, content),
    }
}

fn apply_ask(
    store: &mut Datastore<Hypertext>,
    context: &Context,
    question: Hypertext,
) -> Result<ActionOutcome, ActionError> {
    let sub_question = store.allocate_filled(question);
    let sub_answer = store.allocate_promise();
    let sub_workspace = store.allocate_promise();

    let successor = hch_workspace::with_new_subentry(store, context.workspace, sub_question, sub_answer, sub_workspace)?;
    let empty_scratch = store.allocate_filled(Hypertext::text(""));
    let child = hch_workspace::build_child(store, context.workspace, sub_question, empty_scratch);

    let new_context = Context::default_for(store, successor)?;
    let child_context = Context::default_for(store, child)?;
    debug!(target: "hch_actions", %successor, %child, "ask spawned child session");

    let mut outcome = ActionOutcome::continuing(new_context);
    outcome.spawned = Some(SpawnedSession {
        context: child_context,
        reply_target: (sub_answer, sub_workspace),
    });
    Ok(outcome)
}

fn apply_reply(
    store: &mut Datastore<Hypertext>,
    context: &Context,
    reply_target: Option<(Address, Address)>,
    answer: Hypertext,
) -> Result<ActionOutcome, ActionError> {
    let answer_addr = store.allocate_filled(answer);

    let mut woken = Vec::new();
    if let Some((sub_answer, sub_workspace)) = reply_target {
        let answer_content = match store.lookup(answer_addr)? {
            Lookup::Filled(h) => h.clone(),
            Lookup::Pending => unreachable!("allocate_filled never returns a pending address"),
        };
        woken.extend(store.fulfil(sub_answer, answer_content)?);

        let workspace_content = Hypertext::workspace(hch_workspace::get(store, context.workspace)?);
        woken.extend(store.fulfil(sub_workspace, workspace_content)?);
        debug!(target: "hch_actions", %sub_answer, %sub_workspace, woken = woken.len(), "reply fulfilled parent sub-entry");
    } else {
        debug!(target: "hch_actions", %answer_addr, "root session replied, program finished");
    }

    let mut outcome = ActionOutcome::continuing(context.clone());
    outcome.woken = woken;
    outcome.terminated = true;
    outcome.answer = Some(answer_addr);
    Ok(outcome)
}

fn apply_unlock(
    store: &mut Datastore<Hypertext>,
    context: &Context,
    token: &str,
) -> Result<ActionOutcome, ActionError> {
    let addr = context.resolve_pointer(store, token)?;
    let resolved = store.resolve(addr)?;
    match store.lookup(resolved)? {
        Lookup::Filled(_) => Ok(ActionOutcome::continuing(context.unlock(resolved))),
        Lookup::Pending => {
            let wake = store.new_wake_token();
            let outcome_kind = store.await_fulfilment(resolved, wake)?;
            debug_assert_eq!(outcome_kind, AwaitOutcome::Parked);
            let mut outcome = ActionOutcome::continuing(context.clone());
            outcome.parked_on = Some(wake);
            Ok(outcome)
        }
    }
}

fn apply_scratch(
    store: &mut Datastore<Hypertext>,
    context: &Context,
    content: Hypertext,
) -> Result<ActionOutcome, ActionError> {
    let new_scratch = store.allocate_filled(content);
    let successor = hch_workspace::with_new_scratchpad(store, context.workspace, new_scratch)?;
    let new_context = Context::default_for(store, successor)?;
    Ok(ActionOutcome::continuing(new_context))
}
