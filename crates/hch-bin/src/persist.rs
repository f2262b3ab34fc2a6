//! Session persistence. Walks the plain accessors `hch-datastore` and
//! `hch-scheduler` expose (`slot_snapshots`/`from_snapshot`,
//! `snapshot`/`restore`) and writes the result as JSON.

use anyhow::{Context as _, Result};
use hch_actions::Action;
use hch_datastore::Datastore;
use hch_hypertext::Hypertext;
use hch_scheduler::{Scheduler, SchedulerSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    datastore: Vec<hch_datastore::SlotSnapshot<Hypertext>>,
    automation_cache: HashMap<String, Action>,
    scheduler: SchedulerSnapshot,
}

pub struct Restored {
    pub store: Datastore<Hypertext>,
    pub automation_cache: HashMap<String, Action>,
    pub scheduler: Scheduler,
}

pub fn save(
    path: &Path,
    store: &Datastore<Hypertext>,
    automation_cache: &HashMap<String, Action>,
    scheduler: &Scheduler,
) -> Result<()> {
    let snapshot = Snapshot {
        datastore: store.slot_snapshots(),
        automation_cache: automation_cache.clone(),
        scheduler: scheduler.snapshot(),
    };
    let json = serde_json::to_string_pretty(&snapshot).context("serialising session snapshot")?;
    std::fs::write(path, json).with_context(|| format!("writing session file {}", path.display()))?;
    Ok(())
}

pub fn load(path: &Path) -> Result<Restored> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading session file {}", path.display()))?;
    let snapshot: Snapshot =
        serde_json::from_str(&text).with_context(|| format!("parsing session file {}", path.display()))?;
    let mut store = Datastore::from_snapshot(snapshot.datastore);
    let scheduler =
        Scheduler::restore(snapshot.scheduler, &mut store).context("restoring scheduler state")?;
    Ok(Restored {
        store,
        automation_cache: snapshot.automation_cache,
        scheduler,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hch_actions::Action as Act;
    use hch_context::Context;
    use hch_scheduler::Scheduler;

    #[test]
    fn round_trips_a_fresh_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut store = Datastore::new();
        let q = store.allocate_filled(Hypertext::text("hi"));
        let s = store.allocate_filled(Hypertext::text(""));
        let root = hch_workspace::build(&mut store, None, q, s, Vec::new());
        let ctx = Context::default_for(&store, root).unwrap();
        let scheduler = Scheduler::new(ctx);
        let mut cache = HashMap::new();
        cache.insert("Question: hi\n".to_string(), Act::Reply(Hypertext::text("hello")));

        save(&path, &store, &cache, &scheduler).unwrap();
        let restored = load(&path).unwrap();

        assert_eq!(restored.automation_cache.len(), 1);
        assert!(!restored.scheduler.is_finished());
        assert_eq!(restored.store.resolve(q).unwrap(), q);
    }
}
