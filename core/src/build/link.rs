//! Stage 5: fill `parent_id` and `child_count` across radix layers.
//!
//! For each parent weight w, the worker joins weight-(w+1) nodes to their
//! parents by truncated hierarchy key and groups the children per parent.
//! Weights can run in any order because the join is symmetric; the consumer
//! is the only writer.

use std::thread;

use ahash::AHashMap;
use crossbeam_channel::{bounded, Receiver, Sender};
use redb::ReadableTable;
use tracing::{debug, error, warn};

use crate::errors::Result;
use crate::store::{
    decode_row, encode_row, IndexStore, RadixNode, RADIX_BY_HIERARCHY, RADIX_BY_PARENT,
    RADIX_BY_WEIGHT, RADIX_NODES,
};

const GROUP_BATCH: usize = 100;
const CHANNEL_CAP: usize = 100;

/// One parent with all of its children.
#[derive(Debug, Clone)]
struct NodeChildren {
    parent_id: u64,
    child_ids: Vec<u64>,
}

/// Run stage 5. Returns the number of parents linked.
pub(crate) fn run(store: &IndexStore) -> Result<u64> {
    let max_weight = store.max_radix_weight()?;
    if max_weight < 3 {
        return Ok(0);
    }

    let (tx, rx) = bounded::<Vec<NodeChildren>>(CHANNEL_CAP);
    thread::scope(|scope| {
        for weight in 2..max_weight {
            let tx = tx.clone();
            scope.spawn(move || collect_links(store, weight, &tx));
        }
        drop(tx);
        apply_links(store, rx)
    })
}

/// Strip the tail segment (and its joining space) off a hierarchy key.
fn parent_key<'a>(hierarchy_key: &'a str, key: &str) -> Option<&'a str> {
    hierarchy_key.strip_suffix(key).map(str::trim_end)
}

/// Producer for one parent weight: group weight-(w+1) nodes under their
/// weight-w parents and ship the groups in batches.
fn collect_links(store: &IndexStore, parent_weight: u32, tx: &Sender<Vec<NodeChildren>>) {
    let child_weight = parent_weight + 1;
    let txn = match store.begin_read() {
        Ok(t) => t,
        Err(e) => {
            error!(parent_weight, error = %e, "read transaction failed");
            return;
        }
    };
    let (by_weight, nodes_t, by_key) = match (
        txn.open_table(RADIX_BY_WEIGHT),
        txn.open_table(RADIX_NODES),
        txn.open_table(RADIX_BY_HIERARCHY),
    ) {
        (Ok(a), Ok(b), Ok(c)) => (a, b, c),
        _ => {
            error!(parent_weight, "open radix tables failed");
            return;
        }
    };
    let iter = match by_weight.range((child_weight, u64::MIN)..=(child_weight, u64::MAX)) {
        Ok(it) => it,
        Err(e) => {
            error!(child_weight, error = %e, "level scan failed");
            return;
        }
    };

    let mut groups: AHashMap<u64, Vec<u64>> = AHashMap::new();
    for item in iter {
        let Ok((k, _)) = item else { continue };
        let (_, child_id) = k.value();
        let child: RadixNode = match nodes_t.get(&child_id) {
            Ok(Some(bytes)) => match decode_row(&bytes.value()) {
                Ok(n) => n,
                Err(e) => {
                    warn!(child_id, error = %e, "undecodable node skipped");
                    continue;
                }
            },
            _ => continue,
        };
        let Some(pkey) = parent_key(&child.hierarchy_key, &child.key) else {
            warn!(
                hierarchy_key = %child.hierarchy_key,
                key = %child.key,
                "key is not a suffix of its hierarchy key"
            );
            continue;
        };
        match by_key.get(pkey) {
            Ok(Some(pid)) => groups.entry(pid.value()).or_default().push(child_id),
            Ok(None) => warn!(parent = pkey, child_id, "missing parent node"),
            Err(e) => warn!(error = %e, "parent lookup failed"),
        }
    }
    debug!(parent_weight, parents = groups.len(), "hierarchy groups collected");

    let mut batch = Vec::with_capacity(GROUP_BATCH);
    for (parent_id, child_ids) in groups {
        batch.push(NodeChildren { parent_id, child_ids });
        if batch.len() >= GROUP_BATCH {
            if tx.send(std::mem::replace(&mut batch, Vec::with_capacity(GROUP_BATCH))).is_err() {
                return;
            }
        }
    }
    if !batch.is_empty() {
        let _ = tx.send(batch);
    }
}

/// Consumer: per batch, set `child_count` on each parent and `parent_id`
/// on each child, and record the parent index entries.
fn apply_links(store: &IndexStore, rx: Receiver<Vec<NodeChildren>>) -> Result<u64> {
    let mut linked = 0u64;
    for batch in rx {
        let txn = match store.begin_write() {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "transaction begin failed, batch dropped");
                continue;
            }
        };
        let mut batch_linked = 0u64;
        let outcome = (|| -> Result<()> {
            let mut nodes_t = txn.open_table(RADIX_NODES)?;
            let mut by_parent = txn.open_table(RADIX_BY_PARENT)?;
            for group in &batch {
                let bytes = nodes_t.get(&group.parent_id)?.map(|g| g.value());
                let Some(bytes) = bytes else {
                    warn!(parent_id = group.parent_id, "parent vanished, group skipped");
                    continue;
                };
                let mut parent: RadixNode = decode_row(&bytes)?;
                parent.child_count = group.child_ids.len() as u32;
                nodes_t.insert(&group.parent_id, encode_row(&parent)?)?;

                for &child_id in &group.child_ids {
                    let bytes = nodes_t.get(&child_id)?.map(|g| g.value());
                    let Some(bytes) = bytes else { continue };
                    let mut child: RadixNode = decode_row(&bytes)?;
                    child.parent_id = group.parent_id;
                    nodes_t.insert(&child_id, encode_row(&child)?)?;
                    by_parent.insert(&(group.parent_id, child_id), &())?;
                }
                batch_linked += 1;
            }
            Ok(())
        })();
        match outcome {
            Ok(()) => match txn.commit() {
                Ok(()) => linked += batch_linked,
                Err(e) => error!(error = %e, "commit failed, batch dropped"),
            },
            Err(e) => error!(error = %e, "batch write failed, rolled back"),
        }
    }
    Ok(linked)
}
