//! `Delta::fold`: collapse a modification sequence into net changes.
//!
//! The replay keeps a working map from each page's *current* path to where
//! it came from (`Origin`) and its pending content. Paths whose original
//! page is gone by the end of the range are kept in a separate set.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use junction_core::{Modification, ModificationKind, NetChange};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Origin {
    /// The page existed at this path before the range.
    Existing(PathBuf),
    /// The page was created inside the range.
    New,
}

#[derive(Debug, Clone)]
struct Entry {
    origin: Origin,
    content: Option<String>,
}

#[derive(Debug, Default)]
struct Replay {
    current: BTreeMap<PathBuf, Entry>,
    deleted: BTreeSet<PathBuf>,
}

impl Replay {
    fn apply(&mut self, m: &Modification) {
        match m.kind {
            ModificationKind::Added => {
                let Some(path) = m.new_path.as_ref() else { return };
                self.displace(path);
                let entry = self.reuse_or_new(path, m.content.clone());
                self.current.insert(path.clone(), entry);
            }
            ModificationKind::Modified => {
                let Some(path) = m.new_path.as_ref().or(m.old_path.as_ref()) else {
                    return;
                };
                match self.current.get_mut(path) {
                    Some(entry) => entry.content = m.content.clone(),
                    None => {
                        let entry = self.reuse_or_existing(path, m.content.clone());
                        self.current.insert(path.clone(), entry);
                    }
                }
            }
            ModificationKind::Deleted => {
                let Some(path) = m.old_path.as_ref().or(m.new_path.as_ref()) else {
                    return;
                };
                match self.current.remove(path) {
                    Some(entry) => self.forget(entry),
                    None => {
                        self.deleted.insert(path.clone());
                    }
                }
            }
            ModificationKind::Renamed => {
                let (Some(old), Some(new)) = (m.old_path.as_ref(), m.new_path.as_ref()) else {
                    return;
                };
                if old == new {
                    let modified = Modification {
                        kind: ModificationKind::Modified,
                        ..m.clone()
                    };
                    if m.content.is_some() {
                        self.apply(&modified);
                    }
                    return;
                }
                let moving = self.current.remove(old).unwrap_or(Entry {
                    origin: Origin::Existing(old.clone()),
                    content: None,
                });
                let content = m.content.clone().or(moving.content.clone());
                self.displace(new);
                if self.deleted.remove(new) {
                    // The target's original page was deleted earlier: keep
                    // that identity and retire the one being renamed.
                    self.forget(moving);
                    self.current.insert(
                        new.clone(),
                        Entry {
                            origin: Origin::Existing(new.clone()),
                            content,
                        },
                    );
                } else {
                    self.current.insert(
                        new.clone(),
                        Entry {
                            origin: moving.origin,
                            content,
                        },
                    );
                }
            }
        }
    }

    /// An add onto a path whose page was deleted earlier keeps its identity.
    fn reuse_or_new(&mut self, path: &Path, content: Option<String>) -> Entry {
        let origin = if self.deleted.remove(path) {
            Origin::Existing(path.to_path_buf())
        } else {
            Origin::New
        };
        Entry { origin, content }
    }

    fn reuse_or_existing(&mut self, path: &Path, content: Option<String>) -> Entry {
        self.deleted.remove(path);
        Entry {
            origin: Origin::Existing(path.to_path_buf()),
            content,
        }
    }

    /// Whatever currently sits at `path` is overwritten.
    fn displace(&mut self, path: &Path) {
        if let Some(old) = self.current.remove(path) {
            self.forget(old);
        }
    }

    fn forget(&mut self, entry: Entry) {
        if let Origin::Existing(origin) = entry.origin {
            self.deleted.insert(origin);
        }
    }

    fn finish(mut self) -> Vec<NetChange> {
        let mut changes = Vec::new();
        for (path, entry) in std::mem::take(&mut self.current) {
            match entry.origin {
                // The page that held this path was deleted after the add.
                Origin::New if self.deleted.remove(&path) => {
                    changes.push(NetChange::Update {
                        path,
                        content: entry.content.unwrap_or_default(),
                    });
                }
                Origin::New => {
                    changes.push(NetChange::Create {
                        path,
                        content: entry.content.unwrap_or_default(),
                    });
                }
                Origin::Existing(origin) if origin == path => {
                    if let Some(content) = entry.content {
                        changes.push(NetChange::Update { path, content });
                    }
                }
                Origin::Existing(origin) => changes.push(NetChange::Move {
                    from: origin,
                    to: path,
                    content: entry.content,
                }),
            }
        }
        changes.extend(self.deleted.into_iter().map(|path| NetChange::Delete { path }));
        sort_changes(&mut changes);
        changes
    }
}

/// Fold an ordered modification sequence into at most one change per path.
pub fn fold(modifications: &[Modification]) -> Vec<NetChange> {
    let mut replay = Replay::default();
    for m in modifications {
        replay.apply(m);
    }
    let changes = replay.finish();
    tracing::debug!(
        modifications = modifications.len(),
        changes = changes.len(),
        "folded modification sequence"
    );
    changes
}

/// Re-express a net change set as modifications that replay correctly in
/// sequence, so `fold(to_modifications(fold(xs)) ++ ys) == fold(xs ++ ys)`.
pub fn to_modifications(changes: &[NetChange]) -> Vec<Modification> {
    let mods: Vec<Modification> = changes.iter().map(NetChange::to_modification).collect();
    order_for_replay(mods)
}

/// Order the modifications of a single commit so that replaying them one at
/// a time never passes through a state the commit did not intend: deletes
/// first, then renames (a rename vacating a path before the rename that
/// occupies it), then adds and modifications.
pub fn order_for_replay(modifications: Vec<Modification>) -> Vec<Modification> {
    let mut deletes = Vec::new();
    let mut renames = Vec::new();
    let mut rest = Vec::new();
    for m in modifications {
        match m.kind {
            ModificationKind::Deleted => deletes.push(m),
            ModificationKind::Renamed => renames.push(m),
            ModificationKind::Added | ModificationKind::Modified => rest.push(m),
        }
    }
    let mut ordered = deletes;
    ordered.extend(order_renames(renames));
    ordered.extend(rest);
    ordered
}

/// Renames sorted so that a rename whose target is another rename's source
/// runs after it. Rename cycles (swaps) cannot be serialized; they are
/// emitted in chain order.
fn order_renames(renames: Vec<Modification>) -> Vec<Modification> {
    let by_source: HashMap<&Path, usize> = renames
        .iter()
        .enumerate()
        .filter_map(|(i, m)| m.old_path.as_deref().map(|p| (p, i)))
        .collect();

    let mut emitted = vec![false; renames.len()];
    let mut order = Vec::with_capacity(renames.len());
    for start in 0..renames.len() {
        // Walk the chain of renames that must go first.
        let mut chain = Vec::new();
        let mut cursor = Some(start);
        while let Some(i) = cursor {
            if emitted[i] || chain.contains(&i) {
                break;
            }
            chain.push(i);
            cursor = renames[i]
                .new_path
                .as_deref()
                .and_then(|target| by_source.get(target).copied());
        }
        for i in chain.into_iter().rev() {
            if !emitted[i] {
                emitted[i] = true;
                order.push(i);
            }
        }
    }

    let mut slots: Vec<Option<Modification>> = renames.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

/// Deterministic order of a change set: by final path, then change type.
pub(crate) fn sort_changes(changes: &mut [NetChange]) {
    changes.sort_by(|a, b| {
        a.final_path()
            .cmp(b.final_path())
            .then_with(|| rank(a).cmp(&rank(b)))
    });
}

fn rank(change: &NetChange) -> u8 {
    match change {
        NetChange::Delete { .. } => 0,
        NetChange::Move { .. } => 1,
        NetChange::Create { .. } => 2,
        NetChange::Update { .. } => 3,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
