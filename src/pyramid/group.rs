//! Bottom-up grouping of tile assets into a prefix tree of aggregate assets

use std::collections::{BTreeMap, HashMap};

use log::{debug, info};
use rayon::prelude::*;

use super::address::{Address, BRANCHING};
use crate::asset::{AssetRef, AssetSink};
use crate::error::{Result, TilerError};

/// The persisted group hierarchy
#[derive(Clone, Debug)]
pub struct GroupTree {
    pub root: AssetRef,
    /// Child addresses of every group, ordered by digit
    pub members: BTreeMap<Address, Vec<Address>>,
}

impl GroupTree {
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.members.len()
    }

    /// Longest root-to-leaf path, counted in groups
    #[must_use]
    pub fn depth(&self) -> usize {
        self.members
            .keys()
            .map(|prefix| prefix.len() + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Group `leaves` by address prefix, one digit at a time, until only the root is left.
///
/// `content` maps prefixes to coarser-LOD tiles; a group whose prefix has a
/// tile uses it as its own renderable content. Groups of one prefix length
/// are written in parallel; each length waits for the longer one to finish.
pub fn aggregate(
    sink: &dyn AssetSink,
    leaves: Vec<AssetRef>,
    content: &HashMap<Address, AssetRef>,
) -> Result<GroupTree> {
    if leaves.is_empty() {
        return Err(TilerError::configuration("no tiles to group"));
    }

    // nodes waiting for a parent, keyed by address length
    let mut pending: BTreeMap<usize, BTreeMap<Address, AssetRef>> = BTreeMap::new();
    for leaf in leaves {
        insert_unique(&mut pending, leaf)?;
    }

    let longest = pending.keys().next_back().copied().unwrap_or(0);
    let mut members = BTreeMap::new();

    for len in (1..=longest).rev() {
        let Some(nodes) = pending.remove(&len) else {
            continue;
        };

        let mut parents: BTreeMap<Address, Vec<AssetRef>> = BTreeMap::new();
        for (addr, node) in nodes {
            let Some(parent) = addr.parent() else {
                continue;
            };
            parents.entry(parent).or_default().push(node);
        }

        let built: Vec<(Address, Vec<Address>, AssetRef)> = parents
            .into_par_iter()
            .map(|(prefix, children)| build_group(sink, prefix, children, content))
            .collect::<Result<_>>()?;

        debug!("Prefix length {}: {} groups", len - 1, built.len());
        for (prefix, child_addresses, group) in built {
            members.insert(prefix, child_addresses);
            insert_unique(&mut pending, group)?;
        }
    }

    let root = pending
        .remove(&0)
        .and_then(|mut level| level.remove(&Address::root()))
        .ok_or_else(|| TilerError::AddressCollision {
            address: String::new(),
            detail: "grouping did not converge to a single root".to_string(),
        })?;

    let tree = GroupTree { root, members };
    info!(
        "Grouped tiles into {} groups, {} levels deep",
        tree.group_count(),
        tree.depth()
    );
    Ok(tree)
}

/// Make a page's coarsest tile the content of every ancestor group down to
/// `stop_len` digits that has no coarser tile of its own.
///
/// A page that fits one tile early is never rasterized at coarser depths, so
/// without this the groups above it would have nothing to draw.
pub fn inherit_content(content: &mut HashMap<Address, AssetRef>, tile: &AssetRef, stop_len: usize) {
    let mut node = tile.address.parent();
    while let Some(prefix) = node {
        if prefix.len() < stop_len {
            break;
        }
        node = prefix.parent();
        content.entry(prefix).or_insert_with(|| tile.clone());
    }
}

fn build_group(
    sink: &dyn AssetSink,
    prefix: Address,
    children: Vec<AssetRef>,
    content: &HashMap<Address, AssetRef>,
) -> Result<(Address, Vec<Address>, AssetRef)> {
    if children.len() > BRANCHING as usize {
        return Err(TilerError::AddressCollision {
            address: prefix.to_string(),
            detail: format!("{} children exceed the branching factor", children.len()),
        });
    }

    let child_addresses = children.iter().map(|c| c.address.clone()).collect();
    let mut group = sink.begin_group(prefix.clone());
    if let Some(tile) = content.get(&prefix) {
        group.set_content(tile.clone());
    }
    for child in children {
        group.add_child(child);
    }
    let group_ref = sink.commit_group(group)?;
    Ok((prefix, child_addresses, group_ref))
}

fn insert_unique(
    pending: &mut BTreeMap<usize, BTreeMap<Address, AssetRef>>,
    node: AssetRef,
) -> Result<()> {
    let level = pending.entry(node.address.len()).or_default();
    if let Some(existing) = level.get(&node.address) {
        return Err(TilerError::AddressCollision {
            address: node.address.to_string(),
            detail: format!("{} {} and {} {}", existing.kind, existing.uri, node.kind, node.uri),
        });
    }
    level.insert(node.address.clone(), node);
    Ok(())
}
