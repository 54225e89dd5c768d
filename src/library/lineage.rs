//! Lineage - transitive closure of "derived-from" relationships
//!
//! Asset metadata carries an `inputs` list of the ids the asset was
//! produced from. The resolver walks that relation in both directions:
//! ancestors through a node's own inputs, descendants through every asset
//! under the root that references the node.
//!
//! The graph is user/tool-authored and may contain cycles, so traversal is
//! an explicit visited-set BFS, never recursive descent. Each call loads
//! the root's full asset population once; that O(population) cost is the
//! documented scaling limit, fine at catalog sizes in the low thousands.

use crate::domain::Asset;
use crate::library::assets::AssetStore;
use crate::library::error::Result;
use std::collections::{HashMap, HashSet, VecDeque};

/// Resolve the full bidirectionally-reachable set of assets connected to
/// `asset_id` through `inputs` references. The seed is included; the result
/// order is unspecified. An unknown id resolves to an empty set.
pub async fn get_lineage(store: &AssetStore, asset_id: &str) -> Result<Vec<Asset>> {
    let Some(seed) = store.get_asset(asset_id).await? else {
        return Ok(Vec::new());
    };

    let population = store.get_assets(&seed.root_path).await?;
    let by_id: HashMap<&str, &Asset> = population.iter().map(|a| (a.id.as_str(), a)).collect();

    // Reverse adjacency: input id -> ids of assets derived from it.
    let mut derived_from: HashMap<&str, Vec<&str>> = HashMap::new();
    for asset in &population {
        for input in &asset.metadata.inputs {
            derived_from
                .entry(input.as_str())
                .or_default()
                .push(asset.id.as_str());
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    visited.insert(seed.id.as_str());
    queue.push_back(seed.id.as_str());

    let mut closure = Vec::new();
    while let Some(current) = queue.pop_front() {
        let Some(&asset) = by_id.get(current) else {
            // Dangling reference to an id not present under this root.
            continue;
        };
        closure.push(asset.clone());

        for input in &asset.metadata.inputs {
            if visited.insert(input.as_str()) {
                queue.push_back(input.as_str());
            }
        }
        if let Some(descendants) = derived_from.get(current) {
            for &descendant in descendants {
                if visited.insert(descendant) {
                    queue.push_back(descendant);
                }
            }
        }
    }

    Ok(closure)
}
