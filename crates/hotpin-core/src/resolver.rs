//! Hot pointer resolution.

use crate::cid::{Cid, HotPointer};
use crate::error::{ResolutionError, ResolveStage};
use crate::node::Node;
use std::sync::Arc;
use tracing::debug;

/// Resolves the hot pointer to the CID it currently designates.
///
/// The naming system yields a path rather than a CID, so resolution takes
/// two calls: name lookup, then a stat of the resulting path. Nothing is
/// cached; every call asks the naming system again.
#[derive(Clone)]
pub struct NameResolver {
    node: Arc<dyn Node>,
}

impl NameResolver {
    pub fn new(node: Arc<dyn Node>) -> Self {
        Self { node }
    }

    pub async fn resolve(&self, pointer: &HotPointer) -> Result<Cid, ResolutionError> {
        let path = self
            .node
            .resolve_name(pointer.as_str())
            .await
            .map_err(|source| ResolutionError {
                pointer: pointer.clone(),
                stage: ResolveStage::Name,
                source,
            })?;
        debug!(pointer = %pointer, path = %path, "name resolved");

        let cid = self
            .node
            .stat_path(&path)
            .await
            .map_err(|source| ResolutionError {
                pointer: pointer.clone(),
                stage: ResolveStage::Stat,
                source,
            })?;
        debug!(pointer = %pointer, cid = %cid, "path dereferenced");

        Ok(cid)
    }
}
