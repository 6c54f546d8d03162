//! Immutable catalog snapshot of the framework hierarchy and graph.
//!
//! Entities, edges and justification spans are held in flat tables with
//! lookup indexes, so a request can share the snapshot behind an `Arc`
//! without locks. The catalog is built once (by the storage layer or a test
//! fixture) and never mutated afterwards.

use crate::arabic::normalize_for_matching;
use crate::schema::{Edge, EdgeId, Entity, EntityId, EntityKind};
use std::collections::HashMap;

/// Read-only entity and edge tables plus their indexes.
#[derive(Debug, Default)]
pub struct EntityCatalog {
    entities: Vec<Entity>,
    edges: Vec<Edge>,

    by_id: HashMap<EntityId, usize>,
    children: HashMap<EntityId, Vec<usize>>,
    edges_from: HashMap<EntityId, Vec<usize>>,
    edges_by_id: HashMap<EdgeId, usize>,
    /// (normalized name, entity index), for the resolver.
    name_index: Vec<(String, usize)>,
}

impl EntityCatalog {
    /// Build a catalog from entity and edge tables.
    pub fn new(entities: Vec<Entity>, edges: Vec<Edge>) -> Self {
        let mut catalog = Self {
            entities,
            edges,
            ..Self::default()
        };

        for (i, entity) in catalog.entities.iter().enumerate() {
            catalog.by_id.insert(entity.id.clone(), i);
            if let Some(parent) = &entity.parent {
                catalog.children.entry(parent.clone()).or_default().push(i);
            }
            catalog
                .name_index
                .push((normalize_for_matching(&entity.name_ar), i));
        }

        for (i, edge) in catalog.edges.iter().enumerate() {
            catalog.edges_by_id.insert(edge.id.clone(), i);
            catalog
                .edges_from
                .entry(edge.source.clone())
                .or_default()
                .push(i);
        }

        // Deterministic iteration order for the resolver.
        catalog.name_index.sort_by(|a, b| a.0.cmp(&b.0));

        catalog
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.by_id.get(id).map(|&i| &self.entities[i])
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Pillars in stable id order.
    pub fn pillars(&self) -> Vec<&Entity> {
        let mut out: Vec<&Entity> = self
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Pillar)
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Direct children of an entity, in stable id order.
    pub fn children_of(&self, id: &EntityId) -> Vec<&Entity> {
        let mut out: Vec<&Entity> = self
            .children
            .get(id)
            .map(|idxs| idxs.iter().map(|&i| &self.entities[i]).collect())
            .unwrap_or_default();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges_by_id.get(id).map(|&i| &self.edges[i])
    }

    /// Outgoing edges that retrieval may traverse: approved, with at least
    /// one justification span.
    pub fn retrievable_edges_from(&self, id: &EntityId) -> Vec<&Edge> {
        self.edges_from
            .get(id)
            .map(|idxs| {
                idxs.iter()
                    .map(|&i| &self.edges[i])
                    .filter(|e| e.retrievable())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All normalized entity names with their entities, sorted by name.
    pub fn name_index(&self) -> impl Iterator<Item = (&str, &Entity)> {
        self.name_index
            .iter()
            .map(|(name, i)| (name.as_str(), &self.entities[*i]))
    }
}
