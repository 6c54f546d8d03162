//! Entity resolution against the canonical catalog.
//!
//! Two passes over the normalized question:
//! 1. exact containment of the normalized entity name (confidence 1.0)
//! 2. token containment with a minimum token length of 3 (confidence 0.7)
//!
//! Containment confidence drops by 0.1 per noise token adjacent to the
//! matched window. Ties are broken by hierarchy depth (sub-value over core
//! value over pillar), then by id for determinism.

use crate::arabic::{is_stopword, normalize_for_matching, strip_prefix_particles};
use crate::catalog::EntityCatalog;
use crate::schema::{EntityId, EntityKind};
use std::collections::HashSet;
use std::sync::Arc;

/// How an entity matched the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Containment,
}

/// A resolved entity mention.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMatch {
    pub kind: EntityKind,
    pub id: EntityId,
    pub name_ar: String,
    pub confidence: f64,
    pub match_kind: MatchKind,
}

/// Resolves entity names in questions.
pub struct EntityResolver {
    catalog: Arc<EntityCatalog>,
}

impl EntityResolver {
    pub fn new(catalog: Arc<EntityCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<EntityCatalog> {
        &self.catalog
    }

    /// Resolve entity mentions in a question. Output is ordered by
    /// confidence, then hierarchy depth, then id.
    pub fn resolve(&self, question: &str) -> Vec<EntityMatch> {
        let normalized = normalize_for_matching(question);
        if normalized.is_empty() {
            return Vec::new();
        }

        let question_tokens: Vec<&str> = normalized.split_whitespace().collect();
        let match_keys: Vec<&str> = question_tokens
            .iter()
            .map(|t| strip_prefix_particles(t))
            .collect();

        let mut matches = Vec::new();
        let mut seen: HashSet<EntityId> = HashSet::new();

        // Pass 1: exact normalized containment. Multi-word names match as a
        // single candidate here.
        for (name, entity) in self.catalog.name_index() {
            if name.is_empty() || !normalized.contains(name) {
                continue;
            }
            if seen.insert(entity.id.clone()) {
                matches.push(EntityMatch {
                    kind: entity.kind,
                    id: entity.id.clone(),
                    name_ar: entity.name_ar.clone(),
                    confidence: 1.0,
                    match_kind: MatchKind::Exact,
                });
            }
        }

        // Pass 2: token containment on match keys, minimum token length 3.
        for (name, entity) in self.catalog.name_index() {
            if seen.contains(&entity.id) {
                continue;
            }
            let name_tokens: Vec<&str> = name
                .split_whitespace()
                .map(strip_prefix_particles)
                .filter(|t| t.chars().count() >= 3)
                .collect();
            if name_tokens.is_empty() {
                continue;
            }

            let positions: Vec<usize> = match_keys
                .iter()
                .enumerate()
                .filter(|(_, key)| name_tokens.contains(key))
                .map(|(i, _)| i)
                .collect();

            let matched: HashSet<&&str> = name_tokens
                .iter()
                .filter(|t| match_keys.contains(t))
                .collect();
            if matched.len() < name_tokens.len() {
                continue;
            }

            let noise = adjacent_noise_tokens(&question_tokens, &positions);
            let confidence = (0.7 - 0.1 * noise as f64).max(0.3);

            seen.insert(entity.id.clone());
            matches.push(EntityMatch {
                kind: entity.kind,
                id: entity.id.clone(),
                name_ar: entity.name_ar.clone(),
                confidence,
                match_kind: MatchKind::Containment,
            });
        }

        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.kind.depth().cmp(&a.kind.depth()))
                .then(a.id.cmp(&b.id))
        });
        matches
    }
}

/// Count non-stopword tokens directly adjacent to the matched positions
/// that are not themselves part of the match.
fn adjacent_noise_tokens(question_tokens: &[&str], positions: &[usize]) -> usize {
    if positions.is_empty() {
        return 0;
    }
    let matched: HashSet<usize> = positions.iter().copied().collect();
    let mut noise = HashSet::new();
    for &pos in positions {
        for neighbor in [pos.checked_sub(1), pos.checked_add(1)] {
            let Some(i) = neighbor else { continue };
            if i >= question_tokens.len() || matched.contains(&i) {
                continue;
            }
            if !is_stopword(question_tokens[i]) {
                noise.insert(i);
            }
        }
    }
    noise.len()
}
