//! Class hierarchy encoder
//!
//! Gives every polymorphic class a *key* (a prime) and a *cid*, the product of
//! its own key and the keys of all its ancestors. "C is-a T" then reduces to
//! `cid(C) % cid(T) == 0`.
//!
//! Keys of one level are drawn from a prime range that starts strictly above
//! the largest key of the previous level, so a cid contains exactly one prime
//! per level of its chain. Sibling groups under different bases may reuse the
//! same keys: two classes sharing a key at level `n` still differ in some
//! prime below level `n`, which keeps the divisibility test exact. The test
//! must therefore always divide by the full cid, never by the key.

use super::{ClassId, ClassLattice, PrimeSupplier};
use crate::cache::CidCache;
use crate::errors::{CidConflict, EncodeError};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::cmp::Reverse;
use tracing::{debug, info};

/// Outcome of an encoder run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingSummary {
    pub classes: usize,
    pub levels: u32,
    pub max_key: u64,
    pub max_cid: u64,
}

pub struct HierarchyEncoder<'a> {
    primes: &'a dyn PrimeSupplier,
    prior: Option<&'a CidCache>,
}

impl<'a> HierarchyEncoder<'a> {
    pub fn new(primes: &'a dyn PrimeSupplier) -> Self {
        Self {
            primes,
            prior: None,
        }
    }

    /// Use Cids persisted by an earlier compilation of the same program.
    ///
    /// They break ordering ties and every class they name must encode to the
    /// same value again.
    pub fn with_prior(mut self, prior: &'a CidCache) -> Self {
        self.prior = Some(prior);
        self
    }

    /// Encode every class of the lattice's polymorphic view
    pub fn encode_program(
        &self,
        lattice: &mut ClassLattice,
    ) -> Result<EncodingSummary, EncodeError> {
        let view = lattice.polymorphic_view();
        self.encode(lattice, &view)
    }

    /// Encode `classes`, which must be closed under base links.
    ///
    /// `level`, `priority` and `non_leaf` are recomputed in place. `key` and
    /// `cid` are only written once the whole encoding (and the stability check)
    /// succeeded.
    pub fn encode(
        &self,
        lattice: &mut ClassLattice,
        classes: &[ClassId],
    ) -> Result<EncodingSummary, EncodeError> {
        let mut in_view = vec![false; lattice.len()];
        let mut view = Vec::with_capacity(classes.len());
        for &id in classes {
            if lattice.get(id).is_interface() {
                return Err(EncodeError::InterfaceInView(lattice.name(id).to_string()));
            }
            if !in_view[id.index()] {
                in_view[id.index()] = true;
                view.push(id);
            }
        }
        for &id in &view {
            lattice.get_mut(id).reset_layout();
        }

        self.assign_levels(lattice, &view, &in_view)?;
        self.propagate_priorities(lattice, &view);
        let order = self.processing_order(lattice, &view);

        let mut cursor = KeyCursor::new();
        let mut keys = vec![0u64; lattice.len()];
        let mut cids = vec![0u64; lattice.len()];
        for &id in &order {
            let node = lattice.get(id);
            let key = cursor.next_key(node.level, node.base, self.primes);

            let base_cid = node.base.map_or(1, |base| cids[base.index()]);
            debug_assert!(base_cid != 0, "ancestors are keyed before descendants");
            let cid = key
                .checked_mul(base_cid)
                .ok_or_else(|| EncodeError::CidOverflow {
                    class: node.name.clone(),
                })?;

            debug!(
                "Encoded {} (level {}, priority {}): key {} cid {}",
                node.name, node.level, node.priority, key, cid
            );
            keys[id.index()] = key;
            cids[id.index()] = cid;
        }

        if let Some(prior) = self.prior {
            let conflicts: Vec<CidConflict> = order
                .iter()
                .filter_map(|&id| {
                    let name = lattice.name(id);
                    let persisted = prior.cid_of(name)?;
                    let computed = cids[id.index()];
                    (persisted != computed).then(|| CidConflict {
                        class: name.to_string(),
                        persisted,
                        computed,
                    })
                })
                .collect();
            if !conflicts.is_empty() {
                return Err(EncodeError::StabilityConflict { conflicts });
            }
        }

        let mut summary = EncodingSummary {
            classes: order.len(),
            ..EncodingSummary::default()
        };
        for &id in &order {
            let node = lattice.get_mut(id);
            node.key = keys[id.index()];
            node.cid = cids[id.index()];
            summary.levels = summary.levels.max(node.level + 1);
            summary.max_key = summary.max_key.max(node.key);
            summary.max_cid = summary.max_cid.max(node.cid);
        }

        info!(
            "Encoded {} classes over {} levels (max key {}, max cid {})",
            summary.classes, summary.levels, summary.max_key, summary.max_cid
        );
        Ok(summary)
    }

    /// Level = number of ancestors; every base is flagged as non-leaf
    fn assign_levels(
        &self,
        lattice: &mut ClassLattice,
        view: &[ClassId],
        in_view: &[bool],
    ) -> Result<(), EncodeError> {
        for &id in view {
            let mut level = 0u32;
            let mut current = id;
            while let Some(base) = lattice.get(current).base {
                if !in_view[base.index()] {
                    return Err(EncodeError::DanglingBase {
                        class: lattice.name(current).to_string(),
                        base: lattice.name(base).to_string(),
                    });
                }
                level += 1;
                if level as usize >= view.len() {
                    return Err(EncodeError::Cycle {
                        class: lattice.name(id).to_string(),
                    });
                }
                current = base;
            }

            lattice.get_mut(id).level = level;
            if let Some(base) = lattice.get(id).base {
                lattice.get_mut(base).non_leaf = true;
            }
        }
        Ok(())
    }

    /// Each class ends up with the depth of the deepest leaf below it
    fn propagate_priorities(&self, lattice: &mut ClassLattice, view: &[ClassId]) {
        for &id in view {
            let leaf = lattice.get(id);
            if !leaf.is_leaf_candidate() {
                continue;
            }
            let depth = leaf.level;
            let chain: Vec<ClassId> = std::iter::once(id).chain(lattice.ancestors(id)).collect();
            for class in chain {
                let node = lattice.get_mut(class);
                node.priority = node.priority.max(depth);
            }
        }
    }

    /// Roots first; within a level, deeper subtrees first, then by the
    /// last-known cid of the base (0 when nothing was persisted).
    ///
    /// Siblings are ordered by the key they were persisted with, so a group
    /// draws its keys in the same order however its members are declared.
    /// Classes the prior cache does not name come after the ones it does.
    /// The sort is stable, so remaining ties keep declaration order.
    fn processing_order(&self, lattice: &ClassLattice, view: &[ClassId]) -> Vec<ClassId> {
        let last_known_cid = |id: ClassId| -> u64 {
            self.prior
                .and_then(|prior| prior.cid_of(lattice.name(id)))
                .unwrap_or(0)
        };
        let last_known_key = |id: ClassId| -> u64 {
            self.prior
                .and_then(|prior| prior.key_of(lattice.name(id)))
                .unwrap_or(u64::MAX)
        };

        let mut order = view.to_vec();
        order.sort_by_cached_key(|&id| {
            let node = lattice.get(id);
            (
                node.level,
                Reverse(node.priority),
                node.base.map_or(0, last_known_cid),
                last_known_key(id),
            )
        });
        order
    }
}

/// Running prime counter threaded through the ordered key assignment
struct KeyCursor {
    level: Option<u32>,
    min_level_key: u64,
    max_level_key: u64,
    /// Last key drawn by each sibling group of the current level
    groups: FxHashMap<Option<ClassId>, u64>,
}

impl KeyCursor {
    fn new() -> Self {
        Self {
            level: None,
            min_level_key: 1,
            max_level_key: 1,
            groups: FxHashMap::default(),
        }
    }

    fn next_key(&mut self, level: u32, base: Option<ClassId>, primes: &dyn PrimeSupplier) -> u64 {
        if self.level != Some(level) {
            self.level = Some(level);
            let start = primes.next_prime(self.max_level_key);
            self.min_level_key = start;
            self.max_level_key = start;
            self.groups.clear();
        }

        let key = match self.groups.get(&base) {
            None => self.min_level_key,
            Some(&last) => primes.next_prime(last),
        };
        self.groups.insert(base, key);
        self.max_level_key = self.max_level_key.max(key);
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{ClassKind, TrialDivision};

    fn class(lattice: &mut ClassLattice, name: &str, base: Option<ClassId>) -> ClassId {
        let id = lattice.add_class(name, ClassKind::Class).unwrap();
        lattice.set_polymorphic(id, true);
        if let Some(base) = base {
            lattice.set_base(id, base).unwrap();
        }
        id
    }

    #[test]
    fn test_key_cursor_levels_use_disjoint_ranges() {
        let primes = TrialDivision;
        let mut cursor = KeyCursor::new();
        let (a, b) = (Some(ClassId(0)), Some(ClassId(1)));

        assert_eq!(cursor.next_key(0, None, &primes), 2);
        assert_eq!(cursor.next_key(0, None, &primes), 3);
        assert_eq!(cursor.next_key(1, a, &primes), 5);
        assert_eq!(cursor.next_key(1, a, &primes), 7);
        assert_eq!(cursor.next_key(1, b, &primes), 5);
        assert_eq!(cursor.next_key(2, a, &primes), 11);
    }

    #[test]
    fn test_key_cursor_interleaved_groups_never_collide() {
        let primes = TrialDivision;
        let mut cursor = KeyCursor::new();
        let (a, b) = (Some(ClassId(0)), Some(ClassId(1)));

        cursor.next_key(0, None, &primes);
        let first = cursor.next_key(1, a, &primes);
        let second = cursor.next_key(1, a, &primes);
        cursor.next_key(1, b, &primes);
        let third = cursor.next_key(1, a, &primes);
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_ne!(first, third);
    }

    #[test]
    fn test_chain_encoding() {
        let mut lattice = ClassLattice::new();
        let r = class(&mut lattice, "R", None);
        let a = class(&mut lattice, "A", Some(r));
        let b = class(&mut lattice, "B", Some(a));
        let c = class(&mut lattice, "C", Some(b));

        let summary = HierarchyEncoder::new(&TrialDivision)
            .encode_program(&mut lattice)
            .unwrap();

        assert_eq!(summary.classes, 4);
        assert_eq!(summary.levels, 4);
        let cids: Vec<u64> = [r, a, b, c].iter().map(|&id| lattice.get(id).cid).collect();
        assert_eq!(cids, vec![2, 6, 30, 210]);
        assert_eq!(lattice.get(c).level, 3);
        assert_eq!(lattice.get(r).priority, 3);
    }

    #[test]
    fn test_deeper_subtree_is_keyed_first() {
        let mut lattice = ClassLattice::new();
        let root = class(&mut lattice, "Root", None);
        let shallow = class(&mut lattice, "Shallow", Some(root));
        let deep = class(&mut lattice, "Deep", Some(root));
        class(&mut lattice, "DeepChild", Some(deep));

        HierarchyEncoder::new(&TrialDivision)
            .encode_program(&mut lattice)
            .unwrap();

        assert_eq!(lattice.get(deep).priority, 2);
        assert_eq!(lattice.get(shallow).priority, 1);
        assert!(lattice.get(deep).key < lattice.get(shallow).key);
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut lattice = ClassLattice::new();
        let a = class(&mut lattice, "A", None);
        let b = class(&mut lattice, "B", Some(a));
        lattice.set_base(a, b).unwrap();

        let err = HierarchyEncoder::new(&TrialDivision)
            .encode(&mut lattice, &[a, b])
            .unwrap_err();
        assert!(matches!(err, EncodeError::Cycle { .. }));
        assert!(err.is_internal());
    }

    #[test]
    fn test_dangling_base_is_reported() {
        let mut lattice = ClassLattice::new();
        let a = class(&mut lattice, "A", None);
        let b = class(&mut lattice, "B", Some(a));

        let err = HierarchyEncoder::new(&TrialDivision)
            .encode(&mut lattice, &[b])
            .unwrap_err();
        assert_eq!(
            err,
            EncodeError::DanglingBase {
                class: "B".to_string(),
                base: "A".to_string()
            }
        );
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut lattice = ClassLattice::new();
        let mut previous = None;
        for i in 0..40 {
            previous = Some(class(&mut lattice, &format!("C{}", i), previous));
        }

        let err = HierarchyEncoder::new(&TrialDivision)
            .encode_program(&mut lattice)
            .unwrap_err();
        assert!(matches!(err, EncodeError::CidOverflow { .. }));
        assert!(lattice.iter().all(|(_, node)| node.cid == 0));
    }

    #[test]
    fn test_encode_is_idempotent() {
        let mut lattice = ClassLattice::new();
        let r1 = class(&mut lattice, "R1", None);
        let r2 = class(&mut lattice, "R2", None);
        class(&mut lattice, "A", Some(r1));
        class(&mut lattice, "B", Some(r2));
        class(&mut lattice, "C", Some(r1));

        let encoder = HierarchyEncoder::new(&TrialDivision);
        encoder.encode_program(&mut lattice).unwrap();
        let first: Vec<u64> = lattice.iter().map(|(_, n)| n.cid).collect();
        encoder.encode_program(&mut lattice).unwrap();
        let second: Vec<u64> = lattice.iter().map(|(_, n)| n.cid).collect();
        assert_eq!(first, second);
    }
}
