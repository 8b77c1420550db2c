use crate::lattice::ClassLattice;

/// Hash the shape of the encoded hierarchy: every class of the polymorphic
/// view with the name of its base.
///
/// Declaration order does not enter the hash. Two lattices with the same
/// fingerprint re-encode to the Cids persisted for either of them, since the
/// encoder orders siblings by their persisted keys.
pub fn hash_hierarchy(lattice: &ClassLattice) -> String {
    let mut edges: Vec<(&str, &str)> = lattice
        .polymorphic_view()
        .into_iter()
        .map(|id| {
            let node = lattice.get(id);
            let base = node.base.map_or("", |b| lattice.name(b));
            (node.name.as_str(), base)
        })
        .collect();
    edges.sort_unstable();

    let mut hasher = blake3::Hasher::new();
    for (class, base) in edges {
        hasher.update(class.as_bytes());
        hasher.update(b"\0");
        hasher.update(base.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}
