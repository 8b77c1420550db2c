use std::fmt;

/// Encoded class id of a dynamic class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag {
    pub cid: u64,
}

impl TypeTag {
    pub const fn new(cid: u64) -> Self {
        Self { cid }
    }

    /// `self` is-a `target`
    pub fn is_a(self, target: TypeTag) -> bool {
        is_instance(self, target)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cid {}", self.cid)
    }
}

/// Values whose dynamic class is known at runtime
pub trait Tagged {
    fn type_tag(&self) -> TypeTag;
}

/// Subtype test: the target's Cid divides the actual Cid.
///
/// Keys are only unique within a level and a sibling group, so a test
/// against the target's key would accept unrelated classes. Cid 0 marks a
/// class outside the encoding and never matches.
pub fn is_instance(actual: TypeTag, target: TypeTag) -> bool {
    actual.cid != 0 && target.cid != 0 && actual.cid % target.cid == 0
}

/// Downcast guard: `Some(value)` when its dynamic class is-a `target`
pub fn checked_cast<T: Tagged + ?Sized>(value: &T, target: TypeTag) -> Option<&T> {
    if is_instance(value.type_tag(), target) {
        Some(value)
    } else {
        None
    }
}
