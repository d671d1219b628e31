//! Evidence identifiers.

use uuid::Uuid;

/// Issues random 128-bit identifiers (UUID v4).
///
/// 122 random bits make collisions negligible over the lifetime of a store,
/// so generation needs no coordination with storage.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityGenerator;

impl IdentityGenerator {
    pub fn generate(&self) -> Uuid {
        Uuid::new_v4()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_v4_and_distinct() {
        let ids = IdentityGenerator;
        let seen: HashSet<Uuid> = (0..1000).map(|_| ids.generate()).collect();
        assert_eq!(seen.len(), 1000);
        assert!(seen.iter().all(|id| id.get_version_num() == 4));
    }
}
