use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A substance a network can carry, compared by kind.
///
/// Blanket-implemented for any small copyable value type, so hosts can use
/// [`ResourceId`](crate::id::ResourceId), their own enum, or `()` for
/// untyped energy.
pub trait ResourceKind: Copy + Eq + Debug {}

impl<T: Copy + Eq + Debug> ResourceKind for T {}

/// Restricts which connectors and pins may join the same network.
///
/// Members with different tags never share a network, even when adjacent,
/// so a wire and a pipe can cross the same tile on different layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum TypeTag {
    #[default]
    Energy,
    Pipe,
    WaterPipe,
    /// Extension slot for content packs that add their own network families.
    Custom(u16),
}

/// Whether a member offering `offered` may join a network whose established
/// kind is `established`. Untyped members are always admitted.
pub fn admits<R: ResourceKind>(established: Option<R>, offered: Option<R>) -> bool {
    match (established, offered) {
        (Some(current), Some(kind)) => current == kind,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ResourceId;

    #[test]
    fn untyped_networks_admit_anything() {
        assert!(admits::<ResourceId>(None, None));
        assert!(admits(None, Some(ResourceId(2))));
    }

    #[test]
    fn typed_networks_admit_only_their_kind_or_untyped() {
        let water = ResourceId(0);
        let steam = ResourceId(1);
        assert!(admits(Some(water), Some(water)));
        assert!(admits(Some(water), None));
        assert!(!admits(Some(water), Some(steam)));
    }

    #[test]
    fn custom_tags_compare_by_value() {
        assert_eq!(TypeTag::Custom(4), TypeTag::Custom(4));
        assert_ne!(TypeTag::Custom(4), TypeTag::Custom(5));
        assert_ne!(TypeTag::Pipe, TypeTag::WaterPipe);
    }

    #[test]
    fn unit_type_is_a_resource_kind() {
        fn takes<R: ResourceKind>(_: R) {}
        takes(());
    }
}
