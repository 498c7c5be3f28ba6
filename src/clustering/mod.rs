pub mod entity_clustering;

pub use entity_clustering::{
    assign_memberships, cluster, with_singletons, Cluster, ClusterMember, CoherenceScore, Membership,
};
