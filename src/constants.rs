// -
// Database namespaces

/// Sled tree holding one marker entry per created collection
pub(crate) const COLLECTIONS_TREE: &str = "_collections";

/// Per-collection tree name suffixes
pub(crate) const DOCS_TREE_SUFFIX: &str = "/docs";
pub(crate) const PARTITIONS_TREE_SUFFIX: &str = "/partitions";

/// Per-collection, per-partition change log tree: `{collection}/changes/{partition}`
pub(crate) const CHANGES_TREE_INFIX: &str = "/changes/";

/// Lease records tree suffix, keyed by partition id
pub(crate) const LEASES_TREE_SUFFIX: &str = "/leases";
