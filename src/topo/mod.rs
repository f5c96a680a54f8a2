pub mod feed;
pub mod path;
pub mod store;

pub use feed::{apply_topology, demo_topology, load_topology_file, FeedLink, FeedNode, TopologyFile};
pub use path::find_path;
pub use store::{GraphStore, Link, LinkTagPolicy, LinkTagState, Node, Weight, WeightFn, ROOT_ID};
