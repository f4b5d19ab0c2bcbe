#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("graph contains an edge with a missing endpoint: {edge_id}")]
    MissingEndpoint { edge_id: String },

    #[error("graph contains the node id more than once: {node_id}")]
    DuplicateNode { node_id: String },

    #[error("cluster {cluster} references an unknown node: {node_id}")]
    UnknownClusterMember { cluster: usize, node_id: String },

    #[error("node {node_id} is assigned to clusters {first} and {second}")]
    OverlappingClusters {
        node_id: String,
        first: usize,
        second: usize,
    },

    #[error("invalid layout options: {message}")]
    InvalidOptions { message: String },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidOptions {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
