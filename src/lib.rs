pub use align::{align_partitions, Alignment};
pub use config::{EnsembleConfig, Linkage};
pub use consensus::{consensus_classes, consensus_matrix};
pub use distance::{Distance, Euclidean};
pub use ensemble::{ClusterAlgorithm, ConsensusClustering, EnsembleRun, KMeans};
pub use error::{ConsensusError, Result};
pub use evaluate::{
    calinski_harabasz, pac, trim_and_reweigh, Direction, IndexRow, IndexScore, TrimmedEnsemble,
    ValidationIndexTable,
};
pub use impute::{impute_slice, ImputedSlice};
pub use resample::{subsample_masks, InclusionMask};
pub use store::{EnsembleStore, LabelCell, MissingReport};

mod align;
mod config;
mod consensus;
mod distance;
mod ensemble;
mod error;
mod evaluate;
mod impute;
mod resample;
mod store;
