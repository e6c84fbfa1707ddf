pub mod config;
pub mod loader;
pub mod numeric;
pub mod probe;
pub mod provenance;
pub mod quality;
pub mod store;

pub use loader::{LoadError, LoadOptions, SortedSpikeData, load_sorting_output};

// Sorting output directory layout
pub const SPIKE_TIMES_FILE: &str = "spike_times.npy";
pub const SPIKE_TIMES_MASTER_CLOCK_FILE: &str = "spike_times_master_clock.npy";
pub const SPIKE_CLUSTERS_FILE: &str = "spike_clusters.npy";
pub const AMPLITUDES_FILE: &str = "amplitudes.npy";
pub const TEMPLATES_FILE: &str = "templates.npy";
pub const UNWHITENING_FILE: &str = "whitening_mat_inv.npy";
pub const CHANNEL_MAP_FILE: &str = "channel_map.npy";
pub const PC_FEATURES_FILE: &str = "pc_features.npy";
pub const PC_FEATURE_IND_FILE: &str = "pc_feature_ind.npy";
pub const CLUSTER_GROUP_FILE: &str = "cluster_group.tsv";

/// Application name for XDG paths
pub const APP_NAME: &str = "spikeload";
