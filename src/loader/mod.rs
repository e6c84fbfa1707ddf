pub mod templates;

use ndarray::{Array1, Array2, Array3, ArrayD, Ix2, Ix3};
use std::path::Path;
use thiserror::Error;

use crate::quality::{self, ClusterQuality, QualityError, QualityLookup};
use crate::store::{self, ArrayError};
use crate::{
    AMPLITUDES_FILE, CHANNEL_MAP_FILE, CLUSTER_GROUP_FILE, PC_FEATURE_IND_FILE, PC_FEATURES_FILE,
    SPIKE_CLUSTERS_FILE, SPIKE_TIMES_FILE, SPIKE_TIMES_MASTER_CLOCK_FILE, TEMPLATES_FILE,
    UNWHITENING_FILE,
};

/// Width of the zero prefix on the template time axis.
pub const DEFAULT_TEMPLATE_ZERO_PADDING: usize = 21;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Array error: {0}")]
    Array(#[from] ArrayError),
    #[error("Cluster quality error: {0}")]
    Quality(#[from] QualityError),
    #[error("{name}: expected {expected} dimensions, found shape {shape:?}")]
    Dimensionality {
        name: &'static str,
        expected: usize,
        shape: Vec<usize>,
    },
    #[error("{name}: cannot squeeze shape {shape:?} to one dimension")]
    NotOneDimensional { name: &'static str, shape: Vec<usize> },
    #[error("Spike arrays disagree: {times} times, {clusters} clusters, {amplitudes} amplitudes")]
    SpikeCountMismatch {
        times: usize,
        clusters: usize,
        amplitudes: usize,
    },
    #[error("Template padding {padding} exceeds time axis length {time_len}")]
    PaddingTooWide { padding: usize, time_len: usize },
    #[error("Unwhitening matrix is {rows}x{cols} but templates have {channels} channels")]
    UnwhiteningShape {
        rows: usize,
        cols: usize,
        channels: usize,
    },
    #[error("Sample rate must be finite and positive, got {0}")]
    InvalidSampleRate(f64),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl LoadError {
    /// A mandatory array was absent from the directory.
    pub fn is_missing_input(&self) -> bool {
        matches!(self, LoadError::Array(e) if e.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;

/// How to interpret a sorting output directory.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Acquisition sample rate in Hz.
    pub sample_rate: f64,
    /// Divide spike times by `sample_rate`.
    pub convert_to_seconds: bool,
    /// Read `spike_times_master_clock.npy` instead of `spike_times.npy`.
    pub use_master_clock: bool,
    /// Also read per-spike principal component features.
    pub include_pcs: bool,
    pub template_zero_padding: usize,
    /// Rayon workers for unwhitening. 0 = global pool.
    pub workers: usize,
}

impl LoadOptions {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            convert_to_seconds: true,
            use_master_clock: false,
            include_pcs: false,
            template_zero_padding: DEFAULT_TEMPLATE_ZERO_PADDING,
            workers: 0,
        }
    }
}

/// Principal component features for each spike.
#[derive(Debug, Clone)]
pub struct PcFeatures {
    /// (spike, component, local channel)
    pub features: Array3<f64>,
    /// (template, local channel) → channel index
    pub feature_ind: Array2<i64>,
}

/// Analysis-ready view of one sorting run.
#[derive(Debug, Clone)]
pub struct SortedSpikeData {
    /// Seconds or samples depending on [`LoadOptions::convert_to_seconds`].
    pub spike_times: Array1<f64>,
    pub spike_clusters: Array1<i64>,
    pub amplitudes: Array1<f64>,
    /// Unwhitened, padding stripped: (template, time, channel).
    pub templates: Array3<f64>,
    pub channel_map: ArrayD<i64>,
    pub cluster_quality: ClusterQuality,
    pub pc_features: Option<PcFeatures>,
}

impl SortedSpikeData {
    pub fn spike_count(&self) -> usize {
        self.spike_times.len()
    }

    pub fn cluster_ids(&self) -> &[i64] {
        &self.cluster_quality.cluster_ids
    }

    /// Number of spikes assigned to `cluster_id`.
    pub fn spikes_in_cluster(&self, cluster_id: i64) -> usize {
        self.spike_clusters.iter().filter(|&&c| c == cluster_id).count()
    }
}

/// Load a sorting output directory and reconstruct physical templates.
pub fn load_sorting_output(dir: &Path, opts: &LoadOptions) -> Result<SortedSpikeData> {
    if !(opts.sample_rate.is_finite() && opts.sample_rate > 0.0) {
        return Err(LoadError::InvalidSampleRate(opts.sample_rate));
    }

    let times_file = if opts.use_master_clock {
        SPIKE_TIMES_MASTER_CLOCK_FILE
    } else {
        SPIKE_TIMES_FILE
    };
    let raw_times = store::load_float(dir, times_file)?;
    let spike_clusters = load_spike_clusters(dir)?;
    let raw_amplitudes = store::load_float(dir, AMPLITUDES_FILE)?;
    let raw_templates = into_3d(store::load_float(dir, TEMPLATES_FILE)?, "templates")?;
    let unwhitening = into_2d(store::load_float(dir, UNWHITENING_FILE)?, "whitening_mat_inv")?;
    let channel_map = store::load_int(dir, CHANNEL_MAP_FILE)?;

    let pc_features = if opts.include_pcs {
        let features = into_3d(store::load_float(dir, PC_FEATURES_FILE)?, "pc_features")?;
        let feature_ind = into_2d(store::load_int(dir, PC_FEATURE_IND_FILE)?, "pc_feature_ind")?;
        Some(PcFeatures {
            features,
            feature_ind,
        })
    } else {
        None
    };

    let stripped = templates::strip_padding(&raw_templates, opts.template_zero_padding)?;

    let mut spike_times = squeeze(raw_times, "spike_times")?;
    let amplitudes = squeeze(raw_amplitudes, "amplitudes")?;
    check_spike_counts(&spike_times, &spike_clusters, &amplitudes)?;

    if opts.convert_to_seconds {
        spike_times.mapv_inplace(|t| t / opts.sample_rate);
    }

    let templates = if opts.workers > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(opts.workers)
            .build()?;
        pool.install(|| templates::unwhiten(&stripped, &unwhitening))?
    } else {
        templates::unwhiten(&stripped, &unwhitening)?
    };

    let cluster_quality = resolve_cluster_quality(dir, &spike_clusters)?;

    log::info!(
        "Loaded {}: {} spikes, {} templates, {} clusters",
        dir.display(),
        spike_times.len(),
        templates.len_of(ndarray::Axis(0)),
        cluster_quality.len()
    );

    Ok(SortedSpikeData {
        spike_times,
        spike_clusters,
        amplitudes,
        templates,
        channel_map,
        cluster_quality,
        pc_features,
    })
}

/// Per-spike cluster assignments from `spike_clusters.npy`, squeezed to one
/// dimension.
pub fn load_spike_clusters(dir: &Path) -> Result<Array1<i64>> {
    squeeze(store::load_int(dir, SPIKE_CLUSTERS_FILE)?, "spike_clusters")
}

/// Read `cluster_group.tsv` from `dir`, or label every observed cluster unsorted
/// when the table does not exist.
pub fn resolve_cluster_quality(dir: &Path, spike_clusters: &Array1<i64>) -> Result<ClusterQuality> {
    let path = dir.join(CLUSTER_GROUP_FILE);
    match quality::lookup_cluster_groups(&path)? {
        QualityLookup::Found(q) => Ok(q),
        QualityLookup::Absent => {
            log::info!(
                "No {} in {}, labelling all clusters unsorted",
                CLUSTER_GROUP_FILE,
                dir.display()
            );
            Ok(ClusterQuality::fallback(spike_clusters.iter().copied()))
        }
    }
}

/// Collapse singleton axes. At most one axis may be longer than 1.
fn squeeze<T: Clone>(arr: ArrayD<T>, name: &'static str) -> Result<Array1<T>> {
    let long_axes = arr.shape().iter().filter(|&&d| d != 1).count();
    if long_axes > 1 {
        return Err(LoadError::NotOneDimensional {
            name,
            shape: arr.shape().to_vec(),
        });
    }
    Ok(arr.iter().cloned().collect())
}

fn into_3d(arr: ArrayD<f64>, name: &'static str) -> Result<Array3<f64>> {
    let shape = arr.shape().to_vec();
    arr.into_dimensionality::<Ix3>()
        .map_err(|_| LoadError::Dimensionality {
            name,
            expected: 3,
            shape,
        })
}

fn into_2d<T>(arr: ArrayD<T>, name: &'static str) -> Result<Array2<T>> {
    let shape = arr.shape().to_vec();
    arr.into_dimensionality::<Ix2>()
        .map_err(|_| LoadError::Dimensionality {
            name,
            expected: 2,
            shape,
        })
}

fn check_spike_counts(
    times: &Array1<f64>,
    clusters: &Array1<i64>,
    amplitudes: &Array1<f64>,
) -> Result<()> {
    if times.len() == clusters.len() && times.len() == amplitudes.len() {
        Ok(())
    } else {
        Err(LoadError::SpikeCountMismatch {
            times: times.len(),
            clusters: clusters.len(),
            amplitudes: amplitudes.len(),
        })
    }
}
