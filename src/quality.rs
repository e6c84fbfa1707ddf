use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::CLUSTER_GROUP_FILE;

#[derive(Error, Debug)]
pub enum QualityError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing 'cluster_id\\tgroup' header in {}", path.display())]
    MissingHeader { path: PathBuf },
    #[error("Line {line}: expected 2 columns, found {found}")]
    ColumnCount { line: u64, found: usize },
    #[error("Line {line}: cluster id '{value}' is not an integer")]
    InvalidId { line: u64, value: String },
    #[error("Line {line}: unknown quality label '{value}'")]
    UnknownLabel { line: u64, value: String },
    #[error("{ids} cluster ids but {codes} quality codes")]
    LengthMismatch { ids: usize, codes: usize },
}

/// Quality assigned to a sorted cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLabel {
    Unsorted,
    Good,
    Noise,
}

impl QualityLabel {
    /// 0 → unsorted, 1 → good, anything else → noise.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Unsorted,
            1 => Self::Good,
            _ => Self::Noise,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsorted => "unsorted",
            Self::Good => "good",
            Self::Noise => "noise",
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for QualityLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unsorted" => Ok(Self::Unsorted),
            "good" => Ok(Self::Good),
            "noise" => Ok(Self::Noise),
            other => Err(other.to_string()),
        }
    }
}

/// Where a quality record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityOrigin {
    /// Read from `cluster_group.tsv`.
    Table,
    /// Synthesized because no table exists.
    Fallback,
}

/// Cluster ids and their labels, in parallel and in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterQuality {
    pub cluster_ids: Vec<i64>,
    pub labels: Vec<QualityLabel>,
    pub origin: QualityOrigin,
}

impl ClusterQuality {
    /// Every distinct id labelled unsorted, ascending.
    pub fn fallback(ids: impl IntoIterator<Item = i64>) -> Self {
        let cluster_ids: Vec<i64> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let labels = vec![QualityLabel::Unsorted; cluster_ids.len()];
        Self {
            cluster_ids,
            labels,
            origin: QualityOrigin::Fallback,
        }
    }

    pub fn len(&self) -> usize {
        self.cluster_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cluster_ids.is_empty()
    }

    pub fn label_of(&self, cluster_id: i64) -> Option<QualityLabel> {
        self.cluster_ids
            .iter()
            .position(|&id| id == cluster_id)
            .map(|i| self.labels[i])
    }

    /// Number of clusters carrying `label`.
    pub fn count(&self, label: QualityLabel) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }
}

/// Outcome of looking for a quality table on disk.
#[derive(Debug)]
pub enum QualityLookup {
    Found(ClusterQuality),
    Absent,
}

#[derive(Serialize)]
struct ClusterGroupRow {
    cluster_id: i64,
    group: QualityLabel,
}

/// Write `cluster_group.tsv` into `output_dir`, replacing any existing table.
pub fn write_cluster_group_tsv(
    ids: &[i64],
    codes: &[i64],
    output_dir: &Path,
) -> Result<PathBuf, QualityError> {
    if ids.len() != codes.len() {
        return Err(QualityError::LengthMismatch {
            ids: ids.len(),
            codes: codes.len(),
        });
    }

    let path = output_dir.join(CLUSTER_GROUP_FILE);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&path)?;

    for (&cluster_id, &code) in ids.iter().zip(codes) {
        writer.serialize(ClusterGroupRow {
            cluster_id,
            group: QualityLabel::from_code(code),
        })?;
    }
    writer.flush().map_err(|source| QualityError::Io {
        path: path.clone(),
        source,
    })?;

    log::info!("Wrote {} cluster labels to {}", ids.len(), path.display());
    Ok(path)
}

/// Read a quality table. Columns may be separated by tabs or spaces.
pub fn read_cluster_group_tsv(path: &Path) -> Result<ClusterQuality, QualityError> {
    let file = std::fs::File::open(path).map_err(|source| QualityError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_cluster_groups(file, path)
}

/// Read the table if it exists. Only a missing file yields `Absent`.
pub fn lookup_cluster_groups(path: &Path) -> Result<QualityLookup, QualityError> {
    match std::fs::File::open(path) {
        Ok(file) => parse_cluster_groups(file, path).map(QualityLookup::Found),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(QualityLookup::Absent),
        Err(source) => Err(QualityError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parse_cluster_groups(
    input: impl std::io::Read,
    path: &Path,
) -> Result<ClusterQuality, QualityError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut cluster_ids = Vec::new();
    let mut labels = Vec::new();
    let mut saw_header = false;

    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let fields = split_fields(&record);

        if fields.is_empty() {
            continue;
        }

        if !saw_header {
            if fields != ["cluster_id", "group"] {
                return Err(QualityError::MissingHeader {
                    path: path.to_path_buf(),
                });
            }
            saw_header = true;
            continue;
        }

        if fields.len() != 2 {
            return Err(QualityError::ColumnCount {
                line,
                found: fields.len(),
            });
        }

        let id = fields[0].parse::<i64>().map_err(|_| QualityError::InvalidId {
            line,
            value: fields[0].to_string(),
        })?;
        let label = fields[1]
            .parse::<QualityLabel>()
            .map_err(|value| QualityError::UnknownLabel { line, value })?;

        cluster_ids.push(id);
        labels.push(label);
    }

    if !saw_header {
        return Err(QualityError::MissingHeader {
            path: path.to_path_buf(),
        });
    }

    log::debug!("Read {} cluster labels from {}", cluster_ids.len(), path.display());

    Ok(ClusterQuality {
        cluster_ids,
        labels,
        origin: QualityOrigin::Table,
    })
}

/// Tab-split fields, further split on whitespace for space-delimited tables.
fn split_fields(record: &csv::StringRecord) -> Vec<&str> {
    record
        .iter()
        .flat_map(|field| field.split_whitespace())
        .collect()
}
