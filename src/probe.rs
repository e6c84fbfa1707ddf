//! Per-probe calibration and geometry, persisted as JSON.
//!
//! The writer emits the full record. The reader returns only the calibration
//! subset (mask, offset, scaling, surface and air channel); channel ids and
//! positions are ignored on read.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Channel count of the supported probe class.
pub const NEUROPIXELS_CHANNELS: usize = 384;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid probe JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("'{field}' has {found} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("{field} = {index} is outside 0..{channels}")]
    ChannelOutOfRange {
        field: &'static str,
        index: usize,
        channels: usize,
    },
    #[error("{field}[{index}] is not finite")]
    NonFinite { field: &'static str, index: usize },
}

/// Everything known about one probe. Field order is the on-disk key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeMetadata {
    pub channel: Vec<u32>,
    pub offset: Vec<f64>,
    pub scaling: Vec<f64>,
    #[serde(serialize_with = "mask_as_ints")]
    pub mask: Vec<bool>,
    pub surface_channel: usize,
    pub air_channel: usize,
    pub vertical_pos: Vec<f64>,
    pub horizontal_pos: Vec<f64>,
}

impl ProbeMetadata {
    pub fn channel_count(&self) -> usize {
        self.channel.len()
    }

    /// All per-channel sequences agree, hold finite values, and both boundary
    /// indices are in range. JSON has no NaN or infinity.
    pub fn validate(&self) -> Result<(), ProbeError> {
        let n = self.channel_count();
        check_len("offset", n, self.offset.len())?;
        check_len("scaling", n, self.scaling.len())?;
        check_len("mask", n, self.mask.len())?;
        check_len("vertical_pos", n, self.vertical_pos.len())?;
        check_len("horizontal_pos", n, self.horizontal_pos.len())?;
        check_finite("offset", &self.offset)?;
        check_finite("scaling", &self.scaling)?;
        check_finite("vertical_pos", &self.vertical_pos)?;
        check_finite("horizontal_pos", &self.horizontal_pos)?;
        check_index("surface_channel", self.surface_channel, n)?;
        check_index("air_channel", self.air_channel, n)
    }
}

/// The subset of [`ProbeMetadata`] consumed by downstream calibration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProbeCalibration {
    #[serde(deserialize_with = "mask_from_ints_or_bools")]
    pub mask: Vec<bool>,
    pub offset: Vec<f64>,
    pub scaling: Vec<f64>,
    pub surface_channel: usize,
    pub air_channel: usize,
}

impl ProbeCalibration {
    pub fn channel_count(&self) -> usize {
        self.mask.len()
    }

    /// Indices of channels flagged as carrying valid data.
    pub fn valid_channels(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, &ok)| ok.then_some(i))
            .collect()
    }

    fn validate(&self) -> Result<(), ProbeError> {
        let n = self.channel_count();
        check_len("offset", n, self.offset.len())?;
        check_len("scaling", n, self.scaling.len())?;
        check_index("surface_channel", self.surface_channel, n)?;
        check_index("air_channel", self.air_channel, n)
    }
}

/// Write `meta` as 4-space indented JSON. Nothing is written if validation fails.
pub fn write_probe_json(output_file: &Path, meta: &ProbeMetadata) -> Result<(), ProbeError> {
    meta.validate()?;

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    meta.serialize(&mut ser)?;

    let io_err = |source| ProbeError::Io {
        path: output_file.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::create(output_file).map_err(io_err)?;
    file.write_all(&buf).map_err(io_err)?;

    log::debug!(
        "Wrote probe metadata ({} channels) to {}",
        meta.channel_count(),
        output_file.display()
    );
    Ok(())
}

/// Read the calibration subset of a probe JSON file.
pub fn read_probe_json(input_file: &Path) -> Result<ProbeCalibration, ProbeError> {
    let text = std::fs::read_to_string(input_file).map_err(|source| ProbeError::Io {
        path: input_file.to_path_buf(),
        source,
    })?;
    let calibration: ProbeCalibration = serde_json::from_str(&text)?;
    calibration.validate()?;
    Ok(calibration)
}

fn check_len(field: &'static str, expected: usize, found: usize) -> Result<(), ProbeError> {
    if found == expected {
        Ok(())
    } else {
        Err(ProbeError::LengthMismatch {
            field,
            expected,
            found,
        })
    }
}

fn check_finite(field: &'static str, values: &[f64]) -> Result<(), ProbeError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(ProbeError::NonFinite { field, index }),
        None => Ok(()),
    }
}

fn check_index(field: &'static str, index: usize, channels: usize) -> Result<(), ProbeError> {
    if index < channels {
        Ok(())
    } else {
        Err(ProbeError::ChannelOutOfRange {
            field,
            index,
            channels,
        })
    }
}

fn mask_as_ints<S: Serializer>(mask: &[bool], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(mask.iter().map(|&ok| u8::from(ok)))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MaskEntry {
    Flag(bool),
    Int(i64),
}

fn mask_from_ints_or_bools<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<bool>, D::Error> {
    let raw = Vec::<MaskEntry>::deserialize(d)?;
    raw.into_iter()
        .map(|entry| match entry {
            MaskEntry::Flag(b) => Ok(b),
            MaskEntry::Int(0) => Ok(false),
            MaskEntry::Int(1) => Ok(true),
            MaskEntry::Int(other) => Err(serde::de::Error::custom(format!(
                "mask entries must be 0 or 1, found {other}"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_probe() -> ProbeMetadata {
        let n = NEUROPIXELS_CHANNELS;
        ProbeMetadata {
            channel: (0..n as u32).collect(),
            offset: (0..n).map(|i| (i as f64) * 0.37 - 12.5).collect(),
            scaling: (0..n).map(|i| 1.0 + (i as f64) / 1000.0).collect(),
            mask: (0..n).map(|i| i % 37 != 0).collect(),
            surface_channel: 120,
            air_channel: 380,
            vertical_pos: (0..n).map(|i| (i / 2) as f64 * 20.0).collect(),
            horizontal_pos: (0..n).map(|i| [43.0, 11.0, 59.0, 27.0][i % 4]).collect(),
        }
    }

    #[test]
    fn test_round_trip_calibration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe_info.json");
        let probe = test_probe();

        write_probe_json(&path, &probe).unwrap();
        let cal = read_probe_json(&path).unwrap();

        assert_eq!(cal.mask, probe.mask);
        assert_eq!(cal.offset, probe.offset);
        assert_eq!(cal.scaling, probe.scaling);
        assert_eq!(cal.surface_channel, 120);
        assert_eq!(cal.air_channel, 380);
        assert_eq!(cal.channel_count(), NEUROPIXELS_CHANNELS);
    }

    #[test]
    fn test_written_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.json");
        let probe = ProbeMetadata {
            channel: vec![0, 1],
            offset: vec![1.5, -2.0],
            scaling: vec![1.0, 0.5],
            mask: vec![true, false],
            surface_channel: 1,
            air_channel: 0,
            vertical_pos: vec![20.0, 40.0],
            horizontal_pos: vec![11.0, 43.0],
        };
        write_probe_json(&path, &probe).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();

        let keys = [
            "\"channel\"",
            "\"offset\"",
            "\"scaling\"",
            "\"mask\"",
            "\"surface_channel\": 1",
            "\"air_channel\": 0",
            "\"vertical_pos\"",
            "\"horizontal_pos\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|k| text.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(text.contains("\n    \"mask\": [\n        1,\n        0\n    ]"));
    }

    #[test]
    fn test_reader_ignores_geometry() {
        let json = r#"{
            "mask": [true, false, 1],
            "offset": [0.0, 1.0, 2.0],
            "scaling": [1.0, 1.0, 1.0],
            "surface_channel": 2,
            "air_channel": 1
        }"#;
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.json");
        std::fs::write(&path, json).unwrap();

        let cal = read_probe_json(&path).unwrap();
        assert_eq!(cal.mask, vec![true, false, true]);
        assert_eq!(cal.valid_channels(), vec![0, 2]);
    }

    #[test]
    fn test_reader_missing_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.json");
        std::fs::write(&path, r#"{"mask": [1], "offset": [0.0], "scaling": [1.0], "air_channel": 0}"#)
            .unwrap();

        let err = read_probe_json(&path).unwrap_err();
        assert!(matches!(err, ProbeError::Json(_)));
        assert!(err.to_string().contains("surface_channel"));
    }

    #[test]
    fn test_reader_bad_mask_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.json");
        std::fs::write(
            &path,
            r#"{"mask": [2], "offset": [0.0], "scaling": [1.0], "surface_channel": 0, "air_channel": 0}"#,
        )
        .unwrap();

        assert!(matches!(read_probe_json(&path), Err(ProbeError::Json(_))));
    }

    #[test]
    fn test_reader_length_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.json");
        std::fs::write(
            &path,
            r#"{"mask": [1, 1], "offset": [0.0], "scaling": [1.0, 1.0], "surface_channel": 0, "air_channel": 1}"#,
        )
        .unwrap();

        let err = read_probe_json(&path).unwrap_err();
        assert!(matches!(
            err,
            ProbeError::LengthMismatch { field: "offset", expected: 2, found: 1 }
        ));
    }

    #[test]
    fn test_reader_not_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.json");
        std::fs::write(&path, "surface_channel = 3").unwrap();
        assert!(matches!(read_probe_json(&path), Err(ProbeError::Json(_))));
    }

    #[test]
    fn test_write_rejects_short_sequence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.json");
        let mut probe = test_probe();
        probe.horizontal_pos.pop();

        let err = write_probe_json(&path, &probe).unwrap_err();
        assert!(matches!(err, ProbeError::LengthMismatch { field: "horizontal_pos", .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_write_rejects_non_finite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.json");

        let mut probe = test_probe();
        probe.offset[0] = f64::NAN;
        let err = write_probe_json(&path, &probe).unwrap_err();
        assert!(matches!(err, ProbeError::NonFinite { field: "offset", index: 0 }));

        let mut probe = test_probe();
        probe.scaling[7] = f64::INFINITY;
        let err = write_probe_json(&path, &probe).unwrap_err();
        assert!(matches!(err, ProbeError::NonFinite { field: "scaling", index: 7 }));

        let mut probe = test_probe();
        probe.vertical_pos[383] = f64::NEG_INFINITY;
        assert!(write_probe_json(&path, &probe).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_round_trip_is_bit_exact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.json");
        let mut probe = test_probe();
        // Shortest representations that need full-precision parsing
        probe.offset[0] = -10.280000000000001;
        probe.offset[1] = -2.1400000000000006;
        probe.offset[2] = 1.9299999999999997;
        probe.scaling[0] = 0.1 + 0.2;

        write_probe_json(&path, &probe).unwrap();
        let cal = read_probe_json(&path).unwrap();

        for (got, want) in cal.offset.iter().zip(&probe.offset) {
            assert_eq!(got.to_bits(), want.to_bits());
        }
        assert_eq!(cal.scaling[0].to_bits(), (0.1f64 + 0.2).to_bits());
    }

    #[test]
    fn test_write_rejects_out_of_range_air_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.json");
        let mut probe = test_probe();
        probe.air_channel = NEUROPIXELS_CHANNELS;

        let err = write_probe_json(&path, &probe).unwrap_err();
        assert!(matches!(err, ProbeError::ChannelOutOfRange { field: "air_channel", .. }));
    }
}
