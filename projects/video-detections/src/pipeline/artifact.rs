//! Persisted detections.
//!
//! Layout: the 4-byte magic `VDET`, one protocol-version byte, then the
//! payload: one list of objects per frame, in frame order. Version 1 encodes
//! the payload as JSON, version 2 as bincode.

use crate::detection::{DetectedObject, FrameDetections};
use crate::error::ArtifactError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const MAGIC: &[u8; 4] = b"VDET";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    Json = 1,
    #[default]
    Bincode = 2,
}

impl ProtocolVersion {
    pub const LATEST: ProtocolVersion = ProtocolVersion::Bincode;

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = ArtifactError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            1 => Ok(Self::Json),
            2 => Ok(Self::Bincode),
            other => Err(ArtifactError::UnsupportedVersion(other)),
        }
    }
}

pub fn encode(
    detections: &[FrameDetections],
    version: ProtocolVersion,
) -> Result<Vec<u8>, ArtifactError> {
    let payload: Vec<&Vec<DetectedObject>> = detections.iter().map(|d| &d.objects).collect();
    let mut bytes = Vec::with_capacity(MAGIC.len() + 1);
    bytes.extend_from_slice(MAGIC);
    bytes.push(version.as_byte());
    match version {
        ProtocolVersion::Json => serde_json::to_writer(&mut bytes, &payload)?,
        ProtocolVersion::Bincode => bincode::serialize_into(&mut bytes, &payload)?,
    }
    Ok(bytes)
}

/// Decode an artifact. Record `i` is frame `i`.
pub fn decode(bytes: &[u8]) -> Result<Vec<FrameDetections>, ArtifactError> {
    let header = MAGIC.len() + 1;
    if bytes.len() < MAGIC.len() {
        return Err(ArtifactError::Truncated);
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(ArtifactError::BadMagic);
    }
    if bytes.len() < header {
        return Err(ArtifactError::Truncated);
    }
    let version = ProtocolVersion::try_from(bytes[MAGIC.len()])?;
    let payload = &bytes[header..];

    let frames: Vec<Vec<DetectedObject>> = match version {
        ProtocolVersion::Json => serde_json::from_slice(payload)?,
        ProtocolVersion::Bincode => bincode::deserialize(payload)?,
    };
    Ok(frames
        .into_iter()
        .enumerate()
        .map(|(index, objects)| FrameDetections::new(index, objects))
        .collect())
}

/// Write detections to `path`, replacing any existing file.
pub fn save_detections(
    path: &Path,
    detections: &[FrameDetections],
    version: ProtocolVersion,
) -> Result<(), ArtifactError> {
    let bytes = encode(detections, version)?;
    fs::write(path, bytes)?;
    tracing::info!(
        "Saved detections for {} frames to {} (protocol {:?})",
        detections.len(),
        path.display(),
        version
    );
    Ok(())
}

pub fn load_detections(path: &Path) -> Result<Vec<FrameDetections>, ArtifactError> {
    let bytes = fs::read(path)?;
    decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Point;

    fn sample() -> Vec<FrameDetections> {
        vec![
            FrameDetections::new(
                0,
                vec![DetectedObject::from_corners(1.0, 2.0, 11.0, 22.0, 0.75, "car")],
            ),
            FrameDetections::new(1, Vec::new()),
            FrameDetections::new(
                2,
                vec![
                    DetectedObject::new(Point::new(50.0, 60.0), 8.0, 4.0, 0.5, "person"),
                    DetectedObject::new(Point::new(5.0, 6.0), 3.0, 3.0, 0.25, "bicycle"),
                ],
            ),
        ]
    }

    #[test]
    fn test_save_and_load_both_protocols() {
        let dir = tempfile::tempdir().unwrap();
        for version in [ProtocolVersion::Json, ProtocolVersion::Bincode] {
            let path = dir.path().join(format!("detections-{:?}.bin", version));
            save_detections(&path, &sample(), version).unwrap();
            let raw = fs::read(&path).unwrap();
            assert_eq!(&raw[..4], b"VDET");
            assert_eq!(raw[4], version.as_byte());
            assert_eq!(load_detections(&path).unwrap(), sample());
        }
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.bin");
        save_detections(&path, &sample(), ProtocolVersion::Json).unwrap();
        save_detections(&path, &sample()[..1], ProtocolVersion::Bincode).unwrap();
        assert_eq!(load_detections(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_records_are_reindexed_by_position() {
        let shifted = vec![FrameDetections::new(7, Vec::new())];
        let bytes = encode(&shifted, ProtocolVersion::LATEST).unwrap();
        assert_eq!(decode(&bytes).unwrap()[0].frame_index, 0);
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(decode(b"NOPE\x02"), Err(ArtifactError::BadMagic)));
    }

    #[test]
    fn test_unsupported_version() {
        assert!(matches!(
            decode(b"VDET\x09[]"),
            Err(ArtifactError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(decode(b"VD"), Err(ArtifactError::Truncated)));
        assert!(matches!(decode(b"VDET"), Err(ArtifactError::Truncated)));

        let bytes = encode(&sample(), ProtocolVersion::Bincode).unwrap();
        assert!(matches!(
            decode(&bytes[..bytes.len() - 3]),
            Err(ArtifactError::Bincode(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_detections(Path::new("/no/such/detections.bin")),
            Err(ArtifactError::Io(_))
        ));
    }
}
