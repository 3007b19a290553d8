//! Hand-off of assembled frames to rendering and encoding.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use composite::{FrameLabel, SequenceSlot};
use goes_common::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use storage::{encode_entry, CacheEntryMeta};
use tracing::info;

/// Consumer of the ordered frame sequence.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn write_sequence(&self, sequence: &[SequenceSlot]) -> PipelineResult<FrameManifest>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub index: usize,
    pub label: FrameLabel,
    pub name: String,
    /// File name relative to the manifest, or `None` for a missing frame.
    pub file: Option<String>,
    pub samples: usize,
    pub valid_pixels: usize,
}

/// Ordered listing of a written sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameManifest {
    pub frames: Vec<ManifestEntry>,
}

impl FrameManifest {
    pub fn missing(&self) -> usize {
        self.frames.iter().filter(|f| f.file.is_none()).count()
    }
}

/// Writes `frame_NNN.grst` files and `manifest.json` into a directory.
///
/// Frames use the cache-entry layout with the frame name as key, so any
/// reader of cache blobs can load them.
#[derive(Debug, Clone)]
pub struct DirectoryFrameSink {
    dir: PathBuf,
}

impl DirectoryFrameSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl FrameSink for DirectoryFrameSink {
    async fn write_sequence(&self, sequence: &[SequenceSlot]) -> PipelineResult<FrameManifest> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut frames = Vec::with_capacity(sequence.len());
        for (index, slot) in sequence.iter().enumerate() {
            let label = slot.label();
            let entry = match slot.frame() {
                Some(frame) => {
                    let file = format!("frame_{:03}.grst", index);
                    let meta = CacheEntryMeta::new(label.to_string(), frame.raster.shape(), None);
                    let bytes = encode_entry(&meta, &frame.raster)
                        .map_err(|e| PipelineError::WriteError(e.to_string()))?;
                    tokio::fs::write(self.dir.join(&file), &bytes)
                        .await
                        .map_err(|e| PipelineError::WriteError(format!("{}: {}", file, e)))?;

                    ManifestEntry {
                        index,
                        label,
                        name: label.to_string(),
                        file: Some(file),
                        samples: frame.samples,
                        valid_pixels: frame.raster.valid_count(),
                    }
                }
                None => ManifestEntry {
                    index,
                    label,
                    name: label.to_string(),
                    file: None,
                    samples: 0,
                    valid_pixels: 0,
                },
            };
            frames.push(entry);
        }

        let manifest = FrameManifest { frames };
        let json = serde_json::to_vec_pretty(&manifest)?;
        tokio::fs::write(self.dir.join("manifest.json"), json).await?;

        info!(
            dir = %self.dir.display(),
            frames = manifest.frames.len(),
            missing = manifest.missing(),
            "Wrote frame sequence"
        );
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composite::CompositeFrame;
    use goes_common::{Raster, RasterShape};
    use storage::decode_entry;

    fn label(hour: u32) -> FrameLabel {
        FrameLabel::TimeOfDay { hour, minute: 0 }
    }

    #[tokio::test]
    async fn test_writes_frames_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let raster = Raster::new(RasterShape::new(1, 3), vec![1.0, f32::NAN, 3.0]).unwrap();
        let sequence = vec![
            SequenceSlot::Present(CompositeFrame {
                label: label(0),
                raster: raster.clone(),
                samples: 2,
                min_pixel_samples: 0,
                max_pixel_samples: 2,
            }),
            SequenceSlot::Missing(label(1)),
        ];

        let sink = DirectoryFrameSink::new(dir.path().join("frames"));
        let manifest = sink.write_sequence(&sequence).await.unwrap();

        assert_eq!(manifest.frames.len(), 2);
        assert_eq!(manifest.missing(), 1);
        assert_eq!(manifest.frames[0].file.as_deref(), Some("frame_000.grst"));
        assert_eq!(manifest.frames[0].valid_pixels, 2);
        assert_eq!(manifest.frames[1].name, "01:00Z");

        let bytes = std::fs::read(sink.dir().join("frame_000.grst")).unwrap();
        let entry = decode_entry(&bytes).unwrap();
        assert_eq!(entry.meta.key, "00:00Z");
        assert!(entry.raster.bitwise_eq(&raster));

        let on_disk: FrameManifest =
            serde_json::from_slice(&std::fs::read(sink.dir().join("manifest.json")).unwrap()).unwrap();
        assert_eq!(on_disk, manifest);
        assert!(!sink.dir().join("frame_001.grst").exists());
    }
}
