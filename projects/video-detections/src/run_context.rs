use crate::pipeline::artifact::ProtocolVersion;
use crate::video::{Backend, VideoProperties};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mkv", "mov"];
pub const METADATA_FILE: &str = "metadata.json";
pub const DETECTIONS_FILE: &str = "detections.bin";

/// How a detection run was configured.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub start_frame: Option<usize>,
    pub end_frame: Option<usize>,
    pub batch_size: usize,
    pub cache_size: usize,
    pub backend: Backend,
    pub model: String,
    pub protocol: ProtocolVersion,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunMetadata {
    pub original_name: String,
    pub created_at: DateTime<Utc>,
    pub run_id: String,
    pub properties: VideoProperties,
    #[serde(flatten)]
    pub settings: RunSettings,
    #[serde(skip)]
    pub output_dir: PathBuf,
}

impl RunMetadata {
    pub fn load(run_dir: &Path) -> Result<Self> {
        let path = run_dir.join(METADATA_FILE);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut metadata: RunMetadata = serde_json::from_str(&content)?;
        metadata.output_dir = run_dir.to_path_buf();
        Ok(metadata)
    }

    pub fn artifact_path(&self, artifact_name: &str) -> PathBuf {
        self.output_dir.join(artifact_name)
    }

    pub fn detections_path(&self) -> PathBuf {
        self.artifact_path(DETECTIONS_FILE)
    }
}

/// Every video file under `video_root`, sorted by path.
pub fn list_videos(video_root: &Path) -> Vec<PathBuf> {
    let mut videos: Vec<PathBuf> = WalkDir::new(video_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_video(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect();
    videos.sort();
    videos
}

pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| VIDEO_EXTENSIONS.contains(&s.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Run directory name for `video`: its path relative to `input_root` with
/// separators and dots replaced, so `day1/clip.mp4` becomes `day1_clip_mp4`.
pub fn run_id(input_root: &Path, video: &Path) -> Result<String> {
    let relative = match video.strip_prefix(input_root) {
        Ok(relative) if !relative.as_os_str().is_empty() => relative,
        _ => Path::new(
            video
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid video path: {}", video.display()))?,
        ),
    };
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().replace('.', "_"))
        .collect();
    Ok(parts.join("_"))
}

/// Pair every video with its run id. Fails if two videos would share a run
/// directory.
pub fn plan_runs(input_root: &Path, videos: &[PathBuf]) -> Result<Vec<(PathBuf, String)>> {
    let mut seen: HashMap<String, &PathBuf> = HashMap::new();
    let mut plan = Vec::with_capacity(videos.len());
    for video in videos {
        let id = run_id(input_root, video)?;
        if let Some(other) = seen.insert(id.clone(), video) {
            return Err(anyhow::anyhow!(
                "{} and {} would share the run directory {}",
                other.display(),
                video.display(),
                id
            ));
        }
        plan.push((video.clone(), id));
    }
    Ok(plan)
}

/// Create `<output_root>/<run_id>/` and write its `metadata.json`.
///
/// An existing run directory is an error unless `overwrite` is set, in which
/// case it is removed first.
pub fn create_run(
    output_root: &Path,
    video: &Path,
    run_id: &str,
    properties: VideoProperties,
    settings: RunSettings,
    overwrite: bool,
) -> Result<RunMetadata> {
    let video_name = video
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid video name: {}", video.display()))?;

    let output_dir = output_root.join(run_id);
    if output_dir.exists() {
        if !overwrite {
            return Err(anyhow::anyhow!(
                "Output directory already exists for: {}",
                run_id
            ));
        }
        tracing::warn!("Replacing existing run at {}", output_dir.display());
        fs::remove_dir_all(&output_dir)?;
    }

    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let metadata = RunMetadata {
        original_name: video_name.to_string(),
        created_at: Utc::now(),
        run_id: run_id.to_string(),
        properties,
        settings,
        output_dir: output_dir.clone(),
    };

    let content = serde_json::to_string_pretty(&metadata)?;
    fs::write(output_dir.join(METADATA_FILE), content)?;

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RunSettings {
        RunSettings {
            start_frame: Some(10),
            end_frame: None,
            batch_size: 8,
            cache_size: 16,
            backend: Backend::Opencv,
            model: "rtdetr/v2-s.onnx".to_string(),
            protocol: ProtocolVersion::Bincode,
        }
    }

    fn properties() -> VideoProperties {
        VideoProperties {
            width: 640,
            height: 480,
            fps: 25.0,
            total_frames: 300,
        }
    }

    #[test]
    fn test_list_videos_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("day2");
        fs::create_dir_all(&nested).unwrap();
        for name in ["b.MP4", "a.avi", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::write(nested.join("c.mkv"), b"").unwrap();

        let videos = list_videos(dir.path());
        let names: Vec<_> = videos
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.avi"),
                PathBuf::from("b.MP4"),
                PathBuf::from("day2/c.mkv")
            ]
        );
    }

    #[test]
    fn test_run_id_follows_relative_path() {
        let root = Path::new("/videos");
        assert_eq!(
            run_id(root, Path::new("/videos/day1/clip.mp4")).unwrap(),
            "day1_clip_mp4"
        );
        assert_eq!(run_id(root, Path::new("/videos/clip.avi")).unwrap(), "clip_avi");
        assert_eq!(
            run_id(root, Path::new("/elsewhere/clip.mp4")).unwrap(),
            "clip_mp4"
        );
    }

    #[test]
    fn test_plan_runs_rejects_shared_run_dirs() {
        let root = Path::new("/videos");
        let videos = vec![
            PathBuf::from("/videos/a_b/c.mp4"),
            PathBuf::from("/videos/a/b_c.mp4"),
        ];
        let err = plan_runs(root, &videos).unwrap_err();
        assert!(err.to_string().contains("a_b_c_mp4"));
    }

    #[test]
    fn test_same_stem_videos_get_separate_runs() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for name in ["day1/clip.mp4", "day2/clip.mp4", "clip.avi"] {
            let path = input.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"").unwrap();
        }

        let plan = plan_runs(input.path(), &list_videos(input.path())).unwrap();
        // A forced batch must not replace runs created earlier in the same batch.
        for (video, id) in &plan {
            create_run(output.path(), video, id, properties(), settings(), true).unwrap();
        }

        let mut ids: Vec<&str> = plan.iter().map(|(_, id)| id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["clip_avi", "day1_clip_mp4", "day2_clip_mp4"]);
        for id in ids {
            let loaded = RunMetadata::load(&output.path().join(id)).unwrap();
            assert_eq!(loaded.run_id, id);
        }
        let day2 = RunMetadata::load(&output.path().join("day2_clip_mp4")).unwrap();
        assert_eq!(day2.original_name, "clip.mp4");
    }

    #[test]
    fn test_create_run_writes_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let run = create_run(
            dir.path(),
            Path::new("clip.mp4"),
            "clip_mp4",
            properties(),
            settings(),
            false,
        )
        .unwrap();

        assert_eq!(run.run_id, "clip_mp4");
        assert_eq!(run.original_name, "clip.mp4");
        assert_eq!(run.output_dir, dir.path().join("clip_mp4"));
        assert_eq!(
            run.detections_path(),
            dir.path().join("clip_mp4/detections.bin")
        );

        let raw = fs::read_to_string(dir.path().join("clip_mp4/metadata.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["batch_size"], 8);
        assert_eq!(json["protocol"], "bincode");
        assert_eq!(json["backend"], "opencv");

        let loaded = RunMetadata::load(&run.output_dir).unwrap();
        assert_eq!(loaded.settings, settings());
        assert_eq!(loaded.properties, properties());
        assert_eq!(loaded.output_dir, run.output_dir);
    }

    #[test]
    fn test_existing_run_requires_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let video = Path::new("clip.mp4");
        create_run(dir.path(), video, "clip_mp4", properties(), settings(), false).unwrap();
        fs::write(dir.path().join("clip_mp4/stale.txt"), b"old").unwrap();

        assert!(create_run(dir.path(), video, "clip_mp4", properties(), settings(), false).is_err());

        create_run(dir.path(), video, "clip_mp4", properties(), settings(), true).unwrap();
        assert!(!dir.path().join("clip_mp4/stale.txt").exists());
        assert!(dir.path().join("clip_mp4/metadata.json").exists());
    }
}
