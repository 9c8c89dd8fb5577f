use crate::cli::{Command, DetectArgs, InfoArgs, RenderArgs, SequenceArgs};
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use video_detections::detection::filters::{
    filter_avoiding_duplicates, filter_by_classes, filter_by_min_score, filter_inside_mask,
};
use video_detections::detection::{FrameDetections, Mask, ModelConfig, RtDetrDetector};
use video_detections::pipeline::artifact::{load_detections, save_detections};
use video_detections::pipeline::draw::draw_bounding_boxes;
use video_detections::pipeline::{progress_bar, BatchDetectionPipeline};
use video_detections::run_context::{self, RunSettings};
use video_detections::video::sequence::WindowedSequence;
use video_detections::video::writer::SequenceWriter;
use video_detections::video::{open_source, FrameSource};

pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Detect(args) => detect(&args),
        Command::Render(args) => render(&args),
        Command::Info(args) => info(&args),
    }
}

fn open_sequence(video: &Path, args: &SequenceArgs) -> Result<WindowedSequence> {
    let source = open_source(video, args.backend)?;
    let mut sequence = WindowedSequence::new(source, args.cache_size)?;
    if let Some(start) = args.start_frame {
        sequence.set_start_frame(start)?;
    }
    if let Some(end) = args.end_frame {
        sequence.set_end_frame(end)?;
    }
    Ok(sequence)
}

fn detect(args: &DetectArgs) -> Result<()> {
    let videos = if args.input.is_dir() {
        run_context::list_videos(&args.input)
    } else {
        vec![args.input.clone()]
    };
    if videos.is_empty() {
        return Err(anyhow!("No videos found in {}", args.input.display()));
    }
    let input_root = if args.input.is_dir() {
        args.input.as_path()
    } else {
        args.input.parent().unwrap_or(Path::new("."))
    };
    let runs = run_context::plan_runs(input_root, &videos)?;

    let mask = args
        .mask
        .as_deref()
        .map(Mask::load)
        .transpose()
        .context("Failed to load mask")?;

    let model_config = ModelConfig {
        model_file: args.model_file.clone(),
        models_dir: args.models_dir.clone(),
        use_local: args.use_local,
        ..Default::default()
    };
    let mut detector = RtDetrDetector::new(&model_config)?;

    for (video, run_id) in &runs {
        let run_dir = detect_video(&mut detector, video, run_id, args, mask.as_ref())
            .with_context(|| format!("Detection failed for {}", video.display()))?;
        tracing::info!("Finished {} -> {}", video.display(), run_dir.display());
    }
    Ok(())
}

fn detect_video(
    detector: &mut RtDetrDetector,
    video: &Path,
    run_id: &str,
    args: &DetectArgs,
    mask: Option<&Mask>,
) -> Result<PathBuf> {
    let mut sequence = open_sequence(video, &args.sequence)?;

    let settings = RunSettings {
        start_frame: args.sequence.start_frame,
        end_frame: args.sequence.end_frame,
        batch_size: args.batch_size,
        cache_size: args.sequence.cache_size,
        backend: args.sequence.backend,
        model: args.model_file.clone(),
        protocol: args.protocol,
    };
    let run = run_context::create_run(
        &args.output_root,
        video,
        run_id,
        sequence.properties(),
        settings,
        args.force,
    )?;

    let pipeline = BatchDetectionPipeline::new(args.batch_size)?;
    let batches = pipeline.batch_count(sequence.len()) as u64;
    let pipeline = pipeline.with_progress(progress_bar(batches)?);
    let mut records = pipeline.run(detector, &mut sequence, mask)?;
    sequence.close();

    for record in &mut records {
        postprocess(record, args, mask);
    }

    let path = run.detections_path();
    save_detections(&path, &records, args.protocol)?;
    Ok(run.output_dir)
}

/// Apply the optional post-filters in a fixed order: mask region, classes,
/// score, duplicates.
fn postprocess(record: &mut FrameDetections, args: &DetectArgs, mask: Option<&Mask>) {
    if let (true, Some(mask)) = (args.filter_by_mask, mask) {
        record.objects = filter_inside_mask(&record.objects, mask);
    }
    if !args.classes.is_empty() {
        record.objects = filter_by_classes(&record.objects, &args.classes);
    }
    if let Some(min_score) = args.min_score {
        record.objects = filter_by_min_score(&record.objects, min_score);
    }
    if let Some(distance) = args.duplicate_distance {
        record.objects = filter_avoiding_duplicates(&record.objects, distance);
    }
}

fn render(args: &RenderArgs) -> Result<()> {
    let detections = load_detections(&args.detections)
        .with_context(|| format!("Failed to load {}", args.detections.display()))?;
    let mut sequence = open_sequence(&args.video, &args.sequence)?;
    if detections.len() != sequence.len() {
        tracing::warn!(
            "{} holds {} frames but the window has {}; frames without detections are copied as is",
            args.detections.display(),
            detections.len(),
            sequence.len()
        );
    }

    let mut writer =
        SequenceWriter::create(&args.output, sequence.fps(), sequence.width(), sequence.height())?;
    let pb = progress_bar(sequence.len() as u64)?;
    for index in 0..sequence.len() {
        let frame = sequence.get(index)?;
        let frame = match detections.get(index) {
            Some(record) => draw_bounding_boxes(&frame, &record.objects)?,
            None => frame,
        };
        writer.write(&frame)?;
        pb.inc(1);
    }
    writer.release()?;
    pb.finish();
    tracing::info!(
        "Rendered {} frames to {}",
        writer.frames_written(),
        args.output.display()
    );
    Ok(())
}

fn info(args: &InfoArgs) -> Result<()> {
    let mut source = open_source(&args.video, args.backend)?;
    let props = source.properties();
    source.close();
    println!("{}", serde_json::to_string_pretty(&props)?);
    Ok(())
}
