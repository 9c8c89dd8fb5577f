use crate::detection::DetectedObject;
use crate::video::Frame;
use opencv::core::{Point, Scalar, Vector};
use opencv::imgproc::{polylines, put_text, FONT_HERSHEY_COMPLEX, LINE_AA};

const FONT_SCALE: f64 = 0.85;
const THICKNESS: i32 = 2;

/// Copy of `frame` with each object's box and a `label: NN%` caption drawn
/// on it. Colours are picked per label, so one class keeps one colour
/// across frames.
pub fn draw_bounding_boxes(frame: &Frame, objects: &[DetectedObject]) -> opencv::Result<Frame> {
    let mut canvas = frame.clone();
    for obj in objects {
        let color = label_color(&obj.label);
        let corners: Vector<Point> = obj
            .bounding_box()
            .iter()
            .map(|p| Point::new(p.x.round() as i32, p.y.round() as i32))
            .collect();
        let top_left = corners.get(0)?;

        let mut contours = Vector::<Vector<Point>>::new();
        contours.push(corners);
        polylines(&mut canvas, &contours, true, color, THICKNESS, LINE_AA, 0)?;

        let caption = format!("{}: {:.0}%", obj.label, obj.score * 100.0);
        put_text(
            &mut canvas,
            &caption,
            Point::new(top_left.x, (top_left.y - 6).max(12)),
            FONT_HERSHEY_COMPLEX,
            FONT_SCALE,
            color,
            THICKNESS,
            LINE_AA,
            false,
        )?;
    }
    Ok(canvas)
}

fn label_color(label: &str) -> Scalar {
    // FNV-1a
    let hash = label
        .bytes()
        .fold(0x811c_9dc5u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193));
    let channel = |shift: u32| (64 + ((hash >> shift) & 0xff) % 192) as f64;
    Scalar::new(channel(0), channel(8), channel(16), 0.0)
}
