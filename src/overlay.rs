// src/overlay.rs
//
// Annotated-frame rendering: lane regions, tracked vehicles with their
// frozen lane assignments, per-lane running totals. Display only; nothing
// here feeds back into tracking or counting.

use crate::counting::CountingLedger;
use crate::detector::Detection;
use crate::lanes::LaneLayout;
use crate::types::{Centroid, Frame};
use anyhow::Result;
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
};
use std::collections::BTreeMap;

// BGR colors
fn yellow() -> core::Scalar {
    core::Scalar::new(0.0, 255.0, 255.0, 0.0)
}
fn green() -> core::Scalar {
    core::Scalar::new(0.0, 255.0, 0.0, 0.0)
}
fn red() -> core::Scalar {
    core::Scalar::new(0.0, 0.0, 255.0, 0.0)
}
fn blue() -> core::Scalar {
    core::Scalar::new(255.0, 0.0, 0.0, 0.0)
}
fn black() -> core::Scalar {
    core::Scalar::new(0.0, 0.0, 0.0, 0.0)
}

pub fn draw_annotations(
    frame: &Frame,
    detections: &[Detection],
    tracks: &BTreeMap<u32, Centroid>,
    ledger: &CountingLedger,
    layout: &LaneLayout,
) -> Result<Mat> {
    let mat = Mat::from_slice(&frame.data)?;
    let mat = mat.reshape(3, frame.height as i32)?;
    let mut output = Mat::default();
    imgproc::cvt_color(&mat, &mut output, imgproc::COLOR_RGB2BGR, 0)?;

    draw_lane_regions(&mut output, layout, frame.height as i32)?;

    for (&id, &centroid) in tracks {
        let point = core::Point::new(centroid.0 as i32, centroid.1 as i32);

        // The tracker keeps centroids, not boxes; recover the box for
        // display by nearest detection, falling back to a centroid marker.
        match nearest_detection(centroid, detections) {
            Some(det) => {
                let rect = core::Rect::new(
                    det.bbox[0] as i32,
                    det.bbox[1] as i32,
                    (det.bbox[2] - det.bbox[0]) as i32,
                    (det.bbox[3] - det.bbox[1]) as i32,
                );
                imgproc::rectangle(&mut output, rect, green(), 2, imgproc::LINE_8, 0)?;
                imgproc::put_text(
                    &mut output,
                    &format!("ID {}", id),
                    core::Point::new(det.bbox[0] as i32, det.bbox[1] as i32 - 8),
                    imgproc::FONT_HERSHEY_SIMPLEX,
                    0.6,
                    green(),
                    2,
                    imgproc::LINE_8,
                    false,
                )?;
            }
            None => {
                imgproc::circle(&mut output, point, 4, red(), -1, imgproc::LINE_8, 0)?;
                imgproc::put_text(
                    &mut output,
                    &format!("ID {}", id),
                    core::Point::new(point.x + 5, point.y - 5),
                    imgproc::FONT_HERSHEY_SIMPLEX,
                    0.5,
                    red(),
                    2,
                    imgproc::LINE_8,
                    false,
                )?;
            }
        }

        // The ledger's frozen lane, not this frame's classification.
        if let Some(lane) = ledger.lane_of(id) {
            imgproc::put_text(
                &mut output,
                &format!("Lane {}", lane),
                core::Point::new(point.x + 5, point.y + 15),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.5,
                blue(),
                2,
                imgproc::LINE_8,
                false,
            )?;
        }
    }

    draw_lane_totals(&mut output, ledger)?;

    Ok(output)
}

fn draw_lane_regions(output: &mut Mat, layout: &LaneLayout, height: i32) -> Result<()> {
    if layout.polygons().is_empty() {
        // Default vertical-thirds split: separator lines and band labels.
        let third = layout.frame_width() / 3.0;
        for i in 1..3 {
            let x = (third * i as f32) as i32;
            imgproc::line(
                output,
                core::Point::new(x, 0),
                core::Point::new(x, height),
                yellow(),
                2,
                imgproc::LINE_AA,
                0,
            )?;
        }
        for lane in 1..=3 {
            let cx = (third * (lane as f32 - 0.5)) as i32;
            imgproc::put_text(
                output,
                &format!("Lane {}", lane),
                core::Point::new(cx - 30, 30),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.8,
                yellow(),
                2,
                imgproc::LINE_8,
                false,
            )?;
        }
        return Ok(());
    }

    for (i, polygon) in layout.polygons().iter().enumerate() {
        let points: core::Vector<core::Point> = polygon
            .iter()
            .map(|&(x, y)| core::Point::new(x as i32, y as i32))
            .collect();
        let mut contours: core::Vector<core::Vector<core::Point>> = core::Vector::new();
        contours.push(points);
        imgproc::polylines(output, &contours, true, yellow(), 2, imgproc::LINE_AA, 0)?;

        let cx = polygon.iter().map(|p| p.0).sum::<f32>() / polygon.len() as f32;
        imgproc::put_text(
            output,
            &format!("Lane {}", i + 1),
            core::Point::new(cx as i32 - 30, 30),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.8,
            yellow(),
            2,
            imgproc::LINE_8,
            false,
        )?;
    }
    Ok(())
}

fn draw_lane_totals(output: &mut Mat, ledger: &CountingLedger) -> Result<()> {
    for (i, (lane, count)) in ledger.counts().iter().enumerate() {
        let text = format!("Lane {}: {}", lane, count);
        let origin = core::Point::new(10, 30 + 25 * i as i32);
        // Black outline under the green text keeps it readable on any frame.
        imgproc::put_text(
            output,
            &text,
            origin,
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.9,
            black(),
            3,
            imgproc::LINE_8,
            false,
        )?;
        imgproc::put_text(
            output,
            &text,
            origin,
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.9,
            green(),
            2,
            imgproc::LINE_8,
            false,
        )?;
    }
    Ok(())
}

fn nearest_detection<'a>(centroid: Centroid, detections: &'a [Detection]) -> Option<&'a Detection> {
    detections.iter().min_by(|a, b| {
        distance_to(centroid, a).total_cmp(&distance_to(centroid, b))
    })
}

fn distance_to(centroid: Centroid, det: &Detection) -> f32 {
    let bx = (det.bbox[0] + det.bbox[2]) / 2.0;
    let by = (det.bbox[1] + det.bbox[3]) / 2.0;
    (centroid.0 - bx).hypot(centroid.1 - by)
}
