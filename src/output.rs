//! CLI output formatting for all commands.
//!
//! # Output Format
//!
//! ## Plan
//!
//! ```text
//! maps%2Fnorth/square/200,/90/gray.png
//!     Source: 1024x768
//!     001 [region] from 128, 0 by 768, 768 pixels to 896, 768
//!     002 [size] 200 x 200 (scaled)
//!     003 [rotation] by 90.000, flip: false
//!     004 [quality] gray
//!     005 [format] png
//! ```
//!
//! ## Render
//!
//! ```text
//! maps%2Fnorth/full/max/0/color.jpg → north.jpg
//!     image/jpeg, 48213 bytes
//! ```
//!
//! ## Seed
//!
//! ```text
//! maps/north.jpg (4000x3000)
//!     Tiles: 63 rendered of 64
//!     Failed: maps%2Fnorth.jpg/0,0,512,512/512,/0/color.jpg
//!         Image processing failed: ...
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure and perform no I/O.

use crate::imaging::{RenderPlan, Rendered};
use crate::tiles::SeedReport;
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

// ============================================================================
// plan
// ============================================================================

/// Canonical URI, source size, then one numbered line per step.
pub fn format_plan(uri: &str, plan: &RenderPlan) -> Vec<String> {
    let mut lines = vec![
        uri.to_string(),
        format!("{}Source: {}", indent(1), plan.source),
    ];
    for (i, step) in plan.steps().iter().enumerate() {
        lines.push(format!("{}{} {}", indent(1), format_index(i + 1), step));
    }
    lines
}

pub fn print_plan(uri: &str, plan: &RenderPlan) {
    for line in format_plan(uri, plan) {
        println!("{}", line);
    }
}

// ============================================================================
// render
// ============================================================================

pub fn format_render(uri: &str, rendered: &Rendered, output: &Path) -> Vec<String> {
    vec![
        format!("{} → {}", uri, output.display()),
        format!(
            "{}{}, {} bytes",
            indent(1),
            rendered.content_type,
            rendered.body.len()
        ),
    ]
}

pub fn print_render(uri: &str, rendered: &Rendered, output: &Path) {
    for line in format_render(uri, rendered, output) {
        println!("{}", line);
    }
}

// ============================================================================
// seed
// ============================================================================

pub fn format_seed_report(report: &SeedReport) -> Vec<String> {
    let header = match report.dimensions {
        Some(dims) => format!("{} ({})", report.id, dims),
        None => report.id.clone(),
    };
    let mut lines = vec![
        header,
        format!(
            "{}Tiles: {} rendered of {}",
            indent(1),
            report.rendered,
            report.tiles
        ),
    ];
    for failure in &report.failures {
        lines.push(format!("{}Failed: {}", indent(1), failure.uri));
        lines.push(format!("{}{}", indent(2), failure.error));
    }
    lines
}

pub fn print_seed_report(report: &SeedReport) {
    for line in format_seed_report(report) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::SeedFailure;
    use crate::transform::{FormatInstruction, SizeInstruction};
    use crate::types::Dimensions;

    #[test]
    fn format_index_pads_to_three_digits() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(1000), "1000");
    }

    #[test]
    fn plan_lists_numbered_steps() {
        let plan = RenderPlan {
            source: Dimensions::new(1000, 500),
            region: None,
            size: Some(SizeInstruction {
                width: 300,
                height: 150,
                force: false,
                enlarge: false,
            }),
            rotation: None,
            quality: "color".into(),
            format: FormatInstruction {
                format: "jpg".into(),
            },
        };

        let lines = format_plan("id/full/300,/0/color.jpg", &plan);
        assert_eq!(
            lines,
            vec![
                "id/full/300,/0/color.jpg",
                "    Source: 1000x500",
                "    001 [size] 300 x 150 (scaled)",
                "    002 [quality] color",
                "    003 [format] jpg",
            ]
        );
    }

    #[test]
    fn render_shows_destination_and_size() {
        let rendered = Rendered::new(vec![0; 42], "png");
        let lines = format_render("a/full/max/0/color.png", &rendered, Path::new("out.png"));
        assert_eq!(lines[0], "a/full/max/0/color.png → out.png");
        assert_eq!(lines[1], "    image/png, 42 bytes");
    }

    #[test]
    fn seed_report_lists_failures() {
        let report = SeedReport {
            id: "img".into(),
            dimensions: Some(Dimensions::new(100, 100)),
            tiles: 4,
            rendered: 3,
            failures: vec![SeedFailure {
                uri: "img/0,0,64,64/64,/0/color.jpg".into(),
                error: "boom".into(),
            }],
        };

        let lines = format_seed_report(&report);
        assert_eq!(lines[0], "img (100x100)");
        assert_eq!(lines[1], "    Tiles: 3 rendered of 4");
        assert_eq!(lines[2], "    Failed: img/0,0,64,64/64,/0/color.jpg");
        assert_eq!(lines[3], "        boom");
    }
}
