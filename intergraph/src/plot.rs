//! SVG renderings of matrices.
//!
//! Both plots are square, with row 0 at the top and column 0 on the
//! left, the way a matrix is printed. Each mark carries a `<title>`
//! so hovering in a browser shows which pair it belongs to.

use crate::network::Species;
use crate::MARGIN_LR;
use ndarray::Array2;

/// Sparsity pattern plot: one square marker per non-zero entry.
///
/// `marker_size` is the side of each marker in pixels, and does not
/// change with the size of the matrix.
pub fn spy(matrix: &Array2<f64>, names: &[Species], width: f64, marker_size: f64) -> String {
    let n = matrix.nrows().max(1);
    let spacing = (width - (MARGIN_LR * 2.0)) / n as f64;

    let mut markers = String::new();
    for ((row, col), v) in matrix.indexed_iter() {
        if *v == 0.0 {
            continue;
        }
        // centre of the cell, then back off half a marker
        let x = (spacing * col as f64) + (spacing / 2.0) + MARGIN_LR - (marker_size / 2.0);
        let y = (spacing * row as f64) + (spacing / 2.0) + MARGIN_LR - (marker_size / 2.0);
        markers += &format!(
            "<rect x=\"{x}\" y=\"{y}\" width=\"{marker_size}\" height=\"{marker_size}\" fill=\"black\"><title>{}</title></rect>\n\t",
            title(names, row, col, *v)
        );
    }

    svg(width, &frame(width), &markers)
}

/// Heat map of a matrix on a diverging scale: red for positive,
/// blue for negative, white for zero. Colour intensity is relative
/// to the largest absolute entry.
pub fn heatmap(matrix: &Array2<f64>, names: &[Species], width: f64) -> String {
    let n = matrix.nrows().max(1);
    let spacing = (width - (MARGIN_LR * 2.0)) / n as f64;
    let max_abs = matrix.iter().fold(0.0_f64, |m, v| m.max(v.abs()));

    let mut cells = String::new();
    for ((row, col), v) in matrix.indexed_iter() {
        let x = (spacing * col as f64) + MARGIN_LR;
        let y = (spacing * row as f64) + MARGIN_LR;
        cells += &format!(
            "<rect x=\"{x}\" y=\"{y}\" width=\"{spacing}\" height=\"{spacing}\" fill=\"{}\"><title>{}</title></rect>\n\t",
            diverging_colour(*v, max_abs),
            title(names, row, col, *v)
        );
    }

    svg(width, &frame(width), &cells)
}

/// `rgb(...)` for `value` on a white-centred red/blue scale.
fn diverging_colour(value: f64, max_abs: f64) -> String {
    if max_abs == 0.0 || value == 0.0 || !value.is_finite() {
        return "rgb(255,255,255)".into();
    }
    let t = (value.abs() / max_abs).clamp(0.0, 1.0);
    let fade = (255.0 * (1.0 - t)).round() as u8;
    if value > 0.0 {
        format!("rgb(255,{fade},{fade})")
    } else {
        format!("rgb({fade},{fade},255)")
    }
}

fn frame(width: f64) -> String {
    let side = width - (MARGIN_LR * 2.0);
    format!(
        "<rect x=\"{MARGIN_LR}\" y=\"{MARGIN_LR}\" width=\"{side}\" height=\"{side}\" fill=\"none\" stroke=\"grey\"/>"
    )
}

fn title(names: &[Species], row: usize, col: usize, value: f64) -> String {
    let from = names.get(row).map_or("?", |s| s.as_str());
    let to = names.get(col).map_or("?", |s| s.as_str());
    escape(&format!("{from} -> {to}: {value}"))
}

/// Minimal XML escaping for text content.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn svg(width: f64, frame: &str, body: &str) -> String {
    format!(
        r#"<svg version="1.1"
    width="{width}" height="{width}"
    xmlns="http://www.w3.org/2000/svg">
    {frame}
    {body}
</svg>
"#
    )
}
