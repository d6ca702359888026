//! Synthetic motion and intensity fields.
//!
//! Every generator is deterministic so tests can assert exact values.
//! Fields are row-major, row 0 first.

/// Creates a motion field with the same displacement everywhere.
///
/// Returns `(dx, dy)` planes in pixels per nowcast step.
pub fn create_uniform_motion(width: usize, height: usize, dx: f64, dy: f64) -> (Vec<f64>, Vec<f64>) {
    (vec![dx; width * height], vec![dy; width * height])
}

/// Creates a counter-clockwise rotation about the grid centre.
///
/// Speed grows linearly with the distance from the centre and reaches
/// `max_speed` pixels per step at the corners, so trajectories starting near
/// the edge leave the grid while those near the centre stay inside.
pub fn create_rotation_motion(width: usize, height: usize, max_speed: f64) -> (Vec<f64>, Vec<f64>) {
    let cx = (width as f64 - 1.0) / 2.0;
    let cy = (height as f64 - 1.0) / 2.0;
    let max_dist = (cx * cx + cy * cy).sqrt().max(f64::EPSILON);
    let scale = max_speed / max_dist;

    let mut dx = Vec::with_capacity(width * height);
    let mut dy = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let rx = col as f64 - cx;
            let ry = row as f64 - cy;
            dx.push(-ry * scale);
            dy.push(rx * scale);
        }
    }
    (dx, dy)
}

/// Stacks `dx` and `dy` into the `[2, height, width]` archive layout.
pub fn stack_motion_planes(dx: &[f64], dy: &[f64]) -> Vec<f64> {
    dx.iter().chain(dy.iter()).copied().collect()
}

/// Creates a west-to-east ramp of codes from 0 to `max_code`.
pub fn create_code_ramp(width: usize, height: usize, max_code: u16) -> Vec<u16> {
    let span = width.saturating_sub(1).max(1) as f64;
    let mut data = Vec::with_capacity(width * height);
    for _row in 0..height {
        for col in 0..width {
            data.push((max_code as f64 * col as f64 / span).round() as u16);
        }
    }
    data
}

/// Creates a round rain cell on a dry background.
///
/// Codes fall linearly from `peak` at `(cx, cy)` to zero at `radius`.
pub fn create_rain_cell(
    width: usize,
    height: usize,
    (cx, cy): (f64, f64),
    radius: f64,
    peak: u16,
) -> Vec<u16> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let dist = ((col as f64 - cx).powi(2) + (row as f64 - cy).powi(2)).sqrt();
            let factor = (1.0 - dist / radius).max(0.0);
            data.push((peak as f64 * factor).round() as u16);
        }
    }
    data
}

/// Sets the given `(col, row)` positions to `nodata`.
pub fn with_nodata(mut data: Vec<u16>, width: usize, positions: &[(usize, usize)], nodata: u16) -> Vec<u16> {
    for &(col, row) in positions {
        if let Some(value) = data.get_mut(row * width + col) {
            *value = nodata;
        }
    }
    data
}
