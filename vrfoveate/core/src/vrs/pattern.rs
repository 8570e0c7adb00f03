// Shading rate patterns: one byte per hardware tile holding the foveation tier. The generators
// are pure so that the same inputs always produce the same bytes.

use crate::{
    data::{distance_to_tier, FoveationRadii},
    geometry::ProjectionCenter,
};

// Distance is scaled by 2 so that the radii are relative to the half extent of the eye view
fn tile_tier(
    x: u32,
    y: u32,
    eye_width: u32,
    height: u32,
    center: &ProjectionCenter,
    radii: &FoveationRadii,
) -> u8 {
    let fx = (x as f32 + 0.5) / eye_width as f32;
    let fy = (y as f32 + 0.5) / height as f32;
    let dx = fx - center.x;
    let dy = fy - center.y;

    distance_to_tier(2. * (dx * dx + dy * dy).sqrt(), radii)
}

// Writes `columns` tiles of every row starting at `x_offset`. Positions are normalized by
// `eye_width`, which can be smaller than `columns`.
fn fill_eye(
    data: &mut [u8],
    x_offset: u32,
    columns: u32,
    eye_width: u32,
    height: u32,
    center: &ProjectionCenter,
    radii: &FoveationRadii,
) {
    let row_pitch = data.len() / height as usize;
    for y in 0..height {
        let row = y as usize * row_pitch;
        for x in 0..columns {
            data[row + (x_offset + x) as usize] =
                tile_tier(x, y, eye_width, height, center, radii);
        }
    }
}

/// Pattern covering a single eye view.
pub fn single_eye_pattern(
    width: u32,
    height: u32,
    center: &ProjectionCenter,
    radii: &FoveationRadii,
) -> Vec<u8> {
    let mut data = vec![0; (width * height) as usize];
    fill_eye(&mut data, 0, width, width, height, center, radii);

    data
}

/// Side-by-side pattern: the left eye occupies the first half of every row, the right eye the
/// remaining tiles. Both halves are normalized by half the width, so with an odd tile count the
/// last column lies past the right eye's edge.
pub fn combined_pattern(
    width: u32,
    height: u32,
    centers: &[ProjectionCenter; 2],
    radii: &FoveationRadii,
) -> Vec<u8> {
    let mut data = vec![0; (width * height) as usize];
    let half_width = width / 2;
    fill_eye(&mut data, 0, half_width, half_width, height, &centers[0], radii);
    fill_eye(
        &mut data,
        half_width,
        width - half_width,
        half_width,
        height,
        &centers[1],
        radii,
    );

    data
}

/// Two full size layers, one per eye. Array targets are rendered upside down and flipped before
/// submission, so the vertical projection center is mirrored.
pub fn array_pattern(
    width: u32,
    height: u32,
    centers: &[ProjectionCenter; 2],
    radii: &FoveationRadii,
) -> Vec<u8> {
    let mut data = Vec::with_capacity((2 * width * height) as usize);
    for center in centers.iter() {
        let flipped = ProjectionCenter {
            x: center.x,
            y: 1. - center.y,
        };
        data.extend(single_eye_pattern(width, height, &flipped, radii));
    }

    data
}
