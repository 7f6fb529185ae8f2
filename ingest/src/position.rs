//! Bounding box → one-degree grid cell.

/// Grid cell stored when a changeset has no bounding box.
pub const NO_POSITION: GridPos = GridPos { x: -1, y: -1 };

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Quantized bounding-box midpoint, `x ∈ [0, 360)`, `y ∈ [0, 180)`,
/// or [`NO_POSITION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridPos {
    pub x: i16,
    pub y: i16,
}

/// Quantize the midpoint of `bbox`.
///
/// `x = round(mid_x - 180) mod 360`, `y = round(mid_y + 90) mod 180`, where
/// `round` sends ties to the even integer and `mod` is Euclidean, so boxes
/// crossing the antimeridian or a pole still land inside the grid.
pub fn quantize(bbox: Option<&BoundingBox>) -> GridPos {
    let Some(bbox) = bbox else {
        return NO_POSITION;
    };
    let mid_x = (bbox.min_x + bbox.max_x) / 2.0;
    let mid_y = (bbox.min_y + bbox.max_y) / 2.0;
    GridPos {
        x: wrap(mid_x - 180.0, 360),
        y: wrap(mid_y + 90.0, 180),
    }
}

fn wrap(value: f64, modulus: i64) -> i16 {
    // `as` saturates for out-of-range floats; the Euclidean remainder then
    // brings any finite input back into [0, modulus).
    (value.round_ties_even() as i64).rem_euclid(modulus) as i16
}
