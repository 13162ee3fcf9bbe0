//! Outer-boundary extraction from binary masks.
//!
//! Each 8-connected foreground region is traced with Moore-neighbour
//! tracing starting at its first pixel in raster order. Collinear boundary
//! points are dropped, and the region whose polygon encloses the largest
//! area wins. Holes are ignored.

use segflow_core::mask::MaskContour;

use crate::mask::BinaryMask;

/// Clockwise neighbour offsets in image coordinates (y grows downwards),
/// starting east.
const DIRS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

const WEST: usize = 4;

/// Outer boundary of the largest region in `mask`, or `None` for an empty
/// mask.
pub fn largest_contour(mask: &BinaryMask) -> Option<MaskContour> {
    region_starts(mask)
        .into_iter()
        .map(|start| {
            let polygon = compress(trace(mask, start));
            let area = shoelace_area(&polygon);
            MaskContour {
                polygon: polygon
                    .into_iter()
                    .map(|(x, y)| [x as f64, y as f64])
                    .collect(),
                area,
            }
        })
        .fold(None, |best: Option<MaskContour>, candidate| match best {
            Some(b) if b.area >= candidate.area => Some(b),
            _ => Some(candidate),
        })
}

/// First pixel, in raster order, of every 8-connected foreground region.
fn region_starts(mask: &BinaryMask) -> Vec<(i64, i64)> {
    let (w, h) = (i64::from(mask.width()), i64::from(mask.height()));
    let mut seen = vec![false; (w * h) as usize];
    let mut starts = Vec::new();
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if seen[idx] || !mask.get(x, y) {
                continue;
            }
            starts.push((x, y));
            seen[idx] = true;
            stack.push((x, y));
            while let Some((cx, cy)) = stack.pop() {
                for (dx, dy) in DIRS {
                    let (nx, ny) = (cx + dx, cy + dy);
                    if mask.get(nx, ny) {
                        let n = (ny * w + nx) as usize;
                        if !seen[n] {
                            seen[n] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }
        }
    }
    starts
}

/// Moore-neighbour trace of the region containing `start`.
///
/// `start` must be the region's first pixel in raster order, so its west
/// neighbour is background. Tracing stops when the walk is about to leave
/// `start` along the same edge it first took.
fn trace(mask: &BinaryMask, start: (i64, i64)) -> Vec<(i64, i64)> {
    let mut contour = vec![start];
    let mut cur = start;
    let mut back = WEST;
    let limit = 4 * (mask.width() as usize) * (mask.height() as usize) + 16;

    for _ in 0..limit {
        let Some((next, next_back)) = step(mask, cur, back) else {
            break;
        };
        if cur == start && contour.len() > 1 && next == contour[1] {
            contour.pop();
            break;
        }
        contour.push(next);
        cur = next;
        back = next_back;
    }
    contour
}

/// Scan clockwise from the backtrack direction for the next foreground
/// neighbour. Returns the neighbour and the direction, seen from it, of
/// the last background pixel scanned.
fn step(mask: &BinaryMask, cur: (i64, i64), back: usize) -> Option<((i64, i64), usize)> {
    (1..=8).find_map(|k| {
        let d = (back + k) % 8;
        let next = (cur.0 + DIRS[d].0, cur.1 + DIRS[d].1);
        if !mask.get(next.0, next.1) {
            return None;
        }
        let prev = DIRS[(d + 7) % 8];
        let rel = (prev.0 - DIRS[d].0, prev.1 - DIRS[d].1);
        Some((next, dir_index(rel)))
    })
}

fn dir_index(offset: (i64, i64)) -> usize {
    DIRS.iter().position(|&d| d == offset).unwrap_or(WEST)
}

/// Drop points that continue a straight run.
fn compress(points: Vec<(i64, i64)>) -> Vec<(i64, i64)> {
    let n = points.len();
    if n < 3 {
        return points;
    }
    (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let cur = points[i];
            let next = points[(i + 1) % n];
            (cur.0 - prev.0, cur.1 - prev.1) != (next.0 - cur.0, next.1 - cur.1)
        })
        .map(|i| points[i])
        .collect()
}

fn shoelace_area(polygon: &[(i64, i64)]) -> f64 {
    let n = polygon.len();
    if n < 3 {
        return 0.0;
    }
    let twice: i64 = (0..n)
        .map(|i| {
            let (x0, y0) = polygon[i];
            let (x1, y1) = polygon[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum();
    twice.abs() as f64 / 2.0
}
