//! Frame discovery and working-window preparation.
//!
//! A project's extracted frames live in one directory. A session works on
//! a window of them, copied (or symlinked) into a temporary directory as
//! `000000.jpg`, `000001.jpg`, ... and optionally downscaled to the
//! configured inference width.

use std::cmp::Ordering;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use segflow_core::types::FrameNumber;
use tempfile::TempDir;

use crate::error::InferenceError;

/// File extensions recognised as frames.
pub const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tif", "tiff"];

/// JPEG quality for re-encoded window frames.
const JPEG_QUALITY: u8 = 95;

/// Image files in `dir`, sorted so `frame_2` precedes `frame_10`.
pub fn discover_frames(dir: &Path) -> Result<Vec<PathBuf>, InferenceError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        InferenceError::Frames(format!("cannot read frames directory {}: {e}", dir.display()))
    })?;

    let mut frames = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && has_frame_extension(&path) {
            frames.push(path);
        }
    }
    frames.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    Ok(frames)
}

fn has_frame_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Compare strings treating runs of ASCII digits as numbers.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let na = take_number(&mut a);
                let nb = take_number(&mut b);
                let ord = na
                    .trim_start_matches('0')
                    .len()
                    .cmp(&nb.trim_start_matches('0').len())
                    .then_with(|| na.trim_start_matches('0').cmp(nb.trim_start_matches('0')))
                    .then_with(|| na.len().cmp(&nb.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.cmp(&y);
                if ord != Ordering::Equal {
                    return ord;
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        digits.push(c);
        chars.next();
    }
    digits
}

/// Working resolution for a `width x height` frame at `target_width`.
///
/// Frames narrower than the target keep their size. Otherwise the width
/// becomes the target and the height follows the aspect ratio. Both sides
/// are then rounded down to even values.
pub fn scaled_dimensions(width: u32, height: u32, target_width: u32) -> (u32, u32) {
    let (w, h) = if target_width >= width || width == 0 {
        (width, height)
    } else {
        let scale = f64::from(target_width) / f64::from(width);
        (target_width, (f64::from(height) * scale) as u32)
    };
    (even(w), even(h))
}

fn even(n: u32) -> u32 {
    (n & !1).max(2)
}

/// A prepared window of frames in a temporary directory.
///
/// The directory is removed when the window is dropped.
#[derive(Debug)]
pub struct PreparedWindow {
    dir: TempDir,
    start_frame: FrameNumber,
    len: u32,
    original: (u32, u32),
    scaled: (u32, u32),
}

impl PreparedWindow {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn start_frame(&self) -> FrameNumber {
        self.start_frame
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Original frame resolution.
    pub fn original_dimensions(&self) -> (u32, u32) {
        self.original
    }

    /// Resolution the device works at.
    pub fn scaled_dimensions(&self) -> (u32, u32) {
        self.scaled
    }

    pub fn is_scaled(&self) -> bool {
        self.original != self.scaled
    }
}

/// Build the working window `start .. start + length` out of `frames`.
///
/// Every frame of the window must exist; a window reaching past the last
/// frame is an error.
pub fn prepare_window(
    frames: &[PathBuf],
    start: FrameNumber,
    length: u32,
    inference_width: u32,
) -> Result<PreparedWindow, InferenceError> {
    let start_idx = start as usize;
    if length == 0 || start_idx + length as usize > frames.len() {
        return Err(InferenceError::Window {
            start,
            length,
            available: frames.len(),
        });
    }
    let window = &frames[start_idx..start_idx + length as usize];

    let original = image::image_dimensions(&window[0])?;
    let scaled = scaled_dimensions(original.0, original.1, inference_width);
    let needs_scaling = original != scaled;

    let dir = tempfile::Builder::new().prefix("segflow_frames_").tempdir()?;
    for (local, source) in window.iter().enumerate() {
        let target = dir.path().join(format!("{local:06}.jpg"));
        if !needs_scaling && is_jpeg(source) {
            link_or_copy(source, &target)?;
        } else {
            write_jpeg(source, &target, needs_scaling.then_some(scaled))?;
        }
    }

    tracing::debug!(
        start,
        frames = window.len(),
        original = ?original,
        scaled = ?scaled,
        dir = %dir.path().display(),
        "Prepared frame window",
    );

    Ok(PreparedWindow {
        dir,
        start_frame: start,
        len: window.len() as u32,
        original,
        scaled,
    })
}

fn write_jpeg(source: &Path, target: &Path, resize: Option<(u32, u32)>) -> Result<(), InferenceError> {
    let mut img = image::open(source)?;
    if let Some((w, h)) = resize {
        img = img.resize_exact(w, h, FilterType::Triangle);
    }
    let rgb = img.to_rgb8();
    let mut out = BufWriter::new(File::create(target)?);
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(())
}

#[cfg(unix)]
fn link_or_copy(source: &Path, target: &Path) -> Result<(), InferenceError> {
    let absolute = std::fs::canonicalize(source)?;
    std::os::unix::fs::symlink(absolute, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn link_or_copy(source: &Path, target: &Path) -> Result<(), InferenceError> {
    std::fs::copy(source, target)?;
    Ok(())
}
