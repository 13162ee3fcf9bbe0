//! Binary masks as produced by a segmentation device.

use crate::error::DeviceError;

/// A row-major binary mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl BinaryMask {
    /// An all-background mask.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; (width as usize) * (height as usize)],
        }
    }

    /// Build a mask from row-major bits. Returns `None` on a size mismatch.
    pub fn from_bits(width: u32, height: u32, bits: Vec<bool>) -> Option<Self> {
        ((width as usize) * (height as usize) == bits.len()).then_some(Self {
            width,
            height,
            bits,
        })
    }

    /// Decode an uncompressed run-length encoding.
    ///
    /// `counts` alternates background and foreground run lengths over the
    /// row-major pixel order, always starting with a (possibly zero)
    /// background run. The runs must cover the mask exactly.
    pub fn from_runs(width: u32, height: u32, counts: &[u32]) -> Result<Self, DeviceError> {
        let total = (width as usize) * (height as usize);
        let covered: usize = counts.iter().map(|&c| c as usize).sum();
        if covered != total {
            return Err(DeviceError::Protocol(format!(
                "mask runs cover {covered} pixels, expected {width}x{height} = {total}"
            )));
        }

        let mut bits = Vec::with_capacity(total);
        for (i, &run) in counts.iter().enumerate() {
            let value = i % 2 == 1;
            bits.extend(std::iter::repeat(value).take(run as usize));
        }
        Ok(Self {
            width,
            height,
            bits,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Foreground test; out-of-bounds coordinates read as background.
    pub fn get(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return false;
        }
        self.bits[(y as usize) * (self.width as usize) + (x as usize)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            self.bits[(y as usize) * (self.width as usize) + (x as usize)] = value;
        }
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|&b| b)
    }

    /// Nearest-neighbour resize to `width x height`.
    pub fn upscale_nearest(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let mut out = Self::empty(width, height);
        if self.width == 0 || self.height == 0 {
            return out;
        }
        let src_cols: Vec<usize> = (0..width)
            .map(|x| ((u64::from(x) * u64::from(self.width)) / u64::from(width)) as usize)
            .collect();
        for y in 0..height {
            let sy = ((u64::from(y) * u64::from(self.height)) / u64::from(height)) as usize;
            let src_row = sy * self.width as usize;
            let dst_row = (y as usize) * (width as usize);
            for (x, &sx) in src_cols.iter().enumerate() {
                out.bits[dst_row + x] = self.bits[src_row + sx];
            }
        }
        out
    }
}
