use image::RgbImage;
use tracing::debug;

/// Reusable off-screen buffer holding a frame at processing resolution.
///
/// The backing allocation only changes when the source dimensions change.
pub struct ScratchBuffer {
    max_width: u32,
    buffer: RgbImage,
    source_dimensions: (u32, u32),
    reallocations: usize,
}

impl ScratchBuffer {
    pub fn new(max_width: u32) -> Self {
        Self {
            max_width: max_width.max(1),
            buffer: RgbImage::new(0, 0),
            source_dimensions: (0, 0),
            reallocations: 0,
        }
    }

    /// Processing dimensions for a given source size.
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        if width <= self.max_width {
            return (width, height);
        }
        let scale = self.max_width as f32 / width as f32;
        let scaled_height = ((height as f32 * scale).round() as u32).max(1);
        (self.max_width, scaled_height)
    }

    /// Copy `image` into the buffer, downscaling nearest-neighbour if needed.
    pub fn load(&mut self, image: &RgbImage) -> &RgbImage {
        let dimensions = image.dimensions();
        if dimensions != self.source_dimensions {
            self.resize(dimensions);
        }

        let (target_w, target_h) = self.buffer.dimensions();
        if (target_w, target_h) == dimensions {
            self.buffer.copy_from_slice(image.as_raw());
            return &self.buffer;
        }

        let (src_w, src_h) = dimensions;
        for ty in 0..target_h {
            let sy = (ty as u64 * src_h as u64 / target_h as u64) as u32;
            for tx in 0..target_w {
                let sx = (tx as u64 * src_w as u64 / target_w as u64) as u32;
                self.buffer.put_pixel(tx, ty, *image.get_pixel(sx, sy));
            }
        }
        &self.buffer
    }

    fn resize(&mut self, source: (u32, u32)) {
        let (w, h) = self.target_dimensions(source.0, source.1);
        debug!(
            "Resizing scratch buffer for {}x{} source to {}x{}",
            source.0, source.1, w, h
        );
        self.buffer = RgbImage::new(w, h);
        self.source_dimensions = source;
        self.reallocations += 1;
    }

    pub fn image(&self) -> &RgbImage {
        &self.buffer
    }

    /// How many times the backing buffer has been allocated.
    pub fn reallocations(&self) -> usize {
        self.reallocations
    }
}
