use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// One decoded video frame. Cloning shares the pixel buffer.
#[derive(Clone, Debug)]
pub struct Frame {
    id: Uuid,
    image: Arc<RgbImage>,
    timestamp: Duration,
}

impl Frame {
    pub fn new(image: RgbImage, timestamp: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            image: Arc::new(image),
            timestamp,
        }
    }

    pub fn from_shared(image: Arc<RgbImage>, timestamp: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            image,
            timestamp,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Presentation timestamp relative to the start of the source.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_valid(&self) -> bool {
        self.image.width() > 0 && self.image.height() > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Loading,
    Ready,
    Paused,
    Ended,
}

/// Camera stream or decoded file feeding the pipeline.
pub trait FrameSource: Send {
    fn dimensions(&self) -> (u32, u32);
    fn current_time(&self) -> Duration;
    fn duration(&self) -> Option<Duration>;
    fn state(&self) -> SourceState;
    /// Draw the current frame into a buffer and advance playback.
    fn capture(&mut self) -> Option<Frame>;
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: Duration);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    #[test]
    fn cloning_frame_shares_image_buffer() {
        let img: RgbImage = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(16, 16, Rgb([1, 2, 3]));
        let f1 = Frame::new(img, Duration::from_millis(40));
        let f2 = f1.clone();
        assert!(Arc::ptr_eq(&f1.image, &f2.image));
        assert_eq!(f1.id(), f2.id());
    }

    #[test]
    fn zero_sized_frame_is_invalid() {
        let frame = Frame::new(RgbImage::new(0, 0), Duration::ZERO);
        assert!(!frame.is_valid());
    }
}
