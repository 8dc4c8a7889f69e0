pub mod image_sequence;

pub use image_sequence::ImageSequenceSource;
