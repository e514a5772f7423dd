pub mod buffer;
pub mod decode;
pub mod frames;
pub mod peaks;
pub mod spectrum;

pub use buffer::SampleBuffer;
pub use decode::decode_audio;
