//! Frame-level encoding and decoding over byte buffers.
//!
//! The codec never touches I/O: the connection feeds it whatever bytes the
//! transport produced and drains whatever it encoded.

mod frame_codec;

pub use frame_codec::FrameCodec;
