pub mod wire;
pub mod encoder;
pub mod decoder;

pub use encoder::Encode;
pub use decoder::{
    decode_file, decode_file_descriptor, decode_file_descriptor_set, decode_message,
    DecodeContext,
};
