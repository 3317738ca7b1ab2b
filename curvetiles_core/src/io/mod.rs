//! Little-endian value readers/writers for the protobuf-encoded vector-tile
//! format. Slice-based only; tiles are small enough to decode in memory.

mod value_reader;
mod value_writer;

pub use value_reader::ValueReaderSlice;
pub use value_writer::ValueWriterVec;
