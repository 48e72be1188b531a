mod bitvector;
mod codec;
mod indexset;
mod ioutil;
mod word;

pub use bitvector::Bitvector;
pub use indexset::{IndexSet, Step};
pub use ioutil::{FileReader, FileWriter, MemReader, MemWriter, Reader, Writer};
pub use word::W;
