mod codec;
mod format;
mod node_table;
mod rebuild;
mod resource_pack;

pub use codec::{Codec, SCRATCH_HIGH_WATER};
pub use format::{
    CompressType, FileNode, NodeName, PackHeader, UseFlag, FILE_NODE_SIZE, HEADER_SIZE,
    MAX_FILE_NODE_NUM, MAX_NAME_LENGTH, MIN_COMPRESS_SIZE, MIN_FILE_NODE_NUM,
    VERSION_FIELD_SIZE,
};
pub use node_table::{FileNodeTable, SlotLookup};
pub use rebuild::{next_table_size, sibling_path, DOUBLING_LIMIT, GROWTH_STEP};
pub use resource_pack::{AccessMode, ResourcePack};
