mod embedding;
mod index;
mod projection;
mod retrieval;
mod router;
mod scanner;
mod types;

pub use index::{Index, MemoryIndex};
pub use projection::{project, Point};
pub use retrieval::Retrieval;
pub use router::{collection_name, IndexRouter};
pub use scanner::{scan, ScanStats, ScannedFile};
pub use types::{Chunk, ChunkMetadata, Filter, QueryResult};
