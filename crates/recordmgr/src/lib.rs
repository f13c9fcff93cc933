//! Row and PAX page layouts, the file-level record API built over them, and
//! recovery replay for `RECORD_MANAGER` log entries.

mod codec;
mod file;
mod pax_page;
mod replay;
mod row_page;
mod scanner;
mod wire;

pub use file::RecordFileHandler;
pub use pax_page::PaxPage;
pub use replay::{RecordFileDescriptor, RecordLogReplayer};
pub use row_page::RowPage;
pub use scanner::{Chunk, ChunkFileScanner, RecordFileScanner, ScanMode, chunk_field};
pub use wire::{RecordLogPayload, RecordOp};
