mod decoder;
mod encoder;
mod entry;
mod error;
mod extract;
pub mod field;
pub mod fs;
mod header;
mod list;
mod payload;

pub use decoder::{Consumer, Decoder, CONTENTS_MARKER};
pub use encoder::{Added, EncodeError, Encoder};
pub use entry::{Entry, EntryKind, EntryMeta, EntryType, Field, Owner, MODE_TYPE_MASK};
pub use error::{DecodeError, DecodeErrorKind};
pub use extract::{extract, ExtractError, ExtractStats, Extractor};
pub use header::{ArchiveHeader, MetadataEncoding};
pub use list::{list, ListError, Lister};
pub use payload::{Input, Payload, PayloadSink, TransferError, BLOCK_SIZE};
