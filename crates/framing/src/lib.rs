//! Blob framing for encrypted vectors
//!
//! A blob is one or more slots, each a 4-byte big-endian length followed by
//! the bytes of one [`EncryptedVector`](schemes::EncryptedVector). Readers
//! take the slot count from the schema of the stage they consume.
//!
//! - **`layout`**: prefixed, open-tail and counted slot layouts
//! - **`blob`**: named blobs, stage schemas, (de)serialization
//! - **`transport`**: in-memory and directory transports

pub mod blob;
pub mod layout;
pub mod transport;

pub use blob::{
    deserialize_blob, deserialize_vectors, serialize_blob, serialize_vectors, Blob, BlobSchema,
    SlotSpec,
};
pub use layout::{frame_slots, split_slots, Layout, COUNTED_MAGIC};
pub use transport::{BlobTransport, FileTransport, MemoryTransport};
