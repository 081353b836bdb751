mod checkpoint;
mod http;
mod memory;
mod multipart;
pub mod paths;
mod registry;
mod transport;

pub use checkpoint::{CheckpointError, CheckpointStore, PartRecord, UploadCheckpoint};
pub use http::HttpTransport;
pub use memory::MemoryTransport;
pub use multipart::{
    ChunkedUploader, DEFAULT_MULTIPART_THRESHOLD, DEFAULT_PART_BYTES, MultipartBackend,
    MultipartError,
};
pub use registry::{BackendKind, RegistryError, TransportSettings, build_transport};
pub use transport::{ErrorKind, RemoteEntry, Transport, TransportError};
