pub mod encoding;
pub mod name;
pub mod reader;
pub mod resolver;

pub use encoding::decode_text;
pub use name::{resolve_display_name, resolve_local_path, DEFAULT_FILE_NAME};
pub use reader::{ByteStream, ContentReader, FileSystemReader, ReadError};
pub use resolver::{FallbackResolver, Resolved, Strategy, DEFAULT_CHAIN};
