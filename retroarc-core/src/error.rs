pub type Result<T> = std::result::Result<T, DatError>;

#[derive(Debug, thiserror::Error)]
pub enum DatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not an LSTGRETROARC archive (no magic after trial decryption)")]
    NotAnArchive,
    #[error("unsupported archive version: {0}")]
    UnsupportedVersion(u32),
    #[error("archive directory is corrupt: {0}")]
    DirectoryCorrupt(&'static str),
    #[error("invalid UTF-16 sequence in entry path")]
    InvalidUtf16,

    #[error("failed to inflate entry '{path}': {source}")]
    Inflate {
        path: String,
        source: std::io::Error,
    },

    #[error("no such entry: {0}")]
    EntryNotFound(String),

    #[error("archive exceeds the 4 GiB addressing limit ({0} bytes)")]
    TooLarge(u64),
}
