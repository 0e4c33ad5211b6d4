use std::io;

/// The error type used in this crate.
///
/// Any structural problem aborts the whole read: a bad varint desynchronizes
/// the cursor, so there is no per-event recovery. Semantic anomalies which do
/// not break framing (for example an event referencing an unknown stack trace
/// id) are not errors; the corresponding lookup simply returns `None`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The file does not start with the JFR chunk magic `FLR\0`.
    #[error("Not a JFR file")]
    NotJfr,

    /// The chunk declares a JFR major version other than 2.
    #[error("Unsupported JFR version: {0}.{1}")]
    UnsupportedVersion(u16, u16),

    /// A structural element of the file did not decode as specified.
    #[error("Invalid JFR file: {0}")]
    InvalidFormat(&'static str),

    /// A read ran past the end of the file image or the current chunk body.
    #[error("Unexpected end of file")]
    UnexpectedEof,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
