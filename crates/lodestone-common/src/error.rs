use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum LodestoneError {
    IoError(std::io::Error),
    /// Malformed byte stream: negative length, out-of-range type byte,
    /// unexpected end of stream.
    FormatError(String),
    /// A single container entry that could not be decoded. The rest of the
    /// container is unaffected.
    InvalidChunk(String),
    /// A tag was accessed as a type it cannot widen to.
    CastError {
        expected: &'static str,
        actual: &'static str,
    },
    /// A neighbor volume with different bounds was handed to the light
    /// engine. Caller programming error.
    DimensionMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },
    /// Container file misuse: slot out of range, oversized entry.
    RegionError(String),
}

impl fmt::Display for LodestoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LodestoneError::IoError(err) => write!(f, "IO error: {}", err),
            LodestoneError::FormatError(msg) => write!(f, "Format error: {}", msg),
            LodestoneError::InvalidChunk(msg) => write!(f, "Invalid chunk: {}", msg),
            LodestoneError::CastError { expected, actual } => {
                write!(f, "Cast error: cannot cast {} tag to {}", actual, expected)
            }
            LodestoneError::DimensionMismatch { expected, actual } => write!(
                f,
                "Dimension mismatch: expected {}x{}x{}, got {}x{}x{}",
                expected.0, expected.1, expected.2, actual.0, actual.1, actual.2
            ),
            LodestoneError::RegionError(msg) => write!(f, "Region error: {}", msg),
        }
    }
}

impl Error for LodestoneError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LodestoneError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LodestoneError {
    fn from(err: std::io::Error) -> Self {
        LodestoneError::IoError(err)
    }
}

pub type Result<T> = std::result::Result<T, LodestoneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = LodestoneError::FormatError("negative length".to_string());
        assert_eq!(format!("{}", err), "Format error: negative length");

        let err = LodestoneError::CastError {
            expected: "Int",
            actual: "String",
        };
        assert_eq!(format!("{}", err), "Cast error: cannot cast String tag to Int");
    }

    #[test]
    fn test_io_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = LodestoneError::from(io);
        assert!(Error::source(&err).is_some());
    }
}
