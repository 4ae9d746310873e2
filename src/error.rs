use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("key not found.")]
    NotFound,
    #[error("iterator invalidated by a later modification.")]
    IteratorInvalidated,
    #[error("table #{number} is not present at level {level} of the base version.")]
    MissingTable { level: usize, number: u64 },
    #[error("table #{number} has smallest key greater than largest key.")]
    InvertedRange { number: u64 },
    #[error("tables #{left} and #{right} overlap at level {level}.")]
    OverlappingTables { level: usize, left: u64, right: u64 },
    #[error("version staging already finished.")]
    StagingFinished,
    #[error("version staged against #{base} but the current version is #{current}.")]
    StaleVersion { base: u64, current: u64 },
    #[error("storage locked: {0}")]
    Locked(String),
    #[error("I/O operation error: {0}")]
    IO(#[from] std::io::Error),
}

impl Error {
    /// Returns true for errors that indicate a corrupted edit stream or a
    /// logic bug upstream. Callers must not retry these.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Error::MissingTable { .. }
                | Error::InvertedRange { .. }
                | Error::OverlappingTables { .. }
                | Error::StagingFinished
                | Error::StaleVersion { .. }
        )
    }
}

pub type IResult<T> = std::result::Result<T, Error>;
