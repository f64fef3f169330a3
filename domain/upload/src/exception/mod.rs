use crate::model::vo::SessionStatus;

pub type UploadResult<T> = Result<T, UploadException>;

#[derive(Debug, thiserror::Error)]
pub enum UploadException {
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Storage quota of owner: {owner_id} exceeded: {reason}")]
    QuotaExceeded { owner_id: i64, reason: String },

    #[error("An upload session with id: {session_id} already exists.")]
    AlreadyExists { session_id: String },

    #[error("The upload session with id: {session_id} can't be found.")]
    SessionNotFound { session_id: String },

    #[error("Chunk number: {chunk_number} is out of range [1, {total_chunks}].")]
    InvalidChunkNumber { chunk_number: u32, total_chunks: u32 },

    #[error("Chunk: {chunk_number}'s checksum: {actual} is unmatched with provided checksum: {expected}.")]
    ChecksumMismatch {
        chunk_number: u32,
        expected: String,
        actual: String,
    },

    #[error("The upload session with id: {session_id} is missing chunks: {missing_chunks:?}.")]
    IncompleteUpload {
        session_id: String,
        missing_chunks: Vec<u32>,
    },

    #[error("The upload session with id: {session_id} is {status}, operation not allowed.")]
    InvalidStatus {
        session_id: String,
        status: SessionStatus,
    },

    #[error("The processing lease of session: {session_id} is held by another worker.")]
    LeaseLost { session_id: String },

    #[error("Merging chunks of session: {session_id} failed: {source}")]
    MergeFailure {
        session_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Handing off artifact of session: {session_id} failed after {attempts} attempts: {source}")]
    HandoffFailure {
        session_id: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Cataloguing video of session: {session_id} failed after {attempts} attempts: {source}")]
    CatalogFailure {
        session_id: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Upload internal error: {source}")]
    InternalError {
        #[source]
        source: anyhow::Error,
    },
}

impl UploadException {
    /// HTTP equivalent of the error class.
    pub fn status_code(&self) -> u16 {
        use UploadException::*;
        match self {
            InvalidArgument { .. } | InvalidChunkNumber { .. } | ChecksumMismatch { .. } => 400,
            QuotaExceeded { .. } => 403,
            SessionNotFound { .. } => 404,
            AlreadyExists { .. }
            | IncompleteUpload { .. }
            | InvalidStatus { .. }
            | LeaseLost { .. } => 409,
            HandoffFailure { .. } | CatalogFailure { .. } => 502,
            MergeFailure { .. } | InternalError { .. } => 500,
        }
    }
}

impl From<anyhow::Error> for UploadException {
    fn from(e: anyhow::Error) -> Self {
        UploadException::InternalError { source: e }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_upload_lists_missing_chunks() {
        let e = UploadException::IncompleteUpload {
            session_id: "s".to_string(),
            missing_chunks: vec![3, 5],
        };
        assert!(e.to_string().contains("[3, 5]"));
        assert_eq!(e.status_code(), 409);
    }

    #[test]
    fn faults_are_server_errors() {
        let e = UploadException::HandoffFailure {
            session_id: "s".to_string(),
            attempts: 3,
            source: anyhow::anyhow!("bucket unavailable"),
        };
        assert_eq!(e.status_code(), 502);
        assert!(e.to_string().contains("bucket unavailable"));
        let e: UploadException = anyhow::anyhow!("boom").into();
        assert_eq!(e.status_code(), 500);
    }
}
