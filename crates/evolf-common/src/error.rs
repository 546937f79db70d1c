use thiserror::Error;

/// Client-side input problems. None of these ever reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing receptor: please provide a receptor sequence")]
    EmptyReceptor,

    #[error("Invalid sequence format: paste a plain amino acid sequence, not FASTA")]
    FastaHeader,

    #[error("Missing ligand: please provide at least one ligand SMILES string")]
    NoLigandSmiles,

    #[error("CSV must contain a column with 'smiles' in its header")]
    MissingSmilesColumn,

    #[error("CSV file is empty")]
    EmptyCsv,

    #[error("Unsupported file type '{0}': upload a .fasta, .fa or .txt file")]
    UnsupportedFileExtension(String),

    #[error("Maximum of {max} ligands allowed")]
    TooManyLigands { max: usize },

    #[error("At least {min} ligand is required")]
    TooFewLigands { min: usize },

    #[error("No ligand field with id {0}")]
    UnknownLigandField(u32),

    #[error("No EvOlf ID provided")]
    EmptyEvolfId,

    #[error("Select at least one entry to export")]
    NoExportIds,
}

#[derive(Debug, Error)]
pub enum EvolfError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Non-2xx backend answer; `message` is the backend's own text.
    #[error("API error [{status}]: {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("No job ID provided")]
    MissingJobId,

    #[error("Prediction results are not ready yet")]
    ResultsNotReady,

    #[error("Results not found or have expired")]
    ResultsExpired,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EvolfError {
    /// True for the 404 family: the job or its output is gone for good.
    pub fn is_not_found(&self) -> bool {
        match self {
            EvolfError::NotFound { .. } | EvolfError::ResultsExpired => true,
            EvolfError::Api { status, .. } => *status == 404,
            EvolfError::Http(e) => e.status().map(|s| s.as_u16() == 404).unwrap_or(false),
            _ => false,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            EvolfError::Api { status, .. } => Some(*status),
            EvolfError::NotFound { .. } => Some(404),
            EvolfError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EvolfError>;
