use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A container's internal structure matches no known layout.
    #[error("unrecognized container format in {container}: {reason}")]
    Format { container: String, reason: String },

    /// Expected header markers were not found within the bounded scan.
    #[error("schema markers not found in {container}: {reason}")]
    Schema { container: String, reason: String },

    /// No container could be read and no previous consolidated table exists.
    #[error("nothing to consolidate: no readable container and no previous table")]
    NothingToConsolidate,

    #[error("unparseable date: {0}")]
    Date(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
