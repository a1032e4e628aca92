//! OCR error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("charset load failed: {0}")]
    Charset(String),

    #[error("image processing failed: {0}")]
    ImageProcess(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
