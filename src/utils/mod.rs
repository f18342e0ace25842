pub mod error;
pub mod limiters;
pub mod similarity;
pub mod token_estimator;
pub mod tokenize;

pub use error::ApiError;
pub use similarity::cosine_similarity;
