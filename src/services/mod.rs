pub mod analysis;
pub mod batch;
pub mod correction;
pub mod errors;
pub mod llm;
pub mod markers;
pub mod paths;
pub mod preprocess;
pub mod recognition;
pub mod storage;
