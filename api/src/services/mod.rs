pub mod cleaner;
pub mod completion;
pub mod content;
pub mod error;
pub mod generator;
pub mod lifecycle;
pub mod notify;
pub mod quota;
pub mod retry;
pub mod session;
pub mod transcript;
pub mod upload;
pub mod uploader;
