pub mod extractor;
pub mod handlers;
pub mod keywords;
pub mod service;
