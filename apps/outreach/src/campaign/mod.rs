pub mod drafts;
pub mod executor;
pub mod handlers;
pub mod scheduler;
pub mod service;
pub mod template;
