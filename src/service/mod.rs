pub mod background_jobs;
pub mod conversation;
pub mod lifecycle;
pub mod realtime;
pub mod timeline;
