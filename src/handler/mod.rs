pub mod announcement_handler;
pub mod chat_handler;
pub mod complaint_handler;
