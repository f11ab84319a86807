pub mod announcementmodel;
pub mod chatmodel;
pub mod complaintmodel;
pub mod usermodel;
