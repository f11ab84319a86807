pub mod announcementdb;
pub mod chatdb;
pub mod complaintdb;
pub mod db;
pub mod userdb;
