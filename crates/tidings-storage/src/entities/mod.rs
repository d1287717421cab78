pub mod alert;
pub mod notification;
pub mod role;
