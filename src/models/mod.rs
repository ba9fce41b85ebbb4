pub mod booking;
pub mod class_instance;
pub mod class_template;
pub mod common;
pub mod pass;
pub mod subscription;
