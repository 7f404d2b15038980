pub mod files;
pub mod home;
