pub mod check;
pub mod login;
pub mod maintenance;
pub mod settings;
