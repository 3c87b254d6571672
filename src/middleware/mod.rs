pub mod auth;
pub mod verified;
