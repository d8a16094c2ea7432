pub mod error;
pub mod health;
pub mod mail;
pub mod message;
pub mod order;
pub mod response;
pub mod result;
pub mod retry;
pub mod view;
