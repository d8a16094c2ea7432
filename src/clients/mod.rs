pub mod database;
pub mod health;
pub mod mail;
pub mod pdf;
pub mod qr;
pub mod rbmq;
pub mod template;
