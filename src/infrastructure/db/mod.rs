pub mod chat_history;
pub mod connection;
pub mod projects;
