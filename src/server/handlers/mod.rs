pub mod chat;
pub mod chatbot;
pub mod conversations;
pub mod documents;
pub mod health;
