mod chat;
mod feedback;
mod workspace;
