pub mod answering;
pub mod conversation;
pub mod document;
pub mod providers;
pub mod vector_repository;
