pub mod conflict;
pub mod event_service;
pub mod extractor;
pub mod normalizer;
pub mod openai_service;
pub mod routing;
