pub mod conversation_service;
pub mod dispatcher;
pub mod email_budget;
pub mod email_service;
pub mod message_service;
pub mod notification_service;
pub mod presence_service;
