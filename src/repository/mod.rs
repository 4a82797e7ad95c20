pub mod bot_sessions;
pub mod room_acknowledgments;
pub mod supplements;
